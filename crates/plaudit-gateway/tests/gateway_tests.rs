// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Router-level tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use plaudit_core::{AuditEventType, Channel, DispatchRecord, DispatchStatus, SuppressionReason};
use plaudit_gateway::{GatewayState, HealthState, build_router};
use plaudit_storage::CancelOutcome;
use plaudit_storage::queries::dispatches;
use plaudit_test_utils::harness::{BUSINESS_ID, CUSTOMER_EMAIL, REVIEW_LINK};
use plaudit_test_utils::{ScriptedOutcome, TestHarness};
use tokio_util::task::TaskTracker;
use tower::ServiceExt;

fn router(harness: &TestHarness, render: Option<Arc<dyn Fn() -> String + Send + Sync>>) -> Router {
    build_router(GatewayState {
        db: harness.db.clone(),
        reconciler: harness.reconciler(),
        redirect: harness.config.redirect.clone(),
        health: HealthState::new(render),
        ingest_tasks: TaskTracker::new(),
    })
}

async fn get(app: Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn post(app: Router, uri: &str, content_type: &str, body: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

/// Queue and send one email; returns the sent record.
async fn sent_email(harness: &TestHarness) -> DispatchRecord {
    let record = harness.queue(Channel::Email, None, Utc::now()).await.unwrap();
    assert_eq!(harness.worker().poll_once(Utc::now()).await.unwrap().sent, 1);
    harness.reload(&record.id).await.unwrap()
}

/// Ingestion runs on a background task; poll until the status settles.
async fn wait_for_status(harness: &TestHarness, id: &str, want: DispatchStatus) -> DispatchRecord {
    for _ in 0..100 {
        let record = harness.reload(id).await.unwrap();
        if record.status == want {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("dispatch {id} never reached {want}");
}

#[tokio::test]
async fn health_reports_ok() {
    let harness = TestHarness::builder().build().await.unwrap();
    let (status, body) = get(router(&harness, None), "/health").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn metrics_render_only_when_enabled() {
    let harness = TestHarness::builder().build().await.unwrap();
    let (status, _) = get(router(&harness, None), "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let render: Arc<dyn Fn() -> String + Send + Sync> =
        Arc::new(|| "plaudit_clicks_total 3\n".to_string());
    let (status, body) = get(router(&harness, Some(render)), "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("plaudit_clicks_total 3"));
}

#[tokio::test]
async fn first_click_redirects_and_marks_clicked() {
    let harness = TestHarness::builder().build().await.unwrap();
    let record = sent_email(&harness).await;

    let (status, body) = get(router(&harness, None), &format!("/r/{}", record.tracking_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(&format!("url={REVIEW_LINK}")));
    assert!(body.contains(&format!("href=\"{REVIEW_LINK}\"")));
    assert!(body.contains("Thanks, Ada!"));
    assert!(body.contains("Corner Bakery"));

    let after = harness.reload(&record.id).await.unwrap();
    assert_eq!(after.status, DispatchStatus::Clicked);
    assert!(after.clicked_at.is_some());
}

#[tokio::test]
async fn repeat_click_keeps_first_timestamp_and_is_audited() {
    let harness = TestHarness::builder().build().await.unwrap();
    let record = sent_email(&harness).await;
    let uri = format!("/r/{}", record.tracking_token);

    get(router(&harness, None), &uri).await;
    let first = harness.reload(&record.id).await.unwrap();
    let (status, _) = get(router(&harness, None), &uri).await;
    assert_eq!(status, StatusCode::OK);

    let second = harness.reload(&record.id).await.unwrap();
    assert_eq!(second.clicked_at, first.clicked_at);
    let types = harness.audit_types(&record.id).await.unwrap();
    assert_eq!(
        types,
        vec![
            AuditEventType::Queued,
            AuditEventType::Sent,
            AuditEventType::Clicked,
            AuditEventType::RepeatClick,
        ]
    );
}

#[tokio::test]
async fn concurrent_clicks_have_exactly_one_first_click() {
    let harness = TestHarness::builder().build().await.unwrap();
    let record = sent_email(&harness).await;
    let uri = format!("/r/{}", record.tracking_token);
    let app = router(&harness, None);

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let app = app.clone();
            let uri = uri.clone();
            tokio::spawn(async move { get(app, &uri).await.0 })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    let types = harness.audit_types(&record.id).await.unwrap();
    let firsts = types.iter().filter(|t| **t == AuditEventType::Clicked).count();
    let repeats = types.iter().filter(|t| **t == AuditEventType::RepeatClick).count();
    assert_eq!((firsts, repeats), (1, 5));
}

#[tokio::test]
async fn unknown_token_is_not_found() {
    let harness = TestHarness::builder().build().await.unwrap();
    let (status, body) = get(router(&harness, None), "/r/not-a-real-token").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("Link not found"));
}

#[tokio::test]
async fn cancelled_dispatch_link_is_gone() {
    let harness = TestHarness::builder().build().await.unwrap();
    let record = harness.queue(Channel::Email, None, Utc::now()).await.unwrap();
    assert_eq!(
        dispatches::cancel_dispatch(&harness.db, &record.id, Utc::now()).await.unwrap(),
        CancelOutcome::Cancelled
    );

    let (status, _) = get(router(&harness, None), &format!("/r/{}", record.tracking_token)).await;
    assert_eq!(status, StatusCode::GONE);
    assert!(harness.reload(&record.id).await.unwrap().clicked_at.is_none());
}

#[tokio::test]
async fn opted_out_dispatch_link_is_gone() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness
        .suppression
        .suppress(BUSINESS_ID, CUSTOMER_EMAIL, Channel::Email, SuppressionReason::UserRequest, "user", Utc::now())
        .await
        .unwrap();
    let record = harness.queue(Channel::Email, None, Utc::now()).await.unwrap();
    harness.worker().poll_once(Utc::now()).await.unwrap();
    assert_eq!(harness.reload(&record.id).await.unwrap().status, DispatchStatus::OptedOut);

    let (status, body) = get(router(&harness, None), &format!("/r/{}", record.tracking_token)).await;
    assert_eq!(status, StatusCode::GONE);
    assert!(body.contains("no longer active"));
}

#[tokio::test]
async fn website_and_fallback_are_used_in_order() {
    let harness = TestHarness::builder()
        .with_business_links(None, Some("https://corner-bakery.example"))
        .build()
        .await
        .unwrap();
    let record = sent_email(&harness).await;
    let (_, body) = get(router(&harness, None), &format!("/r/{}", record.tracking_token)).await;
    assert!(body.contains("href=\"https://corner-bakery.example\""));

    let bare = TestHarness::builder()
        .with_business_links(None, None)
        .build()
        .await
        .unwrap();
    let record = sent_email(&bare).await;
    let (_, body) = get(router(&bare, None), &format!("/r/{}", record.tracking_token)).await;
    assert!(body.contains("https://www.google.com/search?q=reviews"));
}

#[tokio::test]
async fn sendgrid_webhook_is_acknowledged_and_reconciled() {
    let harness = TestHarness::builder()
        .with_email_script(vec![ScriptedOutcome::AcceptAs("sg-xyz".into())])
        .build()
        .await
        .unwrap();
    let record = sent_email(&harness).await;

    let payload = r#"[{"email":"ada@example.com","timestamp":1777626000,"event":"bounce",
                      "reason":"550 mailbox unavailable","sg_message_id":"sg-xyz.filter-1"}]"#;
    let (status, body) = post(router(&harness, None), "/webhooks/sendgrid", "application/json", payload).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"accepted":1}"#);

    let after = wait_for_status(&harness, &record.id, DispatchStatus::Bounced).await;
    assert_eq!(after.last_error.as_deref(), Some("550 mailbox unavailable"));
    for _ in 0..100 {
        if harness.suppression.is_suppressed(BUSINESS_ID, CUSTOMER_EMAIL, Channel::Email).await.unwrap() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("bounce did not suppress the contact");
}

#[tokio::test]
async fn acknowledged_batch_is_applied_before_ingest_tasks_drain() {
    let harness = TestHarness::builder()
        .with_email_script(vec![ScriptedOutcome::AcceptAs("sg-drain".into())])
        .build()
        .await
        .unwrap();
    let record = sent_email(&harness).await;

    let ingest_tasks = TaskTracker::new();
    let app = build_router(GatewayState {
        db: harness.db.clone(),
        reconciler: harness.reconciler(),
        redirect: harness.config.redirect.clone(),
        health: HealthState::new(None),
        ingest_tasks: ingest_tasks.clone(),
    });

    let payload = r#"[{"email":"ada@example.com","timestamp":1777626000,"event":"bounce",
                      "reason":"550 no such user","sg_message_id":"sg-drain.filter-1"}]"#;
    let (status, body) = post(app, "/webhooks/sendgrid", "application/json", payload).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"accepted":1}"#);

    // Shutdown closes the tracker and waits; nothing may be left unapplied.
    ingest_tasks.close();
    ingest_tasks.wait().await;

    let after = harness.reload(&record.id).await.unwrap();
    assert_eq!(after.status, DispatchStatus::Bounced);
    assert!(harness.suppression.is_suppressed(BUSINESS_ID, CUSTOMER_EMAIL, Channel::Email).await.unwrap());
}

#[tokio::test]
async fn twilio_status_callback_is_reconciled() {
    let harness = TestHarness::builder()
        .with_sms_script(vec![ScriptedOutcome::AcceptAs("SM123".into())])
        .build()
        .await
        .unwrap();
    let record = harness.queue(Channel::Sms, None, Utc::now()).await.unwrap();
    harness.worker().poll_once(Utc::now()).await.unwrap();

    let (status, body) = post(
        router(&harness, None),
        "/webhooks/twilio",
        "application/x-www-form-urlencoded",
        "MessageSid=SM123&MessageStatus=delivered&To=%2B15550100001",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"accepted":1}"#);
    wait_for_status(&harness, &record.id, DispatchStatus::Delivered).await;
}

#[tokio::test]
async fn malformed_webhook_body_still_returns_ok() {
    let harness = TestHarness::builder().build().await.unwrap();
    let (status, body) = post(router(&harness, None), "/webhooks/sendgrid", "application/json", "{not json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"accepted":0}"#);
}

#[tokio::test]
async fn unknown_provider_is_not_found() {
    let harness = TestHarness::builder().build().await.unwrap();
    let (status, _) = post(router(&harness, None), "/webhooks/mailchimp", "application/json", "[]").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
