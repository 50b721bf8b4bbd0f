// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the dispatch worker against a temp store.

use chrono::{DateTime, Duration, TimeZone, Utc};
use plaudit_config::model::DispatchConfig;
use plaudit_core::{AuditEventType, Channel, DenialReason, DispatchStatus, SendError, SuppressionReason};
use plaudit_dispatch::DispatchOutcome;
use plaudit_storage::CancelOutcome;
use plaudit_storage::queries::dispatches;
use plaudit_test_utils::harness::{BUSINESS_ID, CUSTOMER_EMAIL};
use plaudit_test_utils::{ScriptedOutcome, TestHarness};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
}

async fn used(harness: &TestHarness, channel: Channel) -> u32 {
    harness
        .usage
        .counter(BUSINESS_ID, channel)
        .await
        .unwrap()
        .map_or(0, |c| c.used)
}

#[tokio::test]
async fn due_email_is_sent_and_consumes_one_credit() {
    let harness = TestHarness::builder().build().await.unwrap();
    let record = harness.queue(Channel::Email, None, t0()).await.unwrap();

    let summary = harness.worker().poll_once(t0()).await.unwrap();
    assert_eq!(summary.claimed, 1);
    assert_eq!(summary.sent, 1);

    let after = harness.reload(&record.id).await.unwrap();
    assert_eq!(after.status, DispatchStatus::Sent);
    assert_eq!(after.sent_at, Some(t0()));
    assert_eq!(after.retry_count, 0);
    assert_eq!(after.provider_message_id.as_deref(), Some("email-msg-1"));
    assert!(after.claimed_by.is_none());
    assert_eq!(used(&harness, Channel::Email).await, 1);

    let sent = harness.email.sent_messages().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, CUSTOMER_EMAIL);
    let link = format!("http://127.0.0.1:3080/r/{}", record.tracking_token);
    assert!(sent[0].body.contains(&link), "body: {}", sent[0].body);
    assert!(!sent[0].body.contains("{{tracking_url}}"));

    assert_eq!(
        harness.audit_types(&record.id).await.unwrap(),
        vec![AuditEventType::Queued, AuditEventType::Sent]
    );
}

#[tokio::test]
async fn tracking_link_uses_public_base_url() {
    let harness = TestHarness::builder()
        .with_public_base_url("https://go.example.com/")
        .build()
        .await
        .unwrap();
    let record = harness.queue(Channel::Sms, None, t0()).await.unwrap();

    harness.worker().poll_once(t0()).await.unwrap();

    let sent = harness.sms.sent_messages().await;
    assert!(sent[0]
        .body
        .ends_with(&format!("https://go.example.com/r/{}", record.tracking_token)));
}

#[tokio::test]
async fn suppressed_recipient_is_opted_out_without_sending() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness
        .suppression
        .suppress(BUSINESS_ID, "ADA@example.com", Channel::Email, SuppressionReason::UserRequest, "user", t0())
        .await
        .unwrap();
    let record = harness.queue(Channel::Email, None, t0()).await.unwrap();

    let worker = harness.worker();
    let claimed = worker.claim_due(10, t0()).await.unwrap();
    let outcome = worker.dispatch(claimed[0].clone(), t0()).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::OptedOut);

    let after = harness.reload(&record.id).await.unwrap();
    assert_eq!(after.status, DispatchStatus::OptedOut);
    assert!(after.sent_at.is_none());
    assert_eq!(harness.email.send_count().await, 0);
    assert_eq!(used(&harness, Channel::Email).await, 0);
    assert!(harness
        .audit_types(&record.id)
        .await
        .unwrap()
        .contains(&AuditEventType::Suppressed));
}

#[tokio::test]
async fn suppression_on_other_channel_does_not_block() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness
        .suppression
        .suppress(BUSINESS_ID, CUSTOMER_EMAIL, Channel::Email, SuppressionReason::Bounce, "webhook:sendgrid", t0())
        .await
        .unwrap();
    harness.queue(Channel::Sms, None, t0()).await.unwrap();

    let summary = harness.worker().poll_once(t0()).await.unwrap();
    assert_eq!(summary.sent, 1);
}

#[tokio::test]
async fn exhausted_credit_defers_record_unchanged() {
    let harness = TestHarness::builder()
        .with_email_quota(Some(0))
        .build()
        .await
        .unwrap();
    let record = harness.queue(Channel::Email, None, t0()).await.unwrap();
    let worker = harness.worker();

    let claimed = worker.claim_due(10, t0()).await.unwrap();
    let outcome = worker.dispatch(claimed[0].clone(), t0()).await.unwrap();
    let until = t0() + Duration::seconds(900);
    assert_eq!(
        outcome,
        DispatchOutcome::Deferred {
            reason: DenialReason::QuotaExhausted,
            until,
        }
    );

    let after = harness.reload(&record.id).await.unwrap();
    assert_eq!(after.status, DispatchStatus::Queued);
    assert_eq!(after.retry_count, 0);
    assert_eq!(after.scheduled_for, None);
    assert_eq!(after.locked_until, Some(until));
    assert!(after.claimed_by.is_none());
    assert_eq!(harness.email.send_count().await, 0);
    assert!(harness
        .audit_types(&record.id)
        .await
        .unwrap()
        .contains(&AuditEventType::DeferredNoCredit));

    assert_eq!(worker.poll_once(t0() + Duration::seconds(60)).await.unwrap().claimed, 0);
    assert_eq!(worker.poll_once(until + Duration::seconds(1)).await.unwrap().deferred, 1);
}

#[tokio::test]
async fn missing_counter_is_no_allowance() {
    let harness = TestHarness::builder()
        .with_email_quota(None)
        .build()
        .await
        .unwrap();
    harness.queue(Channel::Email, None, t0()).await.unwrap();
    let worker = harness.worker();

    let claimed = worker.claim_due(1, t0()).await.unwrap();
    match worker.dispatch(claimed[0].clone(), t0()).await.unwrap() {
        DispatchOutcome::Deferred { reason, .. } => assert_eq!(reason, DenialReason::NoAllowance),
        other => panic!("expected deferral, got {other:?}"),
    }
}

#[tokio::test]
async fn retryable_failure_reschedules_with_backoff_and_releases_credit() {
    let harness = TestHarness::builder()
        .with_email_script(vec![ScriptedOutcome::Fail(SendError::retryable("503 from provider"))])
        .build()
        .await
        .unwrap();
    let record = harness.queue(Channel::Email, None, t0()).await.unwrap();
    let worker = harness.worker();

    let summary = worker.poll_once(t0()).await.unwrap();
    assert_eq!(summary.rescheduled, 1);

    let after = harness.reload(&record.id).await.unwrap();
    assert_eq!(after.status, DispatchStatus::Queued);
    assert_eq!(after.retry_count, 1);
    assert_eq!(after.scheduled_for, Some(t0() + Duration::seconds(60)));
    assert_eq!(after.last_error.as_deref(), Some("503 from provider"));
    assert_eq!(used(&harness, Channel::Email).await, 0);

    assert_eq!(worker.poll_once(t0() + Duration::seconds(30)).await.unwrap().claimed, 0);
    let retry = worker.poll_once(t0() + Duration::seconds(61)).await.unwrap();
    assert_eq!(retry.sent, 1);
    assert_eq!(harness.reload(&record.id).await.unwrap().retry_count, 1);
    assert_eq!(used(&harness, Channel::Email).await, 1);
}

#[tokio::test]
async fn three_retryable_failures_end_in_failed() {
    let fail = || ScriptedOutcome::Fail(SendError::retryable("connection reset"));
    let harness = TestHarness::builder()
        .with_email_script(vec![fail(), fail(), fail()])
        .build()
        .await
        .unwrap();
    let record = harness.queue(Channel::Email, None, t0()).await.unwrap();
    let worker = harness.worker();

    let mut now = t0();
    worker.poll_once(now).await.unwrap();
    now += Duration::seconds(61);
    worker.poll_once(now).await.unwrap();
    now += Duration::seconds(121);
    let last = worker.poll_once(now).await.unwrap();
    assert_eq!(last.failed, 1);

    let after = harness.reload(&record.id).await.unwrap();
    assert_eq!(after.status, DispatchStatus::Failed);
    assert_eq!(after.retry_count, 3);
    assert_eq!(after.last_error.as_deref(), Some("connection reset"));
    assert!(after.sent_at.is_none());
    assert_eq!(harness.email.send_count().await, 3);
    assert_eq!(used(&harness, Channel::Email).await, 0);

    let types = harness.audit_types(&record.id).await.unwrap();
    assert_eq!(
        types,
        vec![
            AuditEventType::Queued,
            AuditEventType::RetryScheduled,
            AuditEventType::RetryScheduled,
            AuditEventType::SendFailed,
        ]
    );
    assert_eq!(worker.poll_once(now + Duration::days(1)).await.unwrap().claimed, 0);
}

#[tokio::test]
async fn permanent_failure_fails_on_first_attempt() {
    let harness = TestHarness::builder()
        .with_sms_script(vec![ScriptedOutcome::Fail(SendError::permanent("invalid number"))])
        .build()
        .await
        .unwrap();
    let record = harness.queue(Channel::Sms, None, t0()).await.unwrap();
    let worker = harness.worker();

    let claimed = worker.claim_due(1, t0()).await.unwrap();
    let outcome = worker.dispatch(claimed[0].clone(), t0()).await.unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Failed {
            retry_count: 1,
            reason: "invalid number".into(),
        }
    );
    let after = harness.reload(&record.id).await.unwrap();
    assert_eq!(after.status, DispatchStatus::Failed);
    assert_eq!(used(&harness, Channel::Sms).await, 0);
}

#[tokio::test]
async fn provider_timeout_is_retryable() {
    let harness = TestHarness::builder()
        .with_dispatch_config(DispatchConfig {
            provider_timeout_secs: 1,
            ..DispatchConfig::default()
        })
        .with_email_script(vec![ScriptedOutcome::Stall(std::time::Duration::from_secs(3))])
        .build()
        .await
        .unwrap();
    let record = harness.queue(Channel::Email, None, t0()).await.unwrap();

    let summary = harness.worker().poll_once(t0()).await.unwrap();
    assert_eq!(summary.rescheduled, 1);
    let after = harness.reload(&record.id).await.unwrap();
    assert_eq!(after.retry_count, 1);
    assert!(after.last_error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn future_and_cancelled_records_are_not_claimed() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness
        .queue(Channel::Email, Some(t0() + Duration::hours(1)), t0())
        .await
        .unwrap();
    let cancelled = harness.queue(Channel::Email, None, t0()).await.unwrap();
    assert_eq!(
        dispatches::cancel_dispatch(&harness.db, &cancelled.id, t0()).await.unwrap(),
        CancelOutcome::Cancelled
    );

    let summary = harness.worker().poll_once(t0()).await.unwrap();
    assert_eq!(summary.claimed, 0);
    assert_eq!(harness.email.send_count().await, 0);
}

#[tokio::test]
async fn claimed_record_cannot_be_cancelled() {
    let harness = TestHarness::builder().build().await.unwrap();
    let record = harness.queue(Channel::Email, None, t0()).await.unwrap();
    let worker = harness.worker();

    let claimed = worker.claim_due(1, t0()).await.unwrap();
    assert!(matches!(
        dispatches::cancel_dispatch(&harness.db, &record.id, t0()).await.unwrap(),
        CancelOutcome::NotCancellable { claimed: true, .. }
    ));
    worker.dispatch(claimed[0].clone(), t0()).await.unwrap();
    assert_eq!(harness.reload(&record.id).await.unwrap().status, DispatchStatus::Sent);
}

#[tokio::test]
async fn concurrent_workers_never_send_twice() {
    let harness = TestHarness::builder().build().await.unwrap();
    for _ in 0..12 {
        harness.queue(Channel::Email, None, t0()).await.unwrap();
    }
    let a = harness.worker();
    let b = harness.worker();

    let (ra, rb) = tokio::join!(a.poll_once(t0()), b.poll_once(t0()));
    let (ra, rb) = (ra.unwrap(), rb.unwrap());
    assert_eq!(ra.claimed + rb.claimed, 12);
    assert_eq!(ra.sent + rb.sent, 12);
    assert_eq!(harness.email.send_count().await, 12);
    assert_eq!(used(&harness, Channel::Email).await, 12);
}

#[tokio::test]
async fn worker_stops_on_cancel() {
    let harness = TestHarness::builder()
        .with_dispatch_config(DispatchConfig {
            poll_interval_ms: 10,
            ..DispatchConfig::default()
        })
        .build()
        .await
        .unwrap();
    harness.queue(Channel::Email, None, Utc::now()).await.unwrap();
    let worker = harness.worker();
    let cancel = tokio_util::sync::CancellationToken::new();

    let stopper = cancel.clone();
    let run = worker.run(cancel);
    let stop = async move {
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        stopper.cancel();
    };
    let (result, ()) = tokio::join!(run, stop);
    result.unwrap();
    assert_eq!(harness.email.send_count().await, 1);
}
