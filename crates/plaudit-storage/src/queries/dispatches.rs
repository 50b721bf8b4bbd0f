// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch record operations.
//!
//! [`apply_transition`] is the only code path that changes `status`. It is a
//! compare-and-set on the current status, guarded by
//! [`DispatchStatus::admits`], and is composable inside the caller's
//! transaction so a transition, its audit event and any side effect commit
//! together.

use chrono::{DateTime, Utc};
use plaudit_core::{
    AuditEventType, AuditSource, Channel, DispatchRecord, DispatchStatus, NewAuditEvent,
    NewDispatch, PlauditError, TransitionOutcome, generate_tracking_token, normalize_contact,
};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params, params_from_iter};
use serde_json::json;
use tracing::debug;

use crate::database::{Database, map_tr_err};
use crate::models::{
    CancelOutcome, DISPATCH_COLUMNS, FailureOutcome, SendFailure, conversion_err,
    dispatch_from_row, format_ts, opt_ts_col,
};
use crate::queries::audit::insert_audit_event;

/// Load a dispatch by id on an open connection or transaction.
pub fn load_dispatch(conn: &Connection, id: &str) -> rusqlite::Result<Option<DispatchRecord>> {
    conn.query_row(
        &format!("SELECT {DISPATCH_COLUMNS} FROM dispatches WHERE id = ?1"),
        params![id],
        dispatch_from_row,
    )
    .optional()
}

/// Load the most recent dispatch carrying a provider message id.
pub fn load_by_provider_message_id(
    conn: &Connection,
    provider_message_id: &str,
) -> rusqlite::Result<Option<DispatchRecord>> {
    conn.query_row(
        &format!(
            "SELECT {DISPATCH_COLUMNS} FROM dispatches
             WHERE provider_message_id = ?1
             ORDER BY created_at DESC LIMIT 1"
        ),
        params![provider_message_id],
        dispatch_from_row,
    )
    .optional()
}

/// Move a dispatch forward to `target` if the lifecycle admits it.
///
/// Sets the target's milestone timestamp if unset, backfills `sent_at` for
/// statuses that imply the message left the provider, records `last_error`
/// when given, and drops any worker claim. Returns `None` when no dispatch
/// has this id. A non-admitted target leaves the row untouched.
pub fn apply_transition(
    conn: &Connection,
    id: &str,
    target: DispatchStatus,
    now: DateTime<Utc>,
    last_error: Option<&str>,
) -> rusqlite::Result<Option<TransitionOutcome>> {
    let now = format_ts(now);

    let mut assignments = vec![
        "status = ?1".to_string(),
        "updated_at = ?2".to_string(),
        "last_error = COALESCE(?3, last_error)".to_string(),
        "claimed_by = NULL".to_string(),
        "locked_until = NULL".to_string(),
    ];
    if let Some(milestone) = target.milestone() {
        let col = milestone.column();
        assignments.push(format!("{col} = COALESCE({col}, ?2)"));
    }
    if target.implies_sent() && target != DispatchStatus::Sent {
        assignments.push("sent_at = COALESCE(sent_at, ?2)".to_string());
    }
    let sql = format!(
        "UPDATE dispatches SET {} WHERE id = ?4 AND status = ?5",
        assignments.join(", ")
    );

    // Each lost race means another writer moved the record forward, and the
    // lifecycle is finite, so this terminates.
    loop {
        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM dispatches WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(current) = current else {
            return Ok(None);
        };
        let current: DispatchStatus = current.parse().map_err(|e| conversion_err(0, e))?;

        if !current.admits(target) {
            return Ok(Some(TransitionOutcome::Unchanged { current }));
        }

        let changed = conn.execute(
            &sql,
            params![target.to_string(), now, last_error, id, current.to_string()],
        )?;
        if changed == 1 {
            return Ok(Some(TransitionOutcome::Applied {
                from: current,
                to: target,
            }));
        }
    }
}

/// Adds the transition result to an audit event's metadata.
pub fn annotate_outcome(mut event: NewAuditEvent, outcome: &TransitionOutcome) -> NewAuditEvent {
    let (applied, status) = match outcome {
        TransitionOutcome::Applied { to, .. } => (true, *to),
        TransitionOutcome::Unchanged { current } => (false, *current),
    };
    if let Some(map) = event.metadata.as_object_mut() {
        map.insert("status_changed".to_string(), json!(applied));
        map.insert("status".to_string(), json!(status.to_string()));
    }
    event
}

/// Create a queued dispatch with a fresh id and tracking token.
pub async fn create_dispatch(
    db: &Database,
    new: NewDispatch,
    now: DateTime<Utc>,
) -> Result<DispatchRecord, PlauditError> {
    let contact = normalize_contact(new.channel, &new.contact);
    if contact.is_empty() {
        return Err(PlauditError::Internal(
            "dispatch contact must not be empty".to_string(),
        ));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let token = generate_tracking_token();

    let record = db
        .connection()
        .call(move |conn| -> rusqlite::Result<Result<DispatchRecord, PlauditError>> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let owner: Option<String> = tx
                .query_row(
                    "SELECT business_id FROM customers WHERE id = ?1",
                    params![new.customer_id],
                    |row| row.get(0),
                )
                .optional()?;
            if owner.as_deref() != Some(new.business_id.as_str()) {
                return Ok(Err(PlauditError::NotFound {
                    entity: "customer",
                    id: format!("{} (business {})", new.customer_id, new.business_id),
                }));
            }

            let now_s = format_ts(now);
            tx.execute(
                "INSERT INTO dispatches (id, tracking_token, business_id, customer_id, channel,
                    contact, subject, body, review_url, status, scheduled_for,
                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'queued', ?10, ?11, ?11)",
                params![
                    id,
                    token,
                    new.business_id,
                    new.customer_id,
                    new.channel.to_string(),
                    contact,
                    new.subject,
                    new.body,
                    new.review_url,
                    new.scheduled_for.map(format_ts),
                    now_s,
                ],
            )?;

            let event = NewAuditEvent::new(AuditEventType::Queued, AuditSource::System, "dispatch queued")
                .with_metadata(json!({
                    "channel": new.channel.to_string(),
                    "scheduled_for": new.scheduled_for.map(format_ts),
                }));
            insert_audit_event(&tx, &id, &event, now)?;

            let record = load_dispatch(&tx, &id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            tx.commit()?;
            Ok(Ok(record))
        })
        .await
        .map_err(map_tr_err)??;

    debug!(dispatch_id = %record.id, channel = %record.channel, "dispatch created");
    Ok(record)
}

pub async fn get_dispatch(db: &Database, id: &str) -> Result<Option<DispatchRecord>, PlauditError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| load_dispatch(conn, &id))
        .await
        .map_err(map_tr_err)
}

pub async fn find_by_tracking_token(
    db: &Database,
    token: &str,
) -> Result<Option<DispatchRecord>, PlauditError> {
    let token = token.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {DISPATCH_COLUMNS} FROM dispatches WHERE tracking_token = ?1"),
                params![token],
                dispatch_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn find_by_provider_message_id(
    db: &Database,
    provider_message_id: &str,
) -> Result<Option<DispatchRecord>, PlauditError> {
    let provider_message_id = provider_message_id.to_string();
    db.connection()
        .call(move |conn| load_by_provider_message_id(conn, &provider_message_id))
        .await
        .map_err(map_tr_err)
}

/// Atomically claim up to `limit` due dispatches for `worker_id`.
///
/// A dispatch is due when it is queued, active, scheduled at or before `now`
/// (or unscheduled), and holds no live lease. The conditional update marks
/// the claim and returns the claimed rows in one statement, so two workers
/// never receive the same record while a lease is live.
pub async fn claim_due(
    db: &Database,
    worker_id: &str,
    channels: &[Channel],
    limit: usize,
    now: DateTime<Utc>,
    locked_until: DateTime<Utc>,
) -> Result<Vec<DispatchRecord>, PlauditError> {
    if channels.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let mut values: Vec<Value> = vec![
        Value::Text(worker_id.to_string()),
        Value::Text(format_ts(locked_until)),
        Value::Text(format_ts(now)),
        Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)),
    ];
    let placeholders: Vec<String> = channels
        .iter()
        .enumerate()
        .map(|(i, channel)| {
            values.push(Value::Text(channel.to_string()));
            format!("?{}", i + 5)
        })
        .collect();

    let sql = format!(
        "UPDATE dispatches
         SET claimed_by = ?1, locked_until = ?2, updated_at = ?3
         WHERE id IN (
             SELECT id FROM dispatches
             WHERE status = 'queued'
               AND is_active = 1
               AND (scheduled_for IS NULL OR scheduled_for <= ?3)
               AND (locked_until IS NULL OR locked_until <= ?3)
               AND channel IN ({})
             ORDER BY COALESCE(scheduled_for, created_at) ASC, created_at ASC
             LIMIT ?4
         )
         RETURNING {DISPATCH_COLUMNS}",
        placeholders.join(", ")
    );

    let mut claimed = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), dispatch_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)?;

    claimed.sort_by(|a, b| {
        let ka = a.scheduled_for.unwrap_or(a.created_at);
        let kb = b.scheduled_for.unwrap_or(b.created_at);
        ka.cmp(&kb).then(a.created_at.cmp(&b.created_at))
    });
    Ok(claimed)
}

/// Drop `worker_id`'s claim so the record is immediately claimable again.
pub async fn release_claim(
    db: &Database,
    id: &str,
    worker_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, PlauditError> {
    let id = id.to_string();
    let worker_id = worker_id.to_string();
    let changed = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE dispatches SET claimed_by = NULL, locked_until = NULL, updated_at = ?3
                 WHERE id = ?1 AND claimed_by = ?2",
                params![id, worker_id, format_ts(now)],
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok(changed == 1)
}

/// Hold a queued record back until `until` without touching its status,
/// retry count or schedule, and audit why.
pub async fn defer_claim(
    db: &Database,
    id: &str,
    worker_id: &str,
    until: DateTime<Utc>,
    now: DateTime<Utc>,
    event: NewAuditEvent,
) -> Result<bool, PlauditError> {
    let id = id.to_string();
    let worker_id = worker_id.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<bool> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let changed = tx.execute(
                "UPDATE dispatches SET claimed_by = NULL, locked_until = ?3, updated_at = ?4
                 WHERE id = ?1 AND claimed_by = ?2 AND status = 'queued'",
                params![id, worker_id, format_ts(until), format_ts(now)],
            )?;
            if changed == 1 {
                insert_audit_event(&tx, &id, &event, now)?;
            }
            tx.commit()?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Record a provider acceptance: transition to `Sent`, store the provider
/// message id, and audit, in one transaction.
pub async fn record_send_success(
    db: &Database,
    id: &str,
    provider_message_id: &str,
    now: DateTime<Utc>,
    event: NewAuditEvent,
) -> Result<TransitionOutcome, PlauditError> {
    let id_owned = id.to_string();
    let provider_message_id = provider_message_id.to_string();
    let outcome = db
        .connection()
        .call(move |conn| -> rusqlite::Result<Option<TransitionOutcome>> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let Some(outcome) = apply_transition(&tx, &id_owned, DispatchStatus::Sent, now, None)?
            else {
                return Ok(None);
            };
            tx.execute(
                "UPDATE dispatches SET provider_message_id = ?2, claimed_by = NULL,
                    locked_until = NULL, updated_at = ?3
                 WHERE id = ?1",
                params![id_owned, provider_message_id, format_ts(now)],
            )?;
            insert_audit_event(&tx, &id_owned, &annotate_outcome(event, &outcome), now)?;
            tx.commit()?;
            Ok(Some(outcome))
        })
        .await
        .map_err(map_tr_err)?;

    outcome.ok_or_else(|| PlauditError::NotFound {
        entity: "dispatch",
        id: id.to_string(),
    })
}

/// Record a failed send attempt for a record `worker_id` holds.
///
/// With `next_attempt_at` the record stays queued and is rescheduled;
/// without it the record transitions to `Failed`. Either way the retry
/// count, last error and audit event commit together.
pub async fn record_send_failure(
    db: &Database,
    id: &str,
    worker_id: &str,
    failure: SendFailure,
    now: DateTime<Utc>,
    event: NewAuditEvent,
) -> Result<FailureOutcome, PlauditError> {
    let id_owned = id.to_string();
    let worker_id = worker_id.to_string();
    let outcome = db
        .connection()
        .call(move |conn| -> rusqlite::Result<Option<FailureOutcome>> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let holder: Option<Option<String>> = tx
                .query_row(
                    "SELECT claimed_by FROM dispatches WHERE id = ?1",
                    params![id_owned],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(holder) = holder else {
                return Ok(None);
            };
            if holder.as_deref() != Some(worker_id.as_str()) {
                insert_audit_event(&tx, &id_owned, &event, now)?;
                tx.commit()?;
                return Ok(Some(FailureOutcome::ClaimLost));
            }

            let now_s = format_ts(now);
            let outcome = match failure.next_attempt_at {
                Some(next_attempt_at) => {
                    tx.execute(
                        "UPDATE dispatches SET retry_count = ?2, last_error = ?3,
                            scheduled_for = ?4, claimed_by = NULL, locked_until = NULL,
                            updated_at = ?5
                         WHERE id = ?1",
                        params![
                            id_owned,
                            failure.retry_count,
                            failure.reason,
                            format_ts(next_attempt_at),
                            now_s,
                        ],
                    )?;
                    insert_audit_event(&tx, &id_owned, &event, now)?;
                    FailureOutcome::Rescheduled {
                        retry_count: failure.retry_count,
                        next_attempt_at,
                    }
                }
                None => {
                    tx.execute(
                        "UPDATE dispatches SET retry_count = ?2, updated_at = ?3 WHERE id = ?1",
                        params![id_owned, failure.retry_count, now_s],
                    )?;
                    let transition = apply_transition(
                        &tx,
                        &id_owned,
                        DispatchStatus::Failed,
                        now,
                        Some(&failure.reason),
                    )?
                    .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
                    insert_audit_event(&tx, &id_owned, &annotate_outcome(event, &transition), now)?;
                    FailureOutcome::Failed {
                        retry_count: failure.retry_count,
                        transition,
                    }
                }
            };
            tx.commit()?;
            Ok(Some(outcome))
        })
        .await
        .map_err(map_tr_err)?;

    outcome.ok_or_else(|| PlauditError::NotFound {
        entity: "dispatch",
        id: id.to_string(),
    })
}

/// Apply a forward-only transition and append its audit event atomically.
///
/// The audit event is written whether or not the status moved.
pub async fn transition_with_audit(
    db: &Database,
    id: &str,
    target: DispatchStatus,
    now: DateTime<Utc>,
    last_error: Option<String>,
    event: NewAuditEvent,
) -> Result<TransitionOutcome, PlauditError> {
    let id_owned = id.to_string();
    let outcome = db
        .connection()
        .call(move |conn| -> rusqlite::Result<Option<TransitionOutcome>> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let Some(outcome) = apply_transition(&tx, &id_owned, target, now, last_error.as_deref())?
            else {
                return Ok(None);
            };
            insert_audit_event(&tx, &id_owned, &annotate_outcome(event, &outcome), now)?;
            tx.commit()?;
            Ok(Some(outcome))
        })
        .await
        .map_err(map_tr_err)?;

    outcome.ok_or_else(|| PlauditError::NotFound {
        entity: "dispatch",
        id: id.to_string(),
    })
}

/// The business confirmed the customer left a review.
pub async fn mark_completed(
    db: &Database,
    id: &str,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, PlauditError> {
    let event = NewAuditEvent::new(
        AuditEventType::Completed,
        AuditSource::User,
        "review marked completed",
    );
    transition_with_audit(db, id, DispatchStatus::Completed, now, None, event).await
}

/// A follow-up message went out after the click.
pub async fn record_followup_sent(
    db: &Database,
    id: &str,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, PlauditError> {
    let event = NewAuditEvent::new(
        AuditEventType::FollowupSent,
        AuditSource::System,
        "follow-up sent",
    );
    transition_with_audit(db, id, DispatchStatus::FollowupSent, now, None, event).await
}

/// Deactivate a queued dispatch that no worker currently holds.
///
/// Once a worker's claim is live the cancel is refused for that attempt.
pub async fn cancel_dispatch(
    db: &Database,
    id: &str,
    now: DateTime<Utc>,
) -> Result<CancelOutcome, PlauditError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<CancelOutcome> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let row = tx
                .query_row(
                    "SELECT status, is_active, claimed_by, locked_until FROM dispatches WHERE id = ?1",
                    params![id],
                    |row| {
                        let status: String = row.get(0)?;
                        let is_active: bool = row.get(1)?;
                        let claimed_by: Option<String> = row.get(2)?;
                        let locked_until = opt_ts_col(row, 3)?;
                        Ok((status, is_active, claimed_by, locked_until))
                    },
                )
                .optional()?;
            let Some((status, is_active, claimed_by, locked_until)) = row else {
                return Ok(CancelOutcome::NotFound);
            };
            let status: DispatchStatus = status.parse().map_err(|e| conversion_err(0, e))?;
            let claimed = claimed_by.is_some() && locked_until.is_some_and(|until| until > now);

            if status != DispatchStatus::Queued || !is_active || claimed {
                return Ok(CancelOutcome::NotCancellable {
                    status,
                    is_active,
                    claimed,
                });
            }

            tx.execute(
                "UPDATE dispatches SET is_active = 0, claimed_by = NULL, locked_until = NULL,
                    updated_at = ?2
                 WHERE id = ?1",
                params![id, format_ts(now)],
            )?;
            let event = NewAuditEvent::new(
                AuditEventType::Cancelled,
                AuditSource::User,
                "dispatch cancelled before send",
            );
            insert_audit_event(&tx, &id, &event, now)?;
            tx.commit()?;
            Ok(CancelOutcome::Cancelled)
        })
        .await
        .map_err(map_tr_err)
}
