// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parking lot for provider events that missed their batch budget.
//!
//! Rows are leased by [`take_deferred`] the same way dispatches are claimed:
//! `next_attempt_at` is pushed past the lease so a second poller skips them.

use chrono::{DateTime, Utc};
use plaudit_core::PlauditError;
use rusqlite::{TransactionBehavior, params};

use crate::database::{Database, map_tr_err};
use crate::models::{DeferredEvent, format_ts};

/// Park canonical event payloads for a later attempt. Returns how many were stored.
pub async fn push_deferred(
    db: &Database,
    provider: &str,
    payloads: Vec<String>,
    last_error: Option<String>,
    now: DateTime<Utc>,
) -> Result<usize, PlauditError> {
    if payloads.is_empty() {
        return Ok(0);
    }
    let provider = provider.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<usize> {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO deferred_provider_events
                        (provider, payload, last_error, next_attempt_at, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)",
                )?;
                let now_s = format_ts(now);
                for payload in &payloads {
                    stmt.execute(params![provider, payload, last_error, now_s])?;
                }
            }
            tx.commit()?;
            Ok(payloads.len())
        })
        .await
        .map_err(map_tr_err)
}

/// Lease up to `limit` due events until `lease_until`.
pub async fn take_deferred(
    db: &Database,
    limit: usize,
    now: DateTime<Utc>,
    lease_until: DateTime<Utc>,
) -> Result<Vec<DeferredEvent>, PlauditError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> rusqlite::Result<Vec<DeferredEvent>> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let events = {
                let mut stmt = tx.prepare(
                    "SELECT id, provider, payload, attempts, last_error
                     FROM deferred_provider_events
                     WHERE next_attempt_at <= ?1
                     ORDER BY next_attempt_at ASC, id ASC
                     LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![format_ts(now), limit], |row| {
                    Ok(DeferredEvent {
                        id: row.get(0)?,
                        provider: row.get(1)?,
                        payload: row.get(2)?,
                        attempts: row.get(3)?,
                        last_error: row.get(4)?,
                    })
                })?;
                rows.collect::<Result<Vec<_>, _>>()?
            };
            let lease = format_ts(lease_until);
            for event in &events {
                tx.execute(
                    "UPDATE deferred_provider_events SET next_attempt_at = ?2 WHERE id = ?1",
                    params![event.id, lease],
                )?;
            }
            tx.commit()?;
            Ok(events)
        })
        .await
        .map_err(map_tr_err)
}

/// Remove an event that was reconciled.
pub async fn complete_deferred(db: &Database, id: i64) -> Result<(), PlauditError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM deferred_provider_events WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record a failed attempt and schedule the next one. Returns the attempt count.
pub async fn requeue_deferred(
    db: &Database,
    id: i64,
    error: &str,
    next_attempt_at: DateTime<Utc>,
) -> Result<u32, PlauditError> {
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "UPDATE deferred_provider_events
                 SET attempts = attempts + 1, last_error = ?2, next_attempt_at = ?3
                 WHERE id = ?1
                 RETURNING attempts",
                params![id, error, format_ts(next_attempt_at)],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

pub async fn count_deferred(db: &Database) -> Result<u64, PlauditError> {
    db.connection()
        .call(|conn| {
            conn.query_row("SELECT COUNT(*) FROM deferred_provider_events", [], |row| {
                row.get(0)
            })
        })
        .await
        .map_err(map_tr_err)
}
