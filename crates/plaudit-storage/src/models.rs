// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage-side models and row codecs.
//!
//! Canonical domain types live in `plaudit-core`; this module adds the tenant
//! projections only the store needs, the outcome enums of multi-step store
//! operations, and the helpers that move timestamps and enums through SQLite.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use plaudit_core::{AuditEvent, DispatchRecord, DispatchStatus, TransitionOutcome};
use rusqlite::Row;
use rusqlite::types::Type;
use serde::{Deserialize, Serialize};

/// Fixed-width UTC text; lexicographic order equals time order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|ts| ts.with_timezone(&Utc))
}

/// The business projection used for personalization and redirect targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Business {
    pub id: String,
    pub name: String,
    /// Designated review link, preferred over everything else at click time.
    pub review_link: Option<String>,
    pub website: Option<String>,
}

/// The customer projection used for dispatch creation and personalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub business_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Everything the redirect page needs, resolved in the click transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickContext {
    pub dispatch_id: String,
    pub status: DispatchStatus,
    pub business_name: String,
    pub customer_first_name: Option<String>,
    pub business_review_link: Option<String>,
    pub record_review_url: Option<String>,
    pub business_website: Option<String>,
}

/// Result of [`crate::queries::clicks::record_click`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// No dispatch has this token. Nothing was written.
    NotFound,
    /// The dispatch is deactivated or opted out. Nothing was written.
    Inactive {
        dispatch_id: String,
        status: DispatchStatus,
    },
    /// This request set `clicked_at`.
    FirstClick(ClickContext),
    /// `clicked_at` was already set; a repeat-click audit event was written.
    RepeatClick(ClickContext),
}

/// How a failed send attempt should be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendFailure {
    pub reason: String,
    /// Retry count after this attempt.
    pub retry_count: u32,
    /// `Some` to requeue at that time, `None` to fail the record for good.
    pub next_attempt_at: Option<DateTime<Utc>>,
}

/// Result of [`crate::queries::dispatches::record_send_failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Rescheduled {
        retry_count: u32,
        next_attempt_at: DateTime<Utc>,
    },
    Failed {
        retry_count: u32,
        transition: TransitionOutcome,
    },
    /// The worker's claim expired and another worker holds the record.
    ClaimLost,
}

/// Result of [`crate::queries::dispatches::cancel_dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// The record already left `Queued`, is inactive, or is claimed by a worker.
    NotCancellable {
        status: DispatchStatus,
        is_active: bool,
        claimed: bool,
    },
    NotFound,
}

/// A provider event parked for a later reconciliation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredEvent {
    pub id: i64,
    pub provider: String,
    /// Canonical `ProviderEvent` JSON.
    pub payload: String,
    pub attempts: u32,
    pub last_error: Option<String>,
}

pub fn conversion_err<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw).map_err(|e| conversion_err(idx, e))
}

pub fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| parse_ts(&r).map_err(|e| conversion_err(idx, e)))
        .transpose()
}

pub fn enum_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = strum::ParseError>,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw).map_err(|e| conversion_err(idx, e))
}

/// Column list matching [`dispatch_from_row`].
pub(crate) const DISPATCH_COLUMNS: &str = "id, tracking_token, business_id, customer_id, channel, \
     contact, subject, body, review_url, status, scheduled_for, sent_at, delivered_at, \
     clicked_at, completed_at, followup_sent_at, retry_count, last_error, \
     provider_message_id, claimed_by, locked_until, is_active, created_at, updated_at";

pub(crate) fn dispatch_from_row(row: &Row<'_>) -> rusqlite::Result<DispatchRecord> {
    Ok(DispatchRecord {
        id: row.get(0)?,
        tracking_token: row.get(1)?,
        business_id: row.get(2)?,
        customer_id: row.get(3)?,
        channel: enum_col(row, 4)?,
        contact: row.get(5)?,
        subject: row.get(6)?,
        body: row.get(7)?,
        review_url: row.get(8)?,
        status: enum_col(row, 9)?,
        scheduled_for: opt_ts_col(row, 10)?,
        sent_at: opt_ts_col(row, 11)?,
        delivered_at: opt_ts_col(row, 12)?,
        clicked_at: opt_ts_col(row, 13)?,
        completed_at: opt_ts_col(row, 14)?,
        followup_sent_at: opt_ts_col(row, 15)?,
        retry_count: row.get(16)?,
        last_error: row.get(17)?,
        provider_message_id: row.get(18)?,
        claimed_by: row.get(19)?,
        locked_until: opt_ts_col(row, 20)?,
        is_active: row.get(21)?,
        created_at: ts_col(row, 22)?,
        updated_at: ts_col(row, 23)?,
    })
}

pub(crate) fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<AuditEvent> {
    let metadata: String = row.get(5)?;
    Ok(AuditEvent {
        id: row.get(0)?,
        dispatch_id: row.get(1)?,
        event_type: enum_col(row, 2)?,
        source: enum_col(row, 3)?,
        description: row.get(4)?,
        metadata: serde_json::from_str(&metadata).map_err(|e| conversion_err(5, e))?,
        created_at: ts_col(row, 6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_are_fixed_width_and_round_trip() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let text = format_ts(ts);
        assert_eq!(text, "2026-03-04T05:06:07.000Z");
        assert_eq!(parse_ts(&text).unwrap(), ts);

        let later = format_ts(ts + chrono::Duration::milliseconds(1500));
        assert!(later > text);
    }
}
