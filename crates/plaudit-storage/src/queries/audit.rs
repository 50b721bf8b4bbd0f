// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only audit trail.

use chrono::{DateTime, Utc};
use plaudit_core::{AuditEvent, NewAuditEvent, PlauditError};
use rusqlite::{Connection, params};

use crate::database::{Database, map_tr_err};
use crate::models::{audit_from_row, format_ts};

/// Insert one audit event on an open connection or transaction.
pub fn insert_audit_event(
    conn: &Connection,
    dispatch_id: &str,
    event: &NewAuditEvent,
    now: DateTime<Utc>,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO audit_events (dispatch_id, event_type, source, description, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            dispatch_id,
            event.event_type.to_string(),
            event.source.to_string(),
            event.description,
            event.metadata.to_string(),
            format_ts(now),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Append an audit event outside of any other write.
pub async fn append_audit_event(
    db: &Database,
    dispatch_id: &str,
    event: NewAuditEvent,
    now: DateTime<Utc>,
) -> Result<i64, PlauditError> {
    let dispatch_id = dispatch_id.to_string();
    db.connection()
        .call(move |conn| insert_audit_event(conn, &dispatch_id, &event, now))
        .await
        .map_err(map_tr_err)
}

/// All audit events for a dispatch, oldest first.
pub async fn list_audit_events(
    db: &Database,
    dispatch_id: &str,
) -> Result<Vec<AuditEvent>, PlauditError> {
    let dispatch_id = dispatch_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, dispatch_id, event_type, source, description, metadata, created_at
                 FROM audit_events WHERE dispatch_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![dispatch_id], audit_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}
