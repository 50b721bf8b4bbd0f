// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tracking-link click accounting.

use chrono::{DateTime, Utc};
use plaudit_core::{AuditEventType, AuditSource, DispatchStatus, NewAuditEvent, PlauditError};
use rusqlite::{OptionalExtension, TransactionBehavior, params};

use crate::database::{Database, map_tr_err};
use crate::models::{ClickContext, ClickOutcome, conversion_err};
use crate::queries::audit::insert_audit_event;
use crate::queries::dispatches::{annotate_outcome, apply_transition};

/// Resolve a tracking token and record the click.
///
/// Unknown tokens are answered from a plain read and never open a write
/// transaction. For known tokens the lookup, the first-click transition and
/// the audit event run in one `BEGIN IMMEDIATE` transaction, so of two
/// concurrent requests exactly one observes `clicked_at` unset and the
/// other records a repeat click.
pub async fn record_click(
    db: &Database,
    token: &str,
    now: DateTime<Utc>,
    metadata: serde_json::Value,
) -> Result<ClickOutcome, PlauditError> {
    let token = token.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<ClickOutcome> {
            let dispatch_id: Option<String> = conn
                .query_row(
                    "SELECT id FROM dispatches WHERE tracking_token = ?1",
                    params![token],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(dispatch_id) = dispatch_id else {
                return Ok(ClickOutcome::NotFound);
            };

            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let (status, is_active, already_clicked, mut context) = tx.query_row(
                "SELECT d.status, d.is_active, d.clicked_at IS NOT NULL, d.review_url,
                        b.name, b.review_link, b.website, c.first_name
                 FROM dispatches d
                 JOIN businesses b ON b.id = d.business_id
                 JOIN customers c ON c.id = d.customer_id
                 WHERE d.id = ?1",
                params![dispatch_id],
                |row| {
                    let status: String = row.get(0)?;
                    let status: DispatchStatus =
                        status.parse().map_err(|e| conversion_err(0, e))?;
                    let context = ClickContext {
                        dispatch_id: dispatch_id.clone(),
                        status,
                        record_review_url: row.get(3)?,
                        business_name: row.get(4)?,
                        business_review_link: row.get(5)?,
                        business_website: row.get(6)?,
                        customer_first_name: row.get(7)?,
                    };
                    Ok((status, row.get::<_, bool>(1)?, row.get::<_, bool>(2)?, context))
                },
            )?;

            if !is_active || status == DispatchStatus::OptedOut {
                return Ok(ClickOutcome::Inactive {
                    dispatch_id,
                    status,
                });
            }

            if already_clicked {
                let event = NewAuditEvent::new(
                    AuditEventType::RepeatClick,
                    AuditSource::Redirect,
                    "tracking link clicked again",
                )
                .with_metadata(metadata);
                insert_audit_event(&tx, &dispatch_id, &event, now)?;
                tx.commit()?;
                return Ok(ClickOutcome::RepeatClick(context));
            }

            let outcome = apply_transition(&tx, &dispatch_id, DispatchStatus::Clicked, now, None)?
                .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            let event = NewAuditEvent::new(
                AuditEventType::Clicked,
                AuditSource::Redirect,
                "tracking link clicked",
            )
            .with_metadata(metadata);
            insert_audit_event(&tx, &dispatch_id, &annotate_outcome(event, &outcome), now)?;
            tx.commit()?;

            if let plaudit_core::TransitionOutcome::Applied { to, .. } = outcome {
                context.status = to;
            }
            Ok(ClickOutcome::FirstClick(context))
        })
        .await
        .map_err(map_tr_err)
}
