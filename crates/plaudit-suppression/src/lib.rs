// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Suppression registry: may we contact this address or number on this channel?
//!
//! At most one active entry exists per `(business, contact, channel)`. The
//! partial unique index on active rows enforces that in the store, so
//! concurrent suppressions from a webhook batch and a user action cannot
//! both create one. Contacts are normalized before every lookup and insert.

use chrono::{DateTime, Utc};
use plaudit_core::{
    Channel, PlauditError, SuppressionEntry, SuppressionReason, normalize_contact,
};
use plaudit_storage::models::{enum_col, format_ts, ts_col};
use plaudit_storage::{Database, map_tr_err};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

/// Result of inserting a suppression inside a caller's transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuppressOutcome {
    Created(SuppressionEntry),
    /// An active entry already covers the triple; nothing was written.
    AlreadyActive,
}

/// Insert an active suppression unless one already exists.
///
/// `contact` must already be normalized. Composable inside the reconciler's
/// per-event transaction.
pub fn insert_active(
    conn: &Connection,
    business_id: &str,
    contact: &str,
    channel: Channel,
    reason: SuppressionReason,
    source: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<SuppressOutcome> {
    let inserted = conn.execute(
        "INSERT INTO suppressions (business_id, contact, channel, reason, source, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (business_id, contact, channel) WHERE is_active = 1 DO NOTHING",
        params![
            business_id,
            contact,
            channel.to_string(),
            reason.to_string(),
            source,
            format_ts(now),
        ],
    )?;
    if inserted == 0 {
        return Ok(SuppressOutcome::AlreadyActive);
    }
    Ok(SuppressOutcome::Created(SuppressionEntry {
        id: conn.last_insert_rowid(),
        business_id: business_id.to_string(),
        contact: contact.to_string(),
        channel,
        reason,
        source: source.to_string(),
        is_active: true,
        created_at: now,
    }))
}

/// Whether an active suppression covers the triple. `contact` must be normalized.
pub fn is_suppressed_in(
    conn: &Connection,
    business_id: &str,
    contact: &str,
    channel: Channel,
) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM suppressions
                       WHERE business_id = ?1 AND contact = ?2 AND channel = ?3 AND is_active = 1)",
        params![business_id, contact, channel.to_string()],
        |row| row.get(0),
    )
}

/// Async front for the registry.
#[derive(Clone)]
pub struct SuppressionRegistry {
    db: Database,
}

impl SuppressionRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn is_suppressed(
        &self,
        business_id: &str,
        contact: &str,
        channel: Channel,
    ) -> Result<bool, PlauditError> {
        let business_id = business_id.to_string();
        let contact = normalize_contact(channel, contact);
        self.db
            .connection()
            .call(move |conn| is_suppressed_in(conn, &business_id, &contact, channel))
            .await
            .map_err(map_tr_err)
    }

    /// Block a contact. Fails with [`PlauditError::AlreadySuppressed`] when an
    /// active entry exists.
    pub async fn suppress(
        &self,
        business_id: &str,
        contact: &str,
        channel: Channel,
        reason: SuppressionReason,
        source: &str,
        now: DateTime<Utc>,
    ) -> Result<SuppressionEntry, PlauditError> {
        let business = business_id.to_string();
        let contact = normalize_contact(channel, contact);
        let source = source.to_string();
        let outcome = self
            .db
            .connection()
            .call(move |conn| {
                insert_active(conn, &business, &contact, channel, reason, &source, now)
            })
            .await
            .map_err(map_tr_err)?;

        match outcome {
            SuppressOutcome::Created(entry) => {
                info!(
                    business_id = %entry.business_id,
                    channel = %entry.channel,
                    reason = %entry.reason,
                    "contact suppressed"
                );
                Ok(entry)
            }
            SuppressOutcome::AlreadyActive => Err(PlauditError::AlreadySuppressed {
                business_id: business_id.to_string(),
                channel: channel.to_string(),
            }),
        }
    }

    /// Lift the active suppression for a triple. Returns whether one existed.
    ///
    /// The old entry stays in history; a later suppression creates a new row.
    pub async fn deactivate(
        &self,
        business_id: &str,
        contact: &str,
        channel: Channel,
        now: DateTime<Utc>,
    ) -> Result<bool, PlauditError> {
        let business_id = business_id.to_string();
        let contact = normalize_contact(channel, contact);
        let changed = self
            .db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "UPDATE suppressions SET is_active = 0, deactivated_at = ?4
                     WHERE business_id = ?1 AND contact = ?2 AND channel = ?3 AND is_active = 1",
                    params![business_id, contact, channel.to_string(), format_ts(now)],
                )
            })
            .await
            .map_err(map_tr_err)?;
        Ok(changed > 0)
    }

    /// The active entry for a triple, if any.
    pub async fn active_entry(
        &self,
        business_id: &str,
        contact: &str,
        channel: Channel,
    ) -> Result<Option<SuppressionEntry>, PlauditError> {
        let business_id = business_id.to_string();
        let contact = normalize_contact(channel, contact);
        self.db
            .connection()
            .call(move |conn| {
                conn.query_row(
                    "SELECT id, business_id, contact, channel, reason, source, is_active, created_at
                     FROM suppressions
                     WHERE business_id = ?1 AND contact = ?2 AND channel = ?3 AND is_active = 1",
                    params![business_id, contact, channel.to_string()],
                    |row| {
                        Ok(SuppressionEntry {
                            id: row.get(0)?,
                            business_id: row.get(1)?,
                            contact: row.get(2)?,
                            channel: enum_col(row, 3)?,
                            reason: enum_col(row, 4)?,
                            source: row.get(5)?,
                            is_active: row.get(6)?,
                            created_at: ts_col(row, 7)?,
                        })
                    },
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use plaudit_storage::queries::tenants;
    use plaudit_storage::Business;
    use tempfile::TempDir;

    async fn registry() -> (SuppressionRegistry, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("s.db").to_str().unwrap())
            .await
            .unwrap();
        tenants::upsert_business(
            &db,
            &Business {
                id: "biz-1".into(),
                name: "Bakery".into(),
                review_link: None,
                website: None,
            },
            now(),
        )
        .await
        .unwrap();
        (SuppressionRegistry::new(db), dir)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn suppress_then_lookup_is_case_insensitive_for_email() {
        let (registry, _dir) = registry().await;
        registry
            .suppress("biz-1", "Ada@Example.com", Channel::Email, SuppressionReason::UserRequest, "user", now())
            .await
            .unwrap();

        assert!(registry.is_suppressed("biz-1", "ada@example.com ", Channel::Email).await.unwrap());
        assert!(!registry.is_suppressed("biz-1", "ada@example.com", Channel::Sms).await.unwrap());
        assert!(!registry.is_suppressed("biz-2", "ada@example.com", Channel::Email).await.unwrap());
    }

    #[tokio::test]
    async fn insert_active_reports_created_then_already_active() {
        fn assert_total_eq<T: Eq>(_: &T) {}

        let (registry, _dir) = registry().await;
        let outcomes = registry
            .db
            .connection()
            .call(|conn| {
                let first = insert_active(conn, "biz-1", "ada@example.com", Channel::Email, SuppressionReason::Bounce, "webhook:sendgrid", now())?;
                let second = insert_active(conn, "biz-1", "ada@example.com", Channel::Email, SuppressionReason::Bounce, "webhook:sendgrid", now())?;
                Ok::<_, rusqlite::Error>((first, second))
            })
            .await
            .unwrap();

        assert_total_eq(&outcomes.0);
        let SuppressOutcome::Created(entry) = &outcomes.0 else {
            panic!("first insert should create an entry");
        };
        assert_eq!(entry.contact, "ada@example.com");
        assert_eq!(entry.source, "webhook:sendgrid");
        assert_eq!(outcomes.1, SuppressOutcome::AlreadyActive);

        let stored = registry
            .active_entry("biz-1", "ada@example.com", Channel::Email)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&stored, entry);
    }

    #[tokio::test]
    async fn second_suppress_is_rejected() {
        let (registry, _dir) = registry().await;
        registry
            .suppress("biz-1", "+1 555 010 0001", Channel::Sms, SuppressionReason::Manual, "user", now())
            .await
            .unwrap();
        let err = registry
            .suppress("biz-1", "+15550100001", Channel::Sms, SuppressionReason::Bounce, "webhook:twilio", now())
            .await
            .unwrap_err();
        assert!(matches!(err, PlauditError::AlreadySuppressed { .. }));
    }

    #[tokio::test]
    async fn concurrent_suppress_creates_one_active_entry() {
        let (registry, _dir) = registry().await;
        let attempts = (0..8).map(|_| {
            registry.suppress("biz-1", "ada@example.com", Channel::Email, SuppressionReason::Unsubscribe, "webhook", now())
        });
        let results = futures::future::join_all(attempts).await;
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    }

    #[tokio::test]
    async fn deactivate_allows_a_new_entry() {
        let (registry, _dir) = registry().await;
        let first = registry
            .suppress("biz-1", "ada@example.com", Channel::Email, SuppressionReason::Bounce, "webhook", now())
            .await
            .unwrap();
        assert!(registry.deactivate("biz-1", "ada@example.com", Channel::Email, now()).await.unwrap());
        assert!(!registry.is_suppressed("biz-1", "ada@example.com", Channel::Email).await.unwrap());
        assert!(!registry.deactivate("biz-1", "ada@example.com", Channel::Email, now()).await.unwrap());

        let second = registry
            .suppress("biz-1", "ada@example.com", Channel::Email, SuppressionReason::Manual, "user", now())
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
        let active = registry
            .active_entry("biz-1", "ada@example.com", Channel::Email)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.reason, SuppressionReason::Manual);
    }
}
