// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Atomic credit reservation against `usage_counters`.

use chrono::{DateTime, Utc};
use plaudit_config::model::UsageConfig;
use plaudit_core::{Channel, DenialReason, PlauditError, ReserveOutcome, UsageCounter};
use plaudit_storage::models::{enum_col, format_ts};
use plaudit_storage::{Database, map_tr_err};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::{debug, warn};

/// Share of the quota after which every grant logs a warning.
const WARN_RATIO: f64 = 0.8;

/// Grants and returns send credit.
#[derive(Clone)]
pub struct UsageLimiter {
    db: Database,
    default_email_quota: Option<u32>,
    default_sms_quota: Option<u32>,
}

impl UsageLimiter {
    pub fn new(db: Database, config: &UsageConfig) -> Self {
        Self {
            db,
            default_email_quota: config.default_email_quota,
            default_sms_quota: config.default_sms_quota,
        }
    }

    fn default_quota(&self, channel: Channel) -> Option<u32> {
        match channel {
            Channel::Email => self.default_email_quota,
            Channel::Sms => self.default_sms_quota,
        }
    }

    /// Reserve `count` units of credit.
    ///
    /// Grants only when `used + count <= quota`. A business without a counter
    /// is seeded with the configured default quota, or denied with
    /// [`DenialReason::NoAllowance`] when there is none.
    pub async fn reserve(
        &self,
        business_id: &str,
        channel: Channel,
        count: u32,
        now: DateTime<Utc>,
    ) -> Result<ReserveOutcome, PlauditError> {
        let business = business_id.to_string();
        let seed = self.default_quota(channel);

        let outcome = self
            .db
            .connection()
            .call(move |conn| -> rusqlite::Result<ReserveOutcome> {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                if let Some(granted) = try_increment(&tx, &business, channel, count, now)? {
                    tx.commit()?;
                    return Ok(granted);
                }

                match read_counter(&tx, &business, channel)? {
                    Some((used, quota)) => Ok(ReserveOutcome::Denied {
                        reason: DenialReason::QuotaExhausted,
                        current: used,
                        limit: quota,
                    }),
                    None => {
                        let Some(quota) = seed else {
                            return Ok(ReserveOutcome::Denied {
                                reason: DenialReason::NoAllowance,
                                current: 0,
                                limit: 0,
                            });
                        };
                        tx.execute(
                            "INSERT OR IGNORE INTO usage_counters (business_id, channel, used, quota, updated_at)
                             VALUES (?1, ?2, 0, ?3, ?4)",
                            params![business, channel.to_string(), quota, format_ts(now)],
                        )?;
                        let outcome = match try_increment(&tx, &business, channel, count, now)? {
                            Some(granted) => granted,
                            None => ReserveOutcome::Denied {
                                reason: DenialReason::QuotaExhausted,
                                current: 0,
                                limit: quota,
                            },
                        };
                        tx.commit()?;
                        Ok(outcome)
                    }
                }
            })
            .await
            .map_err(map_tr_err)?;

        match outcome {
            ReserveOutcome::Granted { used, quota } => {
                if quota > 0 && f64::from(used) >= f64::from(quota) * WARN_RATIO {
                    warn!(
                        business_id,
                        %channel,
                        used,
                        quota,
                        "usage at {:.0}% of quota",
                        f64::from(used) / f64::from(quota) * 100.0
                    );
                }
            }
            ReserveOutcome::Denied {
                reason,
                current,
                limit,
            } => {
                debug!(business_id, %channel, %reason, current, limit, "credit denied");
            }
        }
        Ok(outcome)
    }

    /// Return `count` units after a failed send. Never drops `used` below zero.
    pub async fn release(
        &self,
        business_id: &str,
        channel: Channel,
        count: u32,
        now: DateTime<Utc>,
    ) -> Result<(), PlauditError> {
        let business = business_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "UPDATE usage_counters SET used = MAX(used - ?3, 0), updated_at = ?4
                     WHERE business_id = ?1 AND channel = ?2",
                    params![business, channel.to_string(), count, format_ts(now)],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Set the quota for the current period, keeping consumption.
    ///
    /// A quota below the current consumption clamps `used` down to it.
    pub async fn set_quota(
        &self,
        business_id: &str,
        channel: Channel,
        quota: u32,
        now: DateTime<Utc>,
    ) -> Result<(), PlauditError> {
        let business = business_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO usage_counters (business_id, channel, used, quota, updated_at)
                     VALUES (?1, ?2, 0, ?3, ?4)
                     ON CONFLICT(business_id, channel) DO UPDATE SET
                        quota = excluded.quota,
                        used = MIN(used, excluded.quota),
                        updated_at = excluded.updated_at",
                    params![business, channel.to_string(), quota, format_ts(now)],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    pub async fn counter(
        &self,
        business_id: &str,
        channel: Channel,
    ) -> Result<Option<UsageCounter>, PlauditError> {
        let business = business_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.query_row(
                    "SELECT business_id, channel, used, quota FROM usage_counters
                     WHERE business_id = ?1 AND channel = ?2",
                    params![business, channel.to_string()],
                    |row| {
                        Ok(UsageCounter {
                            business_id: row.get(0)?,
                            channel: enum_col(row, 1)?,
                            used: row.get(2)?,
                            quota: row.get(3)?,
                        })
                    },
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)
    }
}

fn try_increment(
    conn: &Connection,
    business_id: &str,
    channel: Channel,
    count: u32,
    now: DateTime<Utc>,
) -> rusqlite::Result<Option<ReserveOutcome>> {
    conn.query_row(
        "UPDATE usage_counters SET used = used + ?3, updated_at = ?4
         WHERE business_id = ?1 AND channel = ?2 AND used + ?3 <= quota
         RETURNING used, quota",
        params![business_id, channel.to_string(), count, format_ts(now)],
        |row| {
            Ok(ReserveOutcome::Granted {
                used: row.get(0)?,
                quota: row.get(1)?,
            })
        },
    )
    .optional()
}

fn read_counter(
    conn: &Connection,
    business_id: &str,
    channel: Channel,
) -> rusqlite::Result<Option<(u32, u32)>> {
    conn.query_row(
        "SELECT used, quota FROM usage_counters WHERE business_id = ?1 AND channel = ?2",
        params![business_id, channel.to_string()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
}
