// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-event reconciliation, batch budgets and the deferred re-poll.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use plaudit_config::model::WebhookConfig;
use plaudit_core::{
    AuditEventType, AuditSource, DispatchStatus, NewAuditEvent, PlauditError, ProviderEvent,
    ProviderEventKind, SuppressionReason, TransitionOutcome,
};
use plaudit_storage::queries::audit::insert_audit_event;
use plaudit_storage::queries::{deferred, dispatches};
use plaudit_storage::{Database, map_tr_err};
use plaudit_suppression::{SuppressOutcome, insert_active};
use rusqlite::TransactionBehavior;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Attempts after which a parked event is reported at `error` on every round.
const REDELIVERY_ALERT_ATTEMPTS: u32 = 10;

/// What reconciling one event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestEffect {
    /// The event was audited and the status change (if any) was evaluated.
    Applied {
        dispatch_id: String,
        transition: Option<TransitionOutcome>,
        suppression_created: bool,
    },
    /// No dispatch carries this provider message id. Nothing was written.
    Unmatched,
    /// The event kind has no meaning here. Nothing was written.
    Ignored,
    /// Parked for the re-poll: over budget or the store failed.
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestResult {
    pub provider_message_id: String,
    pub kind: ProviderEventKind,
    pub effect: IngestEffect,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedeliverySummary {
    pub taken: usize,
    pub reconciled: usize,
    pub requeued: usize,
}

/// The internal effect of a provider event kind.
struct Effect {
    target: Option<DispatchStatus>,
    audit: AuditEventType,
    suppression: Option<SuppressionReason>,
    records_error: bool,
}

fn effect_of(kind: &ProviderEventKind) -> Option<Effect> {
    let effect = |target, audit, suppression, records_error| Effect {
        target,
        audit,
        suppression,
        records_error,
    };
    Some(match kind {
        ProviderEventKind::Processed | ProviderEventKind::Accepted => {
            effect(None, AuditEventType::ProviderProcessed, None, false)
        }
        ProviderEventKind::Delivered => effect(
            Some(DispatchStatus::Delivered),
            AuditEventType::Delivered,
            None,
            false,
        ),
        ProviderEventKind::Open => effect(
            Some(DispatchStatus::Clicked),
            AuditEventType::Opened,
            None,
            false,
        ),
        ProviderEventKind::Click => effect(
            Some(DispatchStatus::Clicked),
            AuditEventType::Clicked,
            None,
            false,
        ),
        ProviderEventKind::Bounce => effect(
            Some(DispatchStatus::Bounced),
            AuditEventType::Bounced,
            Some(SuppressionReason::Bounce),
            true,
        ),
        ProviderEventKind::Dropped => effect(
            Some(DispatchStatus::Failed),
            AuditEventType::Dropped,
            Some(SuppressionReason::Bounce),
            true,
        ),
        ProviderEventKind::SpamComplaint => effect(
            Some(DispatchStatus::OptedOut),
            AuditEventType::SpamComplaint,
            Some(SuppressionReason::SpamComplaint),
            false,
        ),
        ProviderEventKind::Unsubscribe => effect(
            Some(DispatchStatus::OptedOut),
            AuditEventType::Unsubscribed,
            Some(SuppressionReason::Unsubscribe),
            false,
        ),
        ProviderEventKind::Unknown(_) => return None,
    })
}

/// Applies provider events to dispatch records.
#[derive(Clone)]
pub struct WebhookReconciler {
    db: Database,
    config: WebhookConfig,
}

impl WebhookReconciler {
    pub fn new(db: Database, config: &WebhookConfig) -> Self {
        Self {
            db,
            config: config.clone(),
        }
    }

    /// Reconcile a batch, one transaction per event.
    ///
    /// Never fails as a whole: store errors and budget overruns park the
    /// affected events instead.
    pub async fn ingest(&self, provider: &str, events: Vec<ProviderEvent>) -> Vec<IngestResult> {
        let started = Instant::now();
        let budget = self.config.batch_budget();
        let mut results = Vec::with_capacity(events.len());
        let mut events = events.into_iter();

        while let Some(event) = events.next() {
            if started.elapsed() >= budget {
                let mut remaining = vec![event];
                remaining.extend(events.by_ref());
                warn!(
                    provider,
                    deferred = remaining.len(),
                    budget_ms = budget.as_millis() as u64,
                    "webhook batch budget exhausted, deferring remaining events"
                );
                results.extend(self.park(provider, remaining, "batch budget exhausted").await);
                break;
            }

            let kind = event.kind.clone();
            let provider_message_id = event.provider_message_id.clone();
            #[cfg(feature = "prometheus")]
            plaudit_prometheus::record_webhook_event(provider, kind.as_str());

            let effect = match self.reconcile(provider, &event, Utc::now()).await {
                Ok(effect) => effect,
                Err(e) => {
                    error!(
                        provider,
                        provider_message_id = provider_message_id.as_str(),
                        error = %e,
                        "failed to reconcile event, deferring"
                    );
                    self.park(provider, vec![event], &e.to_string())
                        .await
                        .into_iter()
                        .next()
                        .map_or(IngestEffect::Deferred, |r| r.effect)
                }
            };
            results.push(IngestResult {
                provider_message_id,
                kind,
                effect,
            });
        }
        results
    }

    /// Persist events for the re-poll. If even that fails, the loss is logged loudly.
    async fn park(&self, provider: &str, events: Vec<ProviderEvent>, reason: &str) -> Vec<IngestResult> {
        let mut payloads = Vec::with_capacity(events.len());
        for event in &events {
            match serde_json::to_string(event) {
                Ok(payload) => payloads.push(payload),
                Err(e) => error!(
                    provider_message_id = event.provider_message_id.as_str(),
                    error = %e,
                    "failed to serialize event for deferral"
                ),
            }
        }
        if let Err(e) =
            deferred::push_deferred(&self.db, provider, payloads, Some(reason.to_string()), Utc::now()).await
        {
            error!(provider, count = events.len(), error = %e, "failed to park provider events");
        }
        events
            .into_iter()
            .map(|event| IngestResult {
                provider_message_id: event.provider_message_id,
                kind: event.kind,
                effect: IngestEffect::Deferred,
            })
            .collect()
    }

    /// Reconcile one event in a single transaction: status transition, audit
    /// event and suppression commit together or not at all.
    pub async fn reconcile(
        &self,
        provider: &str,
        event: &ProviderEvent,
        now: DateTime<Utc>,
    ) -> Result<IngestEffect, PlauditError> {
        let Some(effect) = effect_of(&event.kind) else {
            warn!(
                provider,
                provider_message_id = event.provider_message_id.as_str(),
                kind = event.kind.as_str(),
                "ignoring unknown provider event kind"
            );
            return Ok(IngestEffect::Ignored);
        };

        let provider_owned = provider.to_string();
        let event_owned = event.clone();
        let result = self
            .db
            .connection()
            .call(move |conn| -> rusqlite::Result<IngestEffect> {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let Some(record) =
                    dispatches::load_by_provider_message_id(&tx, &event_owned.provider_message_id)?
                else {
                    return Ok(IngestEffect::Unmatched);
                };

                let last_error = effect.records_error.then(|| {
                    event_owned
                        .raw_reason
                        .clone()
                        .unwrap_or_else(|| format!("{} reported {}", provider_owned, event_owned.kind))
                });

                let transition = match effect.target {
                    Some(target) => dispatches::apply_transition(
                        &tx,
                        &record.id,
                        target,
                        now,
                        last_error.as_deref(),
                    )?,
                    None => None,
                };

                let mut suppression_created = false;
                if let Some(reason) = effect.suppression {
                    let outcome = insert_active(
                        &tx,
                        &record.business_id,
                        &record.contact,
                        record.channel,
                        reason,
                        &format!("webhook:{provider_owned}"),
                        now,
                    )?;
                    suppression_created = matches!(outcome, SuppressOutcome::Created(_));
                }

                let audit = NewAuditEvent::new(
                    effect.audit,
                    AuditSource::Webhook,
                    format!("{} event from {}", event_owned.kind, provider_owned),
                )
                .with_metadata(json!({
                    "provider": provider_owned,
                    "provider_message_id": event_owned.provider_message_id,
                    "kind": event_owned.kind.as_str(),
                    "event_timestamp": event_owned.timestamp,
                    "raw_reason": event_owned.raw_reason,
                    "suppression_created": suppression_created,
                }));
                let audit = match &transition {
                    Some(outcome) => dispatches::annotate_outcome(audit, outcome),
                    None => audit,
                };
                insert_audit_event(&tx, &record.id, &audit, now)?;
                tx.commit()?;

                Ok(IngestEffect::Applied {
                    dispatch_id: record.id,
                    transition,
                    suppression_created,
                })
            })
            .await
            .map_err(map_tr_err)?;

        match &result {
            IngestEffect::Unmatched => warn!(
                provider,
                provider_message_id = event.provider_message_id.as_str(),
                kind = event.kind.as_str(),
                "provider event matches no dispatch"
            ),
            IngestEffect::Applied {
                dispatch_id,
                transition,
                suppression_created,
            } => debug!(
                provider,
                dispatch_id = dispatch_id.as_str(),
                kind = event.kind.as_str(),
                ?transition,
                suppression_created,
                "provider event reconciled"
            ),
            IngestEffect::Ignored | IngestEffect::Deferred => {}
        }
        Ok(result)
    }

    /// Re-ingest one round of parked events.
    pub async fn redeliver(&self, now: DateTime<Utc>) -> Result<RedeliverySummary, PlauditError> {
        let lease_until = offset(now, self.config.redeliver_interval());
        let parked =
            deferred::take_deferred(&self.db, self.config.redeliver_batch_size, now, lease_until).await?;
        let mut summary = RedeliverySummary {
            taken: parked.len(),
            ..RedeliverySummary::default()
        };

        for entry in parked {
            let outcome = match serde_json::from_str::<ProviderEvent>(&entry.payload) {
                Ok(event) => self.reconcile(&entry.provider, &event, now).await,
                Err(e) => Err(PlauditError::Internal(format!("unreadable parked event: {e}"))),
            };
            match outcome {
                Ok(_) => {
                    deferred::complete_deferred(&self.db, entry.id).await?;
                    summary.reconciled += 1;
                }
                Err(e) => {
                    let attempts =
                        deferred::requeue_deferred(&self.db, entry.id, &e.to_string(), lease_until).await?;
                    summary.requeued += 1;
                    if attempts >= REDELIVERY_ALERT_ATTEMPTS {
                        error!(
                            deferred_id = entry.id,
                            provider = entry.provider.as_str(),
                            attempts,
                            error = %e,
                            "parked provider event keeps failing"
                        );
                    } else {
                        warn!(deferred_id = entry.id, attempts, error = %e, "parked provider event requeued");
                    }
                }
            }
        }

        #[cfg(feature = "prometheus")]
        if let Ok(backlog) = deferred::count_deferred(&self.db).await {
            plaudit_prometheus::set_deferred_backlog(backlog as f64);
        }
        Ok(summary)
    }

    /// Re-poll parked events until `cancel` fires.
    pub async fn run_redelivery(&self, cancel: CancellationToken) -> Result<(), PlauditError> {
        let mut ticker = tokio::time::interval(self.config.redeliver_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("webhook redelivery running");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancel.cancelled() => {
                    info!("shutdown signal received, stopping webhook redelivery");
                    break;
                }
            }

            match self.redeliver(Utc::now()).await {
                Ok(summary) if summary.taken > 0 => info!(
                    taken = summary.taken,
                    reconciled = summary.reconciled,
                    requeued = summary.requeued,
                    "redelivered parked provider events"
                ),
                Ok(_) => {}
                Err(e) => error!(error = %e, "webhook redelivery round failed"),
            }
        }
        Ok(())
    }
}

fn offset(now: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(d)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
