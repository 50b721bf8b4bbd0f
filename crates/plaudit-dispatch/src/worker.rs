// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The claim, gate, send and record cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use plaudit_config::model::{DispatchConfig, GatewayConfig, PlauditConfig};
use plaudit_core::{
    AuditEventType, AuditSource, Channel, ChannelProvider, DispatchRecord, DispatchStatus,
    NewAuditEvent, OutboundMessage, PlauditError, ReserveOutcome, SendError,
};
use plaudit_storage::queries::dispatches;
use plaudit_storage::{Database, FailureOutcome, SendFailure};
use plaudit_suppression::SuppressionRegistry;
use plaudit_usage::UsageLimiter;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::outcome::{DispatchOutcome, PollSummary};

/// Replaced with the record's tracking link before a message is sent.
pub const TRACKING_URL_PLACEHOLDER: &str = "{{tracking_url}}";

/// Polls the store for due records and sends them.
pub struct DispatchWorker {
    db: Database,
    suppression: SuppressionRegistry,
    usage: UsageLimiter,
    providers: HashMap<Channel, Arc<dyn ChannelProvider>>,
    config: DispatchConfig,
    gateway: GatewayConfig,
    worker_id: String,
}

impl DispatchWorker {
    /// Creates a worker with no providers. Add them with [`Self::with_provider`].
    pub fn new(
        db: Database,
        suppression: SuppressionRegistry,
        usage: UsageLimiter,
        config: &PlauditConfig,
    ) -> Self {
        let worker_id = format!("{}-{}", config.service.name, uuid::Uuid::new_v4());
        info!(worker_id = worker_id.as_str(), "dispatch worker initialized");
        Self {
            db,
            suppression,
            usage,
            providers: HashMap::new(),
            config: config.dispatch.clone(),
            gateway: config.gateway.clone(),
            worker_id,
        }
    }

    /// Registers the provider for its channel, replacing any earlier one.
    pub fn with_provider(mut self, provider: Arc<dyn ChannelProvider>) -> Self {
        self.providers.insert(provider.channel(), provider);
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Channels this worker can send on, in a stable order.
    pub fn channels(&self) -> Vec<Channel> {
        [Channel::Email, Channel::Sms]
            .into_iter()
            .filter(|c| self.providers.contains_key(c))
            .collect()
    }

    /// Claims up to `limit` due records on the configured channels.
    pub async fn claim_due(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<DispatchRecord>, PlauditError> {
        let locked_until = offset(now, self.config.claim_lease());
        dispatches::claim_due(
            &self.db,
            &self.worker_id,
            &self.channels(),
            limit,
            now,
            locked_until,
        )
        .await
    }

    /// Runs one attempt for a record this worker has claimed.
    pub async fn dispatch(
        &self,
        record: DispatchRecord,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, PlauditError> {
        if record.status != DispatchStatus::Queued {
            dispatches::release_claim(&self.db, &record.id, &self.worker_id, now).await?;
            return Ok(DispatchOutcome::Skipped {
                status: record.status,
            });
        }

        if self
            .suppression
            .is_suppressed(&record.business_id, &record.contact, record.channel)
            .await?
        {
            let event = NewAuditEvent::new(
                AuditEventType::Suppressed,
                AuditSource::System,
                "recipient is suppressed; not sent",
            )
            .with_metadata(json!({ "channel": record.channel }));
            dispatches::transition_with_audit(
                &self.db,
                &record.id,
                DispatchStatus::OptedOut,
                now,
                None,
                event,
            )
            .await?;
            info!(dispatch_id = record.id.as_str(), "recipient suppressed, opted out");
            return Ok(DispatchOutcome::OptedOut);
        }

        let Some(provider) = self.providers.get(&record.channel).cloned() else {
            dispatches::release_claim(&self.db, &record.id, &self.worker_id, now).await?;
            return Err(PlauditError::Provider {
                message: format!("no provider configured for {}", record.channel),
                source: None,
            });
        };

        match self
            .usage
            .reserve(&record.business_id, record.channel, 1, now)
            .await?
        {
            ReserveOutcome::Granted { .. } => {}
            ReserveOutcome::Denied {
                reason,
                current,
                limit,
            } => {
                let until = offset(now, self.config.credit_deferral());
                let event = NewAuditEvent::new(
                    AuditEventType::DeferredNoCredit,
                    AuditSource::System,
                    "deferred: no credits remaining",
                )
                .with_metadata(json!({
                    "reason": reason.to_string(),
                    "current": current,
                    "limit": limit,
                    "deferred_until": until,
                }));
                dispatches::defer_claim(&self.db, &record.id, &self.worker_id, until, now, event)
                    .await?;
                #[cfg(feature = "prometheus")]
                plaudit_prometheus::record_credit_denied(
                    &record.channel.to_string(),
                    &reason.to_string(),
                );
                warn!(
                    dispatch_id = record.id.as_str(),
                    business_id = record.business_id.as_str(),
                    %reason,
                    current,
                    limit,
                    "credit denied, dispatch deferred"
                );
                return Ok(DispatchOutcome::Deferred { reason, until });
            }
        }

        let message = self.render(&record);
        let started = Instant::now();
        let result = match tokio::time::timeout(
            self.config.provider_timeout(),
            provider.send(&message),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SendError::retryable(format!(
                "provider timed out after {}s",
                self.config.provider_timeout_secs
            ))),
        };
        #[cfg(feature = "prometheus")]
        plaudit_prometheus::record_send_latency(
            &record.channel.to_string(),
            started.elapsed().as_secs_f64(),
        );
        debug!(
            dispatch_id = record.id.as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "provider call finished"
        );

        match result {
            Ok(receipt) => {
                let event = NewAuditEvent::new(
                    AuditEventType::Sent,
                    AuditSource::System,
                    format!("accepted by {}", provider.name()),
                )
                .with_metadata(json!({
                    "provider": provider.name(),
                    "provider_message_id": receipt.provider_message_id,
                }));
                dispatches::record_send_success(
                    &self.db,
                    &record.id,
                    &receipt.provider_message_id,
                    now,
                    event,
                )
                .await?;
                info!(
                    dispatch_id = record.id.as_str(),
                    provider_message_id = receipt.provider_message_id.as_str(),
                    "dispatch sent"
                );
                Ok(DispatchOutcome::Sent {
                    provider_message_id: receipt.provider_message_id,
                })
            }
            Err(err) => self.record_failure(&record, err, now).await,
        }
    }

    async fn record_failure(
        &self,
        record: &DispatchRecord,
        err: SendError,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, PlauditError> {
        if let Err(e) = self
            .usage
            .release(&record.business_id, record.channel, 1, now)
            .await
        {
            warn!(dispatch_id = record.id.as_str(), error = %e, "failed to release credit");
        }

        let attempt = record.retry_count.saturating_add(1);
        let next_attempt_at = (err.retryable && attempt < self.config.max_retries)
            .then(|| offset(now, self.config.retry_delay(attempt)));

        let event = match next_attempt_at {
            Some(next) => NewAuditEvent::new(
                AuditEventType::RetryScheduled,
                AuditSource::System,
                format!("send failed, retry {attempt} scheduled"),
            )
            .with_metadata(json!({
                "reason": err.reason,
                "retryable": err.retryable,
                "attempt": attempt,
                "next_attempt_at": next,
            })),
            None => NewAuditEvent::new(
                AuditEventType::SendFailed,
                AuditSource::System,
                "send failed permanently",
            )
            .with_metadata(json!({
                "reason": err.reason,
                "retryable": err.retryable,
                "attempt": attempt,
            })),
        };

        let failure = SendFailure {
            reason: err.reason.clone(),
            retry_count: attempt,
            next_attempt_at,
        };
        let outcome =
            dispatches::record_send_failure(&self.db, &record.id, &self.worker_id, failure, now, event)
                .await?;

        Ok(match outcome {
            FailureOutcome::Rescheduled {
                retry_count,
                next_attempt_at,
            } => {
                warn!(
                    dispatch_id = record.id.as_str(),
                    retry_count,
                    reason = err.reason.as_str(),
                    "send failed, rescheduled"
                );
                DispatchOutcome::Rescheduled {
                    retry_count,
                    next_attempt_at,
                }
            }
            FailureOutcome::Failed { retry_count, .. } => {
                error!(
                    dispatch_id = record.id.as_str(),
                    retry_count,
                    reason = err.reason.as_str(),
                    "send failed permanently"
                );
                DispatchOutcome::Failed {
                    retry_count,
                    reason: err.reason,
                }
            }
            FailureOutcome::ClaimLost => {
                warn!(dispatch_id = record.id.as_str(), "claim lost before failure was recorded");
                DispatchOutcome::ClaimLost
            }
        })
    }

    fn render(&self, record: &DispatchRecord) -> OutboundMessage {
        let tracking_url = self.gateway.tracking_url(&record.tracking_token);
        let mut metadata = std::collections::BTreeMap::new();
        metadata.insert("dispatch_id".to_string(), record.id.clone());
        metadata.insert("business_id".to_string(), record.business_id.clone());
        metadata.insert("tracking_url".to_string(), tracking_url.clone());

        OutboundMessage {
            dispatch_id: record.id.clone(),
            channel: record.channel,
            recipient: record.contact.clone(),
            subject: record.subject.clone(),
            body: record.body.replace(TRACKING_URL_PLACEHOLDER, &tracking_url),
            metadata,
        }
    }

    /// Claims one batch and dispatches it with bounded concurrency.
    pub async fn poll_once(&self, now: DateTime<Utc>) -> Result<PollSummary, PlauditError> {
        let records = self.claim_due(self.config.batch_size, now).await?;
        let mut summary = PollSummary {
            claimed: records.len(),
            ..PollSummary::default()
        };
        if records.is_empty() {
            return Ok(summary);
        }

        let results: Vec<(String, Channel, Result<DispatchOutcome, PlauditError>)> =
            futures::stream::iter(records)
                .map(|record| async move {
                    let id = record.id.clone();
                    let channel = record.channel;
                    (id, channel, self.dispatch(record, now).await)
                })
                .buffer_unordered(self.config.concurrency.max(1))
                .collect()
                .await;

        for (id, channel, result) in results {
            match result {
                Ok(outcome) => {
                    #[cfg(feature = "prometheus")]
                    plaudit_prometheus::record_dispatch_outcome(&channel.to_string(), outcome.label());
                    debug!(dispatch_id = id.as_str(), %channel, outcome = outcome.label(), "dispatch attempt finished");
                    summary.add(&outcome);
                }
                Err(e) => {
                    error!(dispatch_id = id.as_str(), %channel, error = %e, "dispatch attempt failed");
                    summary.errors += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Polls until `cancel` fires. Store errors are logged and the next tick retries.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), PlauditError> {
        if self.providers.is_empty() {
            warn!("dispatch worker has no providers configured; nothing will be claimed");
        }
        info!(
            worker_id = self.worker_id.as_str(),
            channels = ?self.channels(),
            "dispatch worker running"
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancel.cancelled() => {
                    info!("shutdown signal received, stopping dispatch worker");
                    break;
                }
            }

            match self.poll_once(Utc::now()).await {
                Ok(summary) if summary.claimed > 0 => {
                    info!(
                        claimed = summary.claimed,
                        sent = summary.sent,
                        opted_out = summary.opted_out,
                        deferred = summary.deferred,
                        rescheduled = summary.rescheduled,
                        failed = summary.failed,
                        errors = summary.errors,
                        "dispatch batch processed"
                    );
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "dispatch poll failed"),
            }
        }

        info!("dispatch worker stopped");
        Ok(())
    }
}

/// `now + d`, saturating at the latest representable instant.
fn offset(now: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(d)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
