// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted channel provider for deterministic testing.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use plaudit_core::{
    AdapterType, Channel, ChannelProvider, HealthStatus, OutboundMessage, PlauditError,
    PluginAdapter, ProviderReceipt, SendError,
};

/// One scripted reaction to a send call.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    /// Accept with a generated message id.
    Accept,
    /// Accept with this message id.
    AcceptAs(String),
    Fail(SendError),
    /// Sleep before accepting; longer than the worker timeout simulates a hang.
    Stall(Duration),
}

/// A channel provider that pops outcomes from a FIFO queue.
///
/// When the queue is empty every send is accepted.
pub struct ScriptedProvider {
    channel: Channel,
    script: Arc<Mutex<VecDeque<ScriptedOutcome>>>,
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    next_id: AtomicU64,
}

impl ScriptedProvider {
    pub fn new(channel: Channel) -> Self {
        Self::with_script(channel, Vec::new())
    }

    pub fn with_script(channel: Channel, script: Vec<ScriptedOutcome>) -> Self {
        Self {
            channel,
            script: Arc::new(Mutex::new(VecDeque::from(script))),
            sent: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn push(&self, outcome: ScriptedOutcome) {
        self.script.lock().await.push_back(outcome);
    }

    /// Every message handed to `send`, including failed attempts.
    pub async fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn send_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    fn generated_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{}-msg-{n}", self.channel)
    }
}

#[async_trait]
impl PluginAdapter for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, PlauditError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PlauditError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelProvider for ScriptedProvider {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, message: &OutboundMessage) -> Result<ProviderReceipt, SendError> {
        self.sent.lock().await.push(message.clone());
        let outcome = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or(ScriptedOutcome::Accept);

        match outcome {
            ScriptedOutcome::Accept => Ok(ProviderReceipt {
                provider_message_id: self.generated_id(),
            }),
            ScriptedOutcome::AcceptAs(id) => Ok(ProviderReceipt {
                provider_message_id: id,
            }),
            ScriptedOutcome::Fail(err) => Err(err),
            ScriptedOutcome::Stall(delay) => {
                tokio::time::sleep(delay).await;
                Ok(ProviderReceipt {
                    provider_message_id: self.generated_id(),
                })
            }
        }
    }
}
