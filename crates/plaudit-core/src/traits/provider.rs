// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel provider adapter: the send-only interface to an email or SMS vendor.

use async_trait::async_trait;

use crate::error::SendError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Channel, OutboundMessage, ProviderReceipt};

/// Sends rendered messages on one channel.
///
/// Implementations must not retry internally; the dispatch worker owns the
/// retry policy and uses [`SendError::retryable`] to decide.
#[async_trait]
pub trait ChannelProvider: PluginAdapter {
    /// The channel this provider delivers on.
    fn channel(&self) -> Channel;

    /// Hands one message to the vendor and returns its message identifier.
    async fn send(&self, message: &OutboundMessage) -> Result<ProviderReceipt, SendError>;
}
