// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the store, the worker, the reconciler and the gateway.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Delivery medium for a dispatch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
}

/// Lifecycle status of a dispatch. See [`crate::lifecycle`] for the rules.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Queued,
    Sent,
    Delivered,
    Clicked,
    Completed,
    Failed,
    Bounced,
    OptedOut,
    FollowupSent,
}

/// One outbound message to one customer on one channel, and its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub id: String,
    pub tracking_token: String,
    pub business_id: String,
    pub customer_id: String,
    pub channel: Channel,
    /// Normalized recipient address or number captured at creation.
    pub contact: String,
    pub subject: Option<String>,
    /// Rendered body, possibly containing the `{{tracking_url}}` placeholder.
    pub body: String,
    pub review_url: Option<String>,
    pub status: DispatchStatus,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub followup_sent_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub provider_message_id: Option<String>,
    pub claimed_by: Option<String>,
    pub locked_until: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a dispatch. The store assigns id, token and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDispatch {
    pub business_id: String,
    pub customer_id: String,
    pub channel: Channel,
    pub contact: String,
    pub subject: Option<String>,
    pub body: String,
    pub review_url: Option<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// Kind of fact recorded in the audit trail.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Queued,
    Suppressed,
    DeferredNoCredit,
    Sent,
    RetryScheduled,
    SendFailed,
    ProviderProcessed,
    Delivered,
    Opened,
    Clicked,
    RepeatClick,
    Bounced,
    Dropped,
    SpamComplaint,
    Unsubscribed,
    Completed,
    FollowupSent,
    Cancelled,
}

/// Which component produced an audit event or suppression.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditSource {
    System,
    Webhook,
    Redirect,
    User,
}

/// An immutable fact about a dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: i64,
    pub dispatch_id: String,
    pub event_type: AuditEventType,
    pub source: AuditSource,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// An audit event before it is appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEvent {
    pub event_type: AuditEventType,
    pub source: AuditSource,
    pub description: String,
    pub metadata: serde_json::Value,
}

impl NewAuditEvent {
    pub fn new(event_type: AuditEventType, source: AuditSource, description: impl Into<String>) -> Self {
        Self {
            event_type,
            source,
            description: description.into(),
            metadata: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Why a contact was suppressed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    UserRequest,
    Bounce,
    SpamComplaint,
    Unsubscribe,
    Manual,
}

/// A block on contacting one `(business, contact, channel)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionEntry {
    pub id: i64,
    pub business_id: String,
    pub contact: String,
    pub channel: Channel,
    pub reason: SuppressionReason,
    /// Free-form origin, e.g. `webhook:sendgrid` or `user`.
    pub source: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Per-business, per-channel usage counter for the current period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounter {
    pub business_id: String,
    pub channel: Channel,
    pub used: u32,
    pub quota: u32,
}

/// Why a reservation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// The counter exists but `used + count` would exceed the quota.
    QuotaExhausted,
    /// No counter exists for this business and channel and no default quota is configured.
    NoAllowance,
}

/// Result of an atomic credit reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReserveOutcome {
    Granted {
        used: u32,
        quota: u32,
    },
    Denied {
        reason: DenialReason,
        current: u32,
        limit: u32,
    },
}

impl ReserveOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, ReserveOutcome::Granted { .. })
    }
}

/// Canonical provider event kinds. Anything else is kept as [`ProviderEventKind::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProviderEventKind {
    Processed,
    Accepted,
    Delivered,
    Open,
    Click,
    Bounce,
    Dropped,
    SpamComplaint,
    Unsubscribe,
    Unknown(String),
}

impl ProviderEventKind {
    pub fn as_str(&self) -> &str {
        match self {
            ProviderEventKind::Processed => "processed",
            ProviderEventKind::Accepted => "accepted",
            ProviderEventKind::Delivered => "delivered",
            ProviderEventKind::Open => "open",
            ProviderEventKind::Click => "click",
            ProviderEventKind::Bounce => "bounce",
            ProviderEventKind::Dropped => "dropped",
            ProviderEventKind::SpamComplaint => "spam_complaint",
            ProviderEventKind::Unsubscribe => "unsubscribe",
            ProviderEventKind::Unknown(other) => other,
        }
    }
}

impl From<String> for ProviderEventKind {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "processed" => ProviderEventKind::Processed,
            "accepted" | "queued" => ProviderEventKind::Accepted,
            "delivered" => ProviderEventKind::Delivered,
            "open" | "opened" => ProviderEventKind::Open,
            "click" | "clicked" => ProviderEventKind::Click,
            "bounce" | "bounced" => ProviderEventKind::Bounce,
            "dropped" => ProviderEventKind::Dropped,
            "spam_complaint" | "spamreport" => ProviderEventKind::SpamComplaint,
            "unsubscribe" | "group_unsubscribe" => ProviderEventKind::Unsubscribe,
            _ => ProviderEventKind::Unknown(value),
        }
    }
}

impl From<ProviderEventKind> for String {
    fn from(value: ProviderEventKind) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for ProviderEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A delivery-status callback mapped from a provider-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub provider_message_id: String,
    pub kind: ProviderEventKind,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub raw_reason: Option<String>,
}

/// A rendered message handed to a channel provider.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub dispatch_id: String,
    pub channel: Channel,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    pub metadata: BTreeMap<String, String>,
}

/// Successful provider acceptance of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReceipt {
    pub provider_message_id: String,
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a [`crate::PluginAdapter`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Provider,
    Storage,
    Observability,
}

/// Normalizes a contact so that suppression lookups match regardless of formatting.
///
/// Email addresses are trimmed and lower-cased. Phone numbers lose spaces,
/// dashes, dots and parentheses; a leading `+` is kept.
pub fn normalize_contact(channel: Channel, raw: &str) -> String {
    let trimmed = raw.trim();
    match channel {
        Channel::Email => trimmed.to_lowercase(),
        Channel::Sms => trimmed
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
            .collect(),
    }
}

/// Generates an unguessable, URL-safe tracking token (192 bits of OS randomness).
pub fn generate_tracking_token() -> String {
    let mut bytes = [0u8; 24];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
