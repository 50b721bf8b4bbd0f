// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider payloads to canonical [`ProviderEvent`]s.

use chrono::{DateTime, Utc};
use plaudit_core::{ProviderEvent, ProviderEventKind};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Wire format of a webhook body, selected by the `{provider}` path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    /// SendGrid event webhook: JSON array.
    SendGrid,
    /// Twilio status callback: one form-encoded event.
    Twilio,
    /// JSON array of [`ProviderEvent`].
    Canonical,
}

impl PayloadFormat {
    pub fn from_provider(provider: &str) -> Option<Self> {
        match provider {
            "sendgrid" => Some(PayloadFormat::SendGrid),
            "twilio" => Some(PayloadFormat::Twilio),
            "canonical" => Some(PayloadFormat::Canonical),
            _ => None,
        }
    }
}

/// The body as a whole could not be read. Single bad entries are skipped instead.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed JSON batch: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed form body: {0}")]
    Form(#[from] serde_urlencoded::de::Error),
}

#[derive(Debug, Deserialize)]
struct SendGridEvent {
    sg_message_id: Option<String>,
    event: String,
    timestamp: Option<i64>,
    email: Option<String>,
    reason: Option<String>,
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TwilioStatusCallback {
    message_sid: String,
    message_status: String,
    to: Option<String>,
    error_code: Option<String>,
    error_message: Option<String>,
}

/// Parse a webhook body into canonical events.
///
/// Entries that cannot be mapped (no message id, wrong shape) are logged and
/// skipped so the rest of the batch still applies.
pub fn parse_events(format: PayloadFormat, body: &[u8]) -> Result<Vec<ProviderEvent>, PayloadError> {
    match format {
        PayloadFormat::SendGrid => parse_sendgrid(body),
        PayloadFormat::Twilio => parse_twilio(body).map(|e| vec![e]),
        PayloadFormat::Canonical => parse_canonical(body),
    }
}

fn parse_sendgrid(body: &[u8]) -> Result<Vec<ProviderEvent>, PayloadError> {
    let entries: Vec<serde_json::Value> = serde_json::from_slice(body)?;
    let mut events = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let raw: SendGridEvent = match serde_json::from_value(entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(index, error = %e, "skipping malformed sendgrid event");
                continue;
            }
        };
        let Some(message_id) = raw.sg_message_id.as_deref().map(sendgrid_message_id) else {
            warn!(index, event = raw.event.as_str(), "skipping sendgrid event without sg_message_id");
            continue;
        };
        events.push(ProviderEvent {
            provider_message_id: message_id.to_string(),
            kind: ProviderEventKind::from(raw.event),
            timestamp: raw
                .timestamp
                .and_then(|ts| DateTime::from_timestamp(ts, 0))
                .unwrap_or_else(Utc::now),
            contact: raw.email,
            raw_reason: raw.reason.or(raw.response),
        });
    }
    Ok(events)
}

/// `sg_message_id` is the `X-Message-Id` returned at send time plus a `.filter...` suffix.
pub fn sendgrid_message_id(sg_message_id: &str) -> &str {
    sg_message_id
        .split_once('.')
        .map_or(sg_message_id, |(prefix, _)| prefix)
}

fn parse_twilio(body: &[u8]) -> Result<ProviderEvent, PayloadError> {
    let raw: TwilioStatusCallback = serde_urlencoded::from_bytes(body)?;
    let kind = match raw.message_status.to_ascii_lowercase().as_str() {
        "accepted" | "queued" | "sending" | "sent" | "scheduled" => ProviderEventKind::Accepted,
        "delivered" => ProviderEventKind::Delivered,
        "read" => ProviderEventKind::Open,
        "undelivered" => ProviderEventKind::Bounce,
        "failed" => ProviderEventKind::Dropped,
        other => ProviderEventKind::Unknown(other.to_string()),
    };
    let raw_reason = match (raw.error_code, raw.error_message) {
        (Some(code), Some(message)) => Some(format!("{code}: {message}")),
        (Some(code), None) => Some(format!("twilio error {code}")),
        (None, message) => message,
    };
    Ok(ProviderEvent {
        provider_message_id: raw.message_sid,
        kind,
        timestamp: Utc::now(),
        contact: raw.to,
        raw_reason,
    })
}

fn parse_canonical(body: &[u8]) -> Result<Vec<ProviderEvent>, PayloadError> {
    let entries: Vec<serde_json::Value> = serde_json::from_slice(body)?;
    Ok(entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value(entry) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(index, error = %e, "skipping malformed canonical event");
                None
            }
        })
        .collect())
}
