// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Concrete channel providers.
//!
//! Providers never retry on their own. Each failure is classified once:
//! throttling, server errors and transport failures are retryable, every
//! other rejection is permanent.

pub mod sendgrid;
pub mod twilio;

use std::sync::Arc;
use std::time::Duration;

use plaudit_config::model::PlauditConfig;
use plaudit_core::{ChannelProvider, PlauditError, SendError};

pub use sendgrid::SendGridProvider;
pub use twilio::TwilioProvider;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds every provider whose credentials are configured.
pub fn build_providers(config: &PlauditConfig) -> Result<Vec<Arc<dyn ChannelProvider>>, PlauditError> {
    let mut providers: Vec<Arc<dyn ChannelProvider>> = Vec::new();
    if config.email.api_key.is_some() {
        providers.push(Arc::new(SendGridProvider::new(&config.email)?));
    }
    if config.sms.account_sid.is_some() {
        providers.push(Arc::new(TwilioProvider::new(&config.sms)?));
    }
    Ok(providers)
}

pub(crate) fn http_client() -> Result<reqwest::Client, PlauditError> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| PlauditError::Provider {
            message: format!("failed to build HTTP client: {e}"),
            source: Some(Box::new(e)),
        })
}

/// 429 and 5xx may succeed later.
pub(crate) fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

pub(crate) fn classify_status(provider: &str, status: reqwest::StatusCode, body: &str) -> SendError {
    let reason = format!("{provider} returned {status}: {}", truncate(body, 300));
    if is_transient_status(status) {
        SendError::retryable(reason)
    } else {
        SendError::permanent(reason)
    }
}

pub(crate) fn classify_transport(provider: &str, err: &reqwest::Error) -> SendError {
    let reason = format!("{provider} request failed: {err}");
    if err.is_builder() {
        SendError::permanent(reason)
    } else {
        SendError::retryable(reason)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn throttling_and_server_errors_are_retryable() {
        assert!(classify_status("x", StatusCode::TOO_MANY_REQUESTS, "").retryable);
        assert!(classify_status("x", StatusCode::BAD_GATEWAY, "").retryable);
        assert!(!classify_status("x", StatusCode::BAD_REQUEST, "bad to").retryable);
        assert!(!classify_status("x", StatusCode::UNAUTHORIZED, "").retryable);
    }

    #[test]
    fn reason_body_is_truncated_on_char_boundary() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("ok", 10), "ok");
    }

    #[test]
    fn no_credentials_builds_no_providers() {
        let providers = build_providers(&PlauditConfig::default()).unwrap();
        assert!(providers.is_empty());
    }
}
