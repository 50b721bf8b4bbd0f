// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Plaudit configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PlauditConfig {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP surface: webhook ingress and tracking redirects.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Dispatch queue worker.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Webhook reconciliation budgets and the deferred re-poll.
    #[serde(default)]
    pub webhook: WebhookConfig,

    #[serde(default)]
    pub redirect: RedirectConfig,

    #[serde(default)]
    pub usage: UsageConfig,

    /// SendGrid email provider.
    #[serde(default)]
    pub email: EmailConfig,

    /// Twilio SMS provider.
    #[serde(default)]
    pub sms: SmsConfig,

    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

/// Service identity and logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "plaudit".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL mode for concurrent readers.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|d| d.join("plaudit").join("plaudit.db"))
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "plaudit.db".to_string())
}

fn default_true() -> bool {
    true
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable base URL used to build tracking links.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
            public_base_url: default_public_base_url(),
        }
    }
}

impl GatewayConfig {
    /// `{public_base_url}/r/{token}` with no doubled slash.
    pub fn tracking_url(&self, token: &str) -> String {
        format!("{}/r/{token}", self.public_base_url.trim_end_matches('/'))
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3080
}

fn default_public_base_url() -> String {
    "http://127.0.0.1:3080".to_string()
}

/// Dispatch queue worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum records claimed per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum concurrent send attempts within one batch.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_delay_secs")]
    pub retry_base_delay_secs: u64,

    #[serde(default = "default_retry_max_delay_secs")]
    pub retry_max_delay_secs: u64,

    /// Upper bound on one provider send call.
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    /// How long a claim stays exclusive before another worker may take it.
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: u64,

    /// How long a credit-denied record is held back before it is claimable again.
    #[serde(default = "default_credit_deferral_secs")]
    pub credit_deferral_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            retry_base_delay_secs: default_retry_base_delay_secs(),
            retry_max_delay_secs: default_retry_max_delay_secs(),
            provider_timeout_secs: default_provider_timeout_secs(),
            claim_lease_secs: default_claim_lease_secs(),
            credit_deferral_secs: default_credit_deferral_secs(),
        }
    }
}

impl DispatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn claim_lease(&self) -> Duration {
        Duration::from_secs(self.claim_lease_secs)
    }

    pub fn credit_deferral(&self) -> Duration {
        Duration::from_secs(self.credit_deferral_secs)
    }

    /// Backoff before the next attempt: `min(base * 2^retry_count, cap)`.
    pub fn retry_delay(&self, retry_count: u32) -> Duration {
        let factor = 2u64.checked_pow(retry_count).unwrap_or(u64::MAX);
        let secs = self
            .retry_base_delay_secs
            .saturating_mul(factor)
            .min(self.retry_max_delay_secs);
        Duration::from_secs(secs)
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_batch_size() -> usize {
    50
}

fn default_concurrency() -> usize {
    8
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_secs() -> u64 {
    30
}

fn default_retry_max_delay_secs() -> u64 {
    3600
}

fn default_provider_timeout_secs() -> u64 {
    15
}

fn default_claim_lease_secs() -> u64 {
    300
}

fn default_credit_deferral_secs() -> u64 {
    900
}

/// Webhook reconciliation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Wall-clock budget for one ingested batch; leftovers are deferred.
    #[serde(default = "default_batch_budget_ms")]
    pub batch_budget_ms: u64,

    #[serde(default = "default_redeliver_interval_secs")]
    pub redeliver_interval_secs: u64,

    /// Deferred events taken per re-poll round.
    #[serde(default = "default_redeliver_batch_size")]
    pub redeliver_batch_size: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            batch_budget_ms: default_batch_budget_ms(),
            redeliver_interval_secs: default_redeliver_interval_secs(),
            redeliver_batch_size: default_redeliver_batch_size(),
        }
    }
}

impl WebhookConfig {
    pub fn batch_budget(&self) -> Duration {
        Duration::from_millis(self.batch_budget_ms)
    }

    pub fn redeliver_interval(&self) -> Duration {
        Duration::from_secs(self.redeliver_interval_secs)
    }
}

fn default_batch_budget_ms() -> u64 {
    5000
}

fn default_redeliver_interval_secs() -> u64 {
    60
}

fn default_redeliver_batch_size() -> usize {
    100
}

/// Tracking redirect configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RedirectConfig {
    /// Last-resort destination when neither the business nor the record has a link.
    #[serde(default = "default_fallback_url")]
    pub fallback_url: String,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            fallback_url: default_fallback_url(),
        }
    }
}

fn default_fallback_url() -> String {
    "https://www.google.com/search?q=reviews".to_string()
}

/// Usage limiter configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UsageConfig {
    /// Quota seeded for a business with no email counter. `None` denies instead.
    #[serde(default)]
    pub default_email_quota: Option<u32>,

    #[serde(default)]
    pub default_sms_quota: Option<u32>,
}

/// SendGrid configuration. The provider is enabled when `api_key` is set.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmailConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub from_address: Option<String>,

    #[serde(default)]
    pub from_name: Option<String>,

    #[serde(default = "default_sendgrid_base_url")]
    pub base_url: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            from_address: None,
            from_name: None,
            base_url: default_sendgrid_base_url(),
        }
    }
}

fn default_sendgrid_base_url() -> String {
    "https://api.sendgrid.com".to_string()
}

/// Twilio configuration. The provider is enabled when `account_sid` is set.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SmsConfig {
    #[serde(default)]
    pub account_sid: Option<String>,

    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default)]
    pub from_number: Option<String>,

    #[serde(default = "default_twilio_base_url")]
    pub base_url: String,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            from_number: None,
            base_url: default_twilio_base_url(),
        }
    }
}

fn default_twilio_base_url() -> String {
    "https://api.twilio.com".to_string()
}

/// Prometheus metrics export.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    #[serde(default)]
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_doubles_and_caps() {
        let config = DispatchConfig::default();
        assert_eq!(config.retry_delay(1), Duration::from_secs(60));
        assert_eq!(config.retry_delay(2), Duration::from_secs(120));
        assert_eq!(config.retry_delay(10), Duration::from_secs(3600));
        assert_eq!(config.retry_delay(200), Duration::from_secs(3600));
    }

    #[test]
    fn tracking_url_trims_trailing_slash() {
        let gateway = GatewayConfig {
            public_base_url: "https://go.example.com/".into(),
            ..GatewayConfig::default()
        };
        assert_eq!(gateway.tracking_url("abc"), "https://go.example.com/r/abc");
    }
}
