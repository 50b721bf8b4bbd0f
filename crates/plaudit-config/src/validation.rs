// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde cannot express: bind hosts, URL
//! schemes, retry bounds, and provider credentials that only make sense
//! together.

use crate::diagnostic::ConfigError;
use crate::model::PlauditConfig;

/// Validate a deserialized configuration.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &PlauditConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    let host = config.gateway.host.trim();
    if host.is_empty() {
        fail("gateway.host must not be empty".to_string());
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            fail(format!(
                "gateway.host `{host}` is not a valid IP address or hostname"
            ));
        }
    }

    if !is_http_url(&config.gateway.public_base_url) {
        fail(format!(
            "gateway.public_base_url `{}` must start with http:// or https://",
            config.gateway.public_base_url
        ));
    }

    if !is_http_url(&config.redirect.fallback_url) {
        fail(format!(
            "redirect.fallback_url `{}` must be an absolute http(s) URL",
            config.redirect.fallback_url
        ));
    }

    let dispatch = &config.dispatch;
    if dispatch.max_retries < 1 {
        fail("dispatch.max_retries must be at least 1".to_string());
    }
    if dispatch.batch_size < 1 {
        fail("dispatch.batch_size must be at least 1".to_string());
    }
    if dispatch.concurrency < 1 {
        fail("dispatch.concurrency must be at least 1".to_string());
    }
    if dispatch.provider_timeout_secs < 1 {
        fail("dispatch.provider_timeout_secs must be at least 1".to_string());
    }
    if dispatch.retry_base_delay_secs > dispatch.retry_max_delay_secs {
        fail(format!(
            "dispatch.retry_base_delay_secs ({}) must not exceed dispatch.retry_max_delay_secs ({})",
            dispatch.retry_base_delay_secs, dispatch.retry_max_delay_secs
        ));
    }
    if dispatch.claim_lease_secs <= dispatch.provider_timeout_secs {
        fail(format!(
            "dispatch.claim_lease_secs ({}) must be longer than dispatch.provider_timeout_secs ({})",
            dispatch.claim_lease_secs, dispatch.provider_timeout_secs
        ));
    }

    if config.webhook.redeliver_batch_size < 1 {
        fail("webhook.redeliver_batch_size must be at least 1".to_string());
    }

    if config.email.api_key.is_some() && config.email.from_address.is_none() {
        fail("email.from_address is required when email.api_key is set".to_string());
    }

    if config.sms.account_sid.is_some()
        && (config.sms.auth_token.is_none() || config.sms.from_number.is_none())
    {
        fail("sms.auth_token and sms.from_number are required when sms.account_sid is set".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_http_url(value: &str) -> bool {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    matches!(rest, Some(host) if !host.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(config: &PlauditConfig) -> Vec<String> {
        validate_config(config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&PlauditConfig::default()).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = PlauditConfig::default();
        config.storage.database_path = "".to_string();
        assert!(messages(&config).iter().any(|m| m.contains("database_path")));
    }

    #[test]
    fn relative_public_base_url_fails_validation() {
        let mut config = PlauditConfig::default();
        config.gateway.public_base_url = "go.example.com".to_string();
        assert!(messages(&config).iter().any(|m| m.contains("public_base_url")));
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = PlauditConfig::default();
        config.dispatch.max_retries = 0;
        config.dispatch.batch_size = 0;
        config.dispatch.retry_base_delay_secs = 10_000;
        config.redirect.fallback_url = "ftp://x".to_string();
        let found = messages(&config);
        assert_eq!(found.len(), 4, "{found:?}");
    }

    #[test]
    fn partial_provider_credentials_fail() {
        let mut config = PlauditConfig::default();
        config.email.api_key = Some("SG.key".into());
        config.sms.account_sid = Some("AC123".into());
        let found = messages(&config);
        assert!(found.iter().any(|m| m.contains("email.from_address")));
        assert!(found.iter().any(|m| m.contains("sms.auth_token")));
    }
}
