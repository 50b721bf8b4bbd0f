// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Plaudit configuration system.

use plaudit_config::diagnostic::ConfigError;
use plaudit_config::model::PlauditConfig;
use plaudit_config::{load_and_validate_str, load_config_from_str};

#[test]
fn full_toml_deserializes() {
    let toml = r#"
[service]
name = "plaudit-eu"
log_level = "debug"

[storage]
database_path = "/tmp/plaudit-test.db"
wal_mode = false

[gateway]
host = "0.0.0.0"
port = 8080
public_base_url = "https://go.example.com"

[dispatch]
max_retries = 5
batch_size = 10
concurrency = 2
retry_base_delay_secs = 10
retry_max_delay_secs = 600

[webhook]
batch_budget_ms = 250

[redirect]
fallback_url = "https://example.com/reviews"

[usage]
default_email_quota = 500

[email]
api_key = "SG.test"
from_address = "reviews@example.com"
from_name = "Example Reviews"

[sms]
account_sid = "AC123"
auth_token = "secret"
from_number = "+15550100000"

[prometheus]
enabled = true
"#;

    let config = load_and_validate_str(toml).expect("valid config");
    assert_eq!(config.service.name, "plaudit-eu");
    assert_eq!(config.service.log_level, "debug");
    assert_eq!(config.storage.database_path, "/tmp/plaudit-test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.gateway.port, 8080);
    assert_eq!(config.dispatch.max_retries, 5);
    assert_eq!(config.dispatch.concurrency, 2);
    assert_eq!(config.webhook.batch_budget_ms, 250);
    assert_eq!(config.usage.default_email_quota, Some(500));
    assert_eq!(config.usage.default_sms_quota, None);
    assert_eq!(config.email.from_name.as_deref(), Some("Example Reviews"));
    assert_eq!(config.sms.base_url, "https://api.twilio.com");
    assert!(config.prometheus.enabled);
}

#[test]
fn empty_toml_yields_defaults() {
    let config = load_config_from_str("").expect("defaults");
    let defaults = PlauditConfig::default();
    assert_eq!(config.gateway.port, 3080);
    assert_eq!(config.dispatch.max_retries, 3);
    assert_eq!(config.dispatch.poll_interval_ms, 1000);
    assert_eq!(config.webhook.redeliver_interval_secs, 60);
    assert_eq!(config.redirect.fallback_url, defaults.redirect.fallback_url);
    assert!(config.email.api_key.is_none());
    assert!(!config.prometheus.enabled);
}

#[test]
fn unknown_key_gets_suggestion_and_span() {
    let toml = r#"
[dispatch]
max_retires = 4
"#;

    let errors = load_and_validate_str(toml).expect_err("unknown key");
    let unknown = errors.iter().find_map(|e| match e {
        ConfigError::UnknownKey {
            key,
            suggestion,
            span,
            ..
        } => Some((key.clone(), suggestion.clone(), *span)),
        _ => None,
    });

    let (key, suggestion, span) = unknown.expect("an UnknownKey diagnostic");
    assert_eq!(key, "max_retires");
    assert_eq!(suggestion.as_deref(), Some("max_retries"));
    let span = span.expect("span into the inline source");
    assert_eq!(&toml[span.offset()..span.offset() + span.len()], "max_retires");
}

#[test]
fn unknown_section_is_rejected() {
    let errors = load_and_validate_str("[telegram]\nbot_token = \"x\"\n").expect_err("unknown section");
    assert!(!errors.is_empty());
}

#[test]
fn wrong_type_is_reported_with_key() {
    let errors = load_and_validate_str("[gateway]\nport = \"eighty\"\n").expect_err("bad type");
    assert!(errors.iter().any(|e| matches!(
        e,
        ConfigError::InvalidType { key, .. } if key.contains("port")
    )));
}

#[test]
fn semantic_errors_surface_as_validation() {
    let errors = load_and_validate_str("[dispatch]\nconcurrency = 0\n").expect_err("invalid");
    assert!(errors.iter().any(|e| matches!(
        e,
        ConfigError::Validation { message } if message.contains("concurrency")
    )));
}
