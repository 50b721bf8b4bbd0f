// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Without an installed recorder every call here is a no-op.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all Plaudit metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "plaudit_dispatch_outcomes_total",
        "Dispatch attempts by channel and outcome"
    );
    describe_counter!(
        "plaudit_webhook_events_total",
        "Provider events ingested by provider and kind"
    );
    describe_counter!("plaudit_clicks_total", "Tracking link visits by result");
    describe_counter!(
        "plaudit_credit_denials_total",
        "Credit reservations refused by channel and reason"
    );
    describe_histogram!(
        "plaudit_send_latency_seconds",
        "Provider send call latency in seconds"
    );
    describe_gauge!(
        "plaudit_deferred_events",
        "Provider events waiting for re-ingestion"
    );
}

/// `outcome` is one of `sent`, `opted_out`, `deferred`, `rescheduled`, `failed`, `claim_lost`.
pub fn record_dispatch_outcome(channel: &str, outcome: &'static str) {
    metrics::counter!(
        "plaudit_dispatch_outcomes_total",
        "channel" => channel.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_webhook_event(provider: &str, kind: &str) {
    metrics::counter!(
        "plaudit_webhook_events_total",
        "provider" => provider.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// `result` is one of `first`, `repeat`, `not_found`, `inactive`, `error`.
pub fn record_click(result: &'static str) {
    metrics::counter!("plaudit_clicks_total", "result" => result).increment(1);
}

pub fn record_credit_denied(channel: &str, reason: &str) {
    metrics::counter!(
        "plaudit_credit_denials_total",
        "channel" => channel.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

pub fn record_send_latency(channel: &str, seconds: f64) {
    metrics::histogram!("plaudit_send_latency_seconds", "channel" => channel.to_string())
        .record(seconds);
}

pub fn set_deferred_backlog(count: f64) {
    metrics::gauge!("plaudit_deferred_events").set(count);
}
