// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Plaudit delivery pipeline.
//!
//! This crate provides the domain types, the forward-only lifecycle rules,
//! error types, and the adapter traits shared by the rest of the workspace.

pub mod error;
pub mod lifecycle;
pub mod traits;
pub mod types;

pub use error::{PlauditError, SendError};
pub use lifecycle::{Milestone, TransitionOutcome};
pub use types::{
    AdapterType, AuditEvent, AuditEventType, AuditSource, Channel, DenialReason, DispatchRecord,
    DispatchStatus, HealthStatus, NewAuditEvent, NewDispatch, OutboundMessage, ProviderEvent,
    ProviderEventKind, ProviderReceipt, ReserveOutcome, SuppressionEntry, SuppressionReason,
    UsageCounter, generate_tracking_token, normalize_contact,
};

pub use traits::{ChannelProvider, PluginAdapter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_type_round_trips_through_strings() {
        use std::str::FromStr;

        for variant in [
            AdapterType::Provider,
            AdapterType::Storage,
            AdapterType::Observability,
        ] {
            let s = variant.to_string();
            let parsed = AdapterType::from_str(&s).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn health_status_variants() {
        let healthy = HealthStatus::Healthy;
        assert_ne!(HealthStatus::Degraded("slow".into()), healthy);
        assert_ne!(HealthStatus::Unhealthy("down".into()), healthy);
    }

    #[test]
    fn provider_trait_is_object_safe() {
        fn _assert_object(_p: &dyn ChannelProvider) {}
        fn _assert_plugin<T: PluginAdapter>() {}
    }
}
