// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook event reconciliation.
//!
//! Provider callbacks arrive at least once, in any order. Every matched
//! event is appended to the audit trail; the status change it implies goes
//! through the shared forward-only transition, so replays and late events
//! never move a record backwards. Events that miss the batch budget, or hit
//! a store error, are parked and re-ingested by [`WebhookReconciler::run_redelivery`].

pub mod mapping;
pub mod reconciler;

pub use mapping::{PayloadError, PayloadFormat, parse_events};
pub use reconciler::{IngestEffect, IngestResult, RedeliverySummary, WebhookReconciler};
