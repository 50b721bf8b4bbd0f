// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Plaudit integration tests.
//!
//! - [`ScriptedProvider`]: a channel provider that replays queued outcomes
//!   and records every message it was asked to send
//! - [`TestHarness`]: a temp SQLite store with a seeded business, customer
//!   and credit, plus ready-made workers and reconcilers

pub mod harness;
pub mod mock_provider;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_provider::{ScriptedOutcome, ScriptedProvider};
