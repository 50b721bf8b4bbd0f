// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite dispatch record store.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and the transactional operations
//! the dispatch worker, webhook reconciler and redirect handler share:
//! creation, atomic claim of due work, the forward-only status transition,
//! click accounting, the audit trail and the deferred-event parking lot.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::{Database, map_tr_err};
pub use models::*;
