// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-business, per-channel send credit.
//!
//! Reservation is a single conditional increment in the store, so concurrent
//! workers never push `used` past `quota`. A warning is logged once a counter
//! passes 80% of its quota.

pub mod limiter;

pub use limiter::UsageLimiter;
