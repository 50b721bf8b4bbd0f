// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch queue worker.
//!
//! The [`DispatchWorker`] turns due `queued` records into `sent` records or
//! terminal failures:
//! - Claims due records in the store under a time-bounded lease
//! - Routes suppressed recipients to `opted_out` without sending
//! - Reserves one unit of credit, deferring the record when none is left
//! - Calls the channel provider under a timeout
//! - Records success, or reschedules with backoff until retries run out
//!
//! Any number of workers may run against the same store; the claim is the
//! only exclusion between them.

pub mod outcome;
pub mod worker;

pub use outcome::{DispatchOutcome, PollSummary};
pub use worker::{DispatchWorker, TRACKING_URL_PLACEHOLDER};
