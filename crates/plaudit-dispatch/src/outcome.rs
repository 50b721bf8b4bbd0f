// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use chrono::{DateTime, Utc};
use plaudit_core::{DenialReason, DispatchStatus};

/// What one `dispatch` call did to its record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The provider accepted the message.
    Sent { provider_message_id: String },
    /// The recipient is suppressed; no credit was consumed and nothing was sent.
    OptedOut,
    /// Credit was denied; the record stays queued and is held back until `until`.
    Deferred {
        reason: DenialReason,
        until: DateTime<Utc>,
    },
    /// The send failed and will be retried.
    Rescheduled {
        retry_count: u32,
        next_attempt_at: DateTime<Utc>,
    },
    /// The send failed for good.
    Failed { retry_count: u32, reason: String },
    /// The claim expired before the attempt was recorded.
    ClaimLost,
    /// The record was no longer `queued` when the worker looked at it.
    Skipped { status: DispatchStatus },
}

impl DispatchOutcome {
    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::Sent { .. } => "sent",
            DispatchOutcome::OptedOut => "opted_out",
            DispatchOutcome::Deferred { .. } => "deferred",
            DispatchOutcome::Rescheduled { .. } => "rescheduled",
            DispatchOutcome::Failed { .. } => "failed",
            DispatchOutcome::ClaimLost => "claim_lost",
            DispatchOutcome::Skipped { .. } => "skipped",
        }
    }
}

/// Counts for one poll round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub claimed: usize,
    pub sent: usize,
    pub opted_out: usize,
    pub deferred: usize,
    pub rescheduled: usize,
    pub failed: usize,
    pub claim_lost: usize,
    pub skipped: usize,
    /// Records whose attempt hit a store error; their lease expires and they are retried.
    pub errors: usize,
}

impl PollSummary {
    pub(crate) fn add(&mut self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Sent { .. } => self.sent += 1,
            DispatchOutcome::OptedOut => self.opted_out += 1,
            DispatchOutcome::Deferred { .. } => self.deferred += 1,
            DispatchOutcome::Rescheduled { .. } => self.rescheduled += 1,
            DispatchOutcome::Failed { .. } => self.failed += 1,
            DispatchOutcome::ClaimLost => self.claim_lost += 1,
            DispatchOutcome::Skipped { .. } => self.skipped += 1,
        }
    }
}
