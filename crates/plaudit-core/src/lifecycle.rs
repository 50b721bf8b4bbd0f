// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Forward-only lifecycle rules for dispatch records.
//!
//! The delivery-progress chain is `Queued < Sent < Delivered < Clicked < Completed`.
//! `Failed`, `Bounced` and `OptedOut` branch off from `Queued`, `Sent` or
//! `Delivered`; `FollowupSent` branches off from `Clicked` or `Completed`.
//! A transition is admitted only when it moves strictly forward; everything
//! else is a no-op on the record (callers still audit the fact).
//!
//! Every writer (worker, reconciler, redirect) consults [`DispatchStatus::admits`]
//! through the store's compare-and-set transition, so the rules live here once.

use serde::{Deserialize, Serialize};

use crate::types::DispatchStatus;

/// A milestone timestamp column on the dispatch record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Milestone {
    Sent,
    Delivered,
    Clicked,
    Completed,
    FollowupSent,
}

impl Milestone {
    pub fn column(self) -> &'static str {
        match self {
            Milestone::Sent => "sent_at",
            Milestone::Delivered => "delivered_at",
            Milestone::Clicked => "clicked_at",
            Milestone::Completed => "completed_at",
            Milestone::FollowupSent => "followup_sent_at",
        }
    }
}

/// Result of a compare-and-set transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionOutcome {
    /// The record moved from `from` to `to`.
    Applied {
        from: DispatchStatus,
        to: DispatchStatus,
    },
    /// The target did not move the record forward; it stays at `current`.
    Unchanged { current: DispatchStatus },
}

impl TransitionOutcome {
    pub fn applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }
}

impl DispatchStatus {
    /// Position on the delivery-progress chain, `None` for branch states.
    pub fn progress_rank(self) -> Option<u8> {
        match self {
            DispatchStatus::Queued => Some(0),
            DispatchStatus::Sent => Some(1),
            DispatchStatus::Delivered => Some(2),
            DispatchStatus::Clicked => Some(3),
            DispatchStatus::Completed => Some(4),
            DispatchStatus::Failed
            | DispatchStatus::Bounced
            | DispatchStatus::OptedOut
            | DispatchStatus::FollowupSent => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DispatchStatus::Failed
                | DispatchStatus::Bounced
                | DispatchStatus::OptedOut
                | DispatchStatus::Completed
                | DispatchStatus::FollowupSent
        )
    }

    /// Whether a record currently in `self` may move to `target`.
    pub fn admits(self, target: DispatchStatus) -> bool {
        use DispatchStatus::*;

        match target {
            Queued => false,
            Failed | Bounced | OptedOut => matches!(self, Queued | Sent | Delivered),
            FollowupSent => matches!(self, Clicked | Completed),
            Sent | Delivered | Clicked | Completed => {
                match (self.progress_rank(), target.progress_rank()) {
                    (Some(current), Some(next)) => self != Completed && next > current,
                    _ => false,
                }
            }
        }
    }

    /// The timestamp column set when a record first reaches this status.
    pub fn milestone(self) -> Option<Milestone> {
        match self {
            DispatchStatus::Sent => Some(Milestone::Sent),
            DispatchStatus::Delivered => Some(Milestone::Delivered),
            DispatchStatus::Clicked => Some(Milestone::Clicked),
            DispatchStatus::Completed => Some(Milestone::Completed),
            DispatchStatus::FollowupSent => Some(Milestone::FollowupSent),
            _ => None,
        }
    }

    /// Whether reaching this status implies the message left the provider,
    /// so `sent_at` must be backfilled if it is still unset.
    pub fn implies_sent(self) -> bool {
        matches!(
            self,
            DispatchStatus::Sent
                | DispatchStatus::Delivered
                | DispatchStatus::Clicked
                | DispatchStatus::Completed
                | DispatchStatus::FollowupSent
        )
    }
}
