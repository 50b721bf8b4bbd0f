// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Plaudit delivery pipeline.

use thiserror::Error;

/// The primary error type used across Plaudit crates.
///
/// Expected outcomes of the pipeline (a suppressed recipient, a denied
/// credit reservation, a stale transition, an unknown tracking token) are
/// modelled as `Ok` values by the operations that produce them. This enum
/// is for failures.
#[derive(Debug, Error)]
pub enum PlauditError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Channel provider errors outside of a send attempt (client construction, health).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// An active suppression already covers this contact on this channel.
    #[error("contact already suppressed for business {business_id} on {channel}")]
    AlreadySuppressed { business_id: String, channel: String },

    /// A caller asked for a transition the lifecycle never admits.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PlauditError {
    /// Wraps any error as a storage failure.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            source: Box::new(err),
        }
    }
}

/// A structured failure returned by a channel provider for one send attempt.
///
/// `retryable` tells the dispatch worker whether another attempt may succeed
/// (timeouts, 5xx, throttling) or whether the message is rejected for good
/// (malformed recipient, authentication failure).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct SendError {
    pub retryable: bool,
    pub reason: String,
}

impl SendError {
    pub fn retryable(reason: impl Into<String>) -> Self {
        Self {
            retryable: true,
            reason: reason.into(),
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self {
            retryable: false,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_render() {
        let err = PlauditError::NotFound {
            entity: "dispatch",
            id: "d-1".into(),
        };
        assert_eq!(err.to_string(), "dispatch not found: d-1");

        let err = PlauditError::storage(std::io::Error::other("disk full"));
        assert_eq!(err.to_string(), "storage error: disk full");

        let err = PlauditError::AlreadySuppressed {
            business_id: "b-1".into(),
            channel: "email".into(),
        };
        assert!(err.to_string().contains("b-1"));
    }

    #[test]
    fn send_error_constructors() {
        assert!(SendError::retryable("503").retryable);
        assert!(!SendError::permanent("bad address").retryable);
        assert_eq!(SendError::permanent("bad address").to_string(), "bad address");
    }
}
