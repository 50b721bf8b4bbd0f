// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Health reporting for the SQLite store.

use async_trait::async_trait;
use plaudit_core::{AdapterType, HealthStatus, PlauditError, PluginAdapter};

use crate::database::Database;

#[async_trait]
impl PluginAdapter for Database {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, PlauditError> {
        match self.ping().await {
            Ok(()) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    /// The connection closes when the last clone drops; [`Database::close`]
    /// flushes explicitly.
    async fn shutdown(&self) -> Result<(), PlauditError> {
        Ok(())
    }
}
