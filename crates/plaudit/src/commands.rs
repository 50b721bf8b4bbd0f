// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot operator commands.

use chrono::Utc;
use plaudit_config::PlauditConfig;
use plaudit_core::PlauditError;
use plaudit_storage::queries::dispatches;
use plaudit_storage::{CancelOutcome, Database};
use tracing::info;

/// `plaudit migrate`. Opening the store applies embedded migrations.
pub async fn run_migrate(config: &PlauditConfig) -> Result<(), PlauditError> {
    let db = Database::open_from_config(&config.storage).await?;
    db.close().await?;
    info!(path = config.storage.database_path.as_str(), "migrations applied");
    println!("migrations applied to {}", config.storage.database_path);
    Ok(())
}

/// `plaudit cancel <id>`.
pub async fn run_cancel(config: &PlauditConfig, id: &str) -> Result<(), PlauditError> {
    let db = Database::open_from_config(&config.storage).await?;
    let outcome = dispatches::cancel_dispatch(&db, id, Utc::now()).await;
    db.close().await?;

    match outcome? {
        CancelOutcome::Cancelled => {
            println!("dispatch {id} cancelled");
            Ok(())
        }
        CancelOutcome::NotCancellable {
            status,
            is_active,
            claimed,
        } => {
            let why = if !is_active {
                "it is already inactive".to_string()
            } else if claimed {
                "a worker has already claimed it".to_string()
            } else {
                format!("it is {status}")
            };
            Err(PlauditError::InvalidTransition {
                from: status.to_string(),
                to: format!("cancelled ({why})"),
            })
        }
        CancelOutcome::NotFound => Err(PlauditError::NotFound {
            entity: "dispatch",
            id: id.to_string(),
        }),
    }
}
