// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `plaudit serve` and `plaudit worker`.
//!
//! Wires the store, providers, worker, reconciler and gateway together and
//! runs them until a shutdown signal cancels the shared token.

use std::sync::Arc;

use plaudit_config::PlauditConfig;
use plaudit_core::PlauditError;
use plaudit_dispatch::DispatchWorker;
use plaudit_gateway::{GatewayState, HealthState};
use plaudit_storage::Database;
use plaudit_suppression::SuppressionRegistry;
use plaudit_usage::UsageLimiter;
use plaudit_webhook::WebhookReconciler;
use tokio::task::JoinSet;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::shutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeMode {
    /// Gateway, worker and webhook re-poll.
    Full,
    /// Dispatch worker only.
    WorkerOnly,
}

type Render = Arc<dyn Fn() -> String + Send + Sync>;

pub async fn run_serve(config: PlauditConfig, mode: ServeMode) -> Result<(), PlauditError> {
    info!(service = config.service.name.as_str(), ?mode, "starting plaudit");

    let db = Database::open_from_config(&config.storage).await?;
    info!(path = config.storage.database_path.as_str(), "store opened");

    let prometheus_render = init_metrics(&config);

    let providers = plaudit_providers::build_providers(&config)?;
    if providers.is_empty() {
        warn!("no channel providers configured, queued dispatches will not be sent");
    }

    let mut worker = DispatchWorker::new(
        db.clone(),
        SuppressionRegistry::new(db.clone()),
        UsageLimiter::new(db.clone(), &config.usage),
        &config,
    );
    for provider in providers {
        info!(provider = provider.name(), channel = %provider.channel(), "channel provider registered");
        worker = worker.with_provider(provider);
    }

    let cancel = shutdown::install_signal_handler();
    let mut tasks: JoinSet<(&'static str, Result<(), PlauditError>)> = JoinSet::new();

    if config.dispatch.enabled {
        let task_cancel = cancel.clone();
        tasks.spawn(async move { ("dispatch worker", worker.run(task_cancel).await) });
    } else {
        debug!("dispatch worker disabled by configuration");
    }

    if mode == ServeMode::Full {
        let reconciler = WebhookReconciler::new(db.clone(), &config.webhook);

        let redelivery = reconciler.clone();
        let task_cancel = cancel.clone();
        tasks.spawn(async move { ("webhook redelivery", redelivery.run_redelivery(task_cancel).await) });

        if config.gateway.enabled {
            let state = GatewayState {
                db: db.clone(),
                reconciler,
                redirect: config.redirect.clone(),
                health: HealthState::new(prometheus_render),
                ingest_tasks: TaskTracker::new(),
            };
            let gateway = config.gateway.clone();
            let task_cancel = cancel.clone();
            tasks.spawn(async move {
                ("gateway", plaudit_gateway::start_server(&gateway, state, task_cancel).await)
            });
        } else {
            debug!("gateway disabled by configuration");
        }
    }

    if tasks.is_empty() {
        warn!("nothing to run: worker and gateway are both disabled");
    }

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((task, Ok(()))) => debug!(task, "task finished"),
            Ok((task, Err(e))) => {
                error!(task, error = %e, "task failed, shutting down");
                cancel.cancel();
                first_error.get_or_insert(e);
            }
            Err(e) => {
                error!(error = %e, "task panicked, shutting down");
                cancel.cancel();
                first_error.get_or_insert(PlauditError::Internal(format!("task panicked: {e}")));
            }
        }
    }

    if let Err(e) = db.close().await {
        warn!(error = %e, "failed to close store cleanly");
    }
    info!("plaudit shutdown complete");

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(feature = "prometheus")]
fn init_metrics(config: &PlauditConfig) -> Option<Render> {
    if !config.prometheus.enabled {
        debug!("prometheus metrics disabled by configuration");
        return None;
    }
    match plaudit_prometheus::PrometheusAdapter::new() {
        Ok(adapter) => {
            info!("prometheus metrics enabled");
            let handle = adapter.handle().clone();
            Some(Arc::new(move || handle.render()) as Render)
        }
        Err(e) => {
            warn!(error = %e, "prometheus initialization failed, continuing without metrics");
            None
        }
    }
}

#[cfg(not(feature = "prometheus"))]
fn init_metrics(config: &PlauditConfig) -> Option<Render> {
    if config.prometheus.enabled {
        warn!("prometheus enabled in configuration but not compiled in");
    }
    None
}
