// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Public HTTP surface of the delivery pipeline.
//!
//! - `POST /webhooks/{provider}`: provider event batches, acknowledged
//!   immediately and reconciled in the background
//! - `GET /r/{token}`: tracking redirect with click accounting
//! - `GET /health` and `GET /metrics`

pub mod handlers;
pub mod pages;
pub mod server;

pub use server::{GatewayState, HealthState, build_router, start_server};
