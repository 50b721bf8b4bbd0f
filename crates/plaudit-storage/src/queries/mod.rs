// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. Async functions take `&Database`; the synchronous
//! helpers take `&Connection` so callers can compose them in one transaction.

pub mod audit;
pub mod clicks;
pub mod deferred;
pub mod dispatches;
pub mod tenants;
