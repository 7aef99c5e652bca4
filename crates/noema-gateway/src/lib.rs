// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for the Noema pipeline: thought ingest and SSE progress.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{start_server, ConnectionGauge, GatewayState};
