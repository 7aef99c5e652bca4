// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Progress fan-out bus implementations.
//!
//! [`RedisBus`] is the production transport: per-user pub/sub channels that
//! multiple gateway instances can subscribe to. [`MemoryBus`] implements
//! the same [`noema_core::ProgressBus`] trait in process for tests and
//! single-node deployments.

pub mod memory;
pub mod redis;

pub use memory::MemoryBus;
pub use redis::{channel_name, RedisBus};
