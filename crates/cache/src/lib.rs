//! Key-value cache with per-entry TTL and pattern-based bulk deletion.
//!
//! The cache is never a source of truth. Whether it is usable at all is
//! decided once at startup: [`Cache::connect`] probes the backing store and
//! yields either [`Cache::Enabled`] or [`Cache::Disabled`] for the rest of the
//! process lifetime. A disabled cache behaves like one that is always cold.
//!
//! # Architecture
//! - [`CacheBackend`]: the raw string-valued store (Redis, or in-memory).
//! - [`Cache`]: the capability handed to callers, with JSON helpers.

pub mod backend;
mod cache;
pub mod error;
mod glob;

pub use crate::backend::{CacheBackend, MemoryBackend, RedisBackend, RedisOptions};
pub use crate::cache::Cache;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn CacheBackend + Send + Sync>;
