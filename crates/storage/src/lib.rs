//! Blob storage for uploaded documents.
//!
//! Document bytes never touch the relational store: they live in a blob
//! backend addressed by `(bucket, key)`, and the store only remembers the
//! key. Exactly one backend is chosen at startup and shared for the process
//! lifetime through a [`BackendHandle`].

pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::{BlobReader, BlobStore};
pub use crate::models::BlobHandle;
pub use crate::path::{validate_bucket, validate_key};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn BlobStore + Send + Sync>;
