//! SQLite system of record for users, documents and share links.
//!
//! This is the source of truth. Everything else (the key-value cache, cached
//! share lookups, list snapshots) is derived from what this crate returns.
//!
//! # Architecture
//! - **Users** own **Documents**. Deleting a user cascades to their documents.
//! - **Shares** grant public access to one document through an unguessable
//!   token. Deleting a document cascades to its shares.
//!
//! The share access counter is the only field mutated after creation, and only
//! through [`Repository::consume_share`], a single conditional `UPDATE`.

mod db;
pub mod error;
mod models;
mod repo;

pub use crate::db::Database;
pub use crate::models::{AccessLimit, Document, MAX_ACCESS_LIMIT, Share, SharedDocument, User};
pub use crate::repo::Repository;
