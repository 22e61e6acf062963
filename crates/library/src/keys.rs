//! Cache key formats and lifetimes.

use std::time::Duration;
use uuid::Uuid;

/// Matches every share token entry.
pub const ALL_SHARES: &str = "share:*";

pub fn user_by_id(id: Uuid) -> String {
    format!("user:id:{id}")
}

pub fn user_by_email(email: &str) -> String {
    format!("user:email:{email}")
}

pub fn document(id: Uuid) -> String {
    format!("document:id:{id}")
}

pub fn share(token: &str) -> String {
    format!("share:token:{token}")
}

pub fn owner_documents(owner_id: Uuid) -> String {
    format!("documents:user:{owner_id}")
}

/// Lifetime of each kind of cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTtls {
    pub user_by_id: Duration,
    pub user_by_email: Duration,
    pub document: Duration,
    pub share: Duration,
    /// Also bounds the age of a list snapshot's embedded timestamp.
    pub document_list: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        const MINUTE: u64 = 60;
        Self {
            user_by_id: Duration::from_secs(30 * MINUTE),
            user_by_email: Duration::from_secs(15 * MINUTE),
            document: Duration::from_secs(60 * MINUTE),
            share: Duration::from_secs(10 * MINUTE),
            document_list: Duration::from_secs(5 * MINUTE),
        }
    }
}
