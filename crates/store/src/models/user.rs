use crate::error::Error;
use crate::models::{parse_id, parse_timestamp};
use time::UtcDateTime;
use uuid::Uuid;

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// PHC-format password digest. Never the plaintext.
    pub password_hash: String,
    pub full_name: String,
    pub is_active: bool,
    pub created_at: UtcDateTime,
    pub updated_at: UtcDateTime,
}

impl User {
    /// A new, active user with both timestamps set to `now`.
    pub fn new(
        email: impl Into<String>,
        password_hash: impl Into<String>,
        full_name: impl Into<String>,
        now: UtcDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash: password_hash.into(),
            full_name: full_name.into(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct UserRow {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) password_hash: String,
    pub(crate) full_name: String,
    pub(crate) is_active: bool,
    pub(crate) created_at: i64,
    pub(crate) updated_at: i64,
}
impl From<&User> for UserRow {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            full_name: user.full_name.clone(),
            is_active: user.is_active,
            created_at: user.created_at.unix_timestamp(),
            updated_at: user.updated_at.unix_timestamp(),
        }
    }
}
impl TryFrom<UserRow> for User {
    type Error = Error;
    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_id(&row.id, "user id")?,
            email: row.email,
            password_hash: row.password_hash,
            full_name: row.full_name,
            is_active: row.is_active,
            created_at: parse_timestamp(row.created_at, "user creation date")?,
            updated_at: parse_timestamp(row.updated_at, "user update date")?,
        })
    }
}
