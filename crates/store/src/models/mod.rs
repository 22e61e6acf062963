mod document;
mod share;
mod user;

pub use self::document::Document;
pub(crate) use self::document::DocumentRow;
pub use self::share::{AccessLimit, MAX_ACCESS_LIMIT, Share, SharedDocument};
pub(crate) use self::share::{ShareRow, SharedDocumentRow};
pub use self::user::User;
pub(crate) use self::user::UserRow;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use time::UtcDateTime;
use uuid::Uuid;

pub(crate) fn parse_id(raw: &str, field: &'static str) -> Result<Uuid> {
    Uuid::parse_str(raw).or_raise(|| ErrorKind::InvalidData(field))
}

pub(crate) fn parse_timestamp(raw: i64, field: &'static str) -> Result<UtcDateTime> {
    UtcDateTime::from_unix_timestamp(raw).or_raise(|| ErrorKind::InvalidData(field))
}
