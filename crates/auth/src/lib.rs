//! Credentials for strongbox.
//!
//! - [`TokenService`]: session tokens issued at login, verified on every
//!   owner-scoped operation. [`JwtTokenService`] signs them as HS256 JWTs.
//! - [`PasswordHasher`]: one-way password digests for accounts and
//!   password-protected shares. [`Argon2Hasher`] produces PHC strings.
//! - [`generate_share_token`]: the opaque credential behind a public link.

pub mod error;
mod password;
mod share_token;
mod token;

pub use crate::password::{Argon2Hasher, PasswordHasher};
pub use crate::share_token::{SHARE_TOKEN_BYTES, generate_share_token};
pub use crate::token::{Claims, JwtTokenService, MIN_SECRET_LEN, TokenService};
