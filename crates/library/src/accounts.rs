//! Registration, login and session tokens.

use crate::error::{ErrorKind, Result};
use crate::repository::CachedRepository;
use crate::secret::{self, HasherHandle};
use crate::validate;
use exn::ResultExt;
use std::sync::Arc;
use strongbox_auth::TokenService;
use strongbox_auth::error::ErrorKind as AuthErrorKind;
use strongbox_store::User;
use time::{Duration, UtcDateTime};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

/// Default session lifetime.
pub const SESSION_TTL: Duration = Duration::hours(24);
/// Hashed once per process so logins for unknown emails cost one
/// verification, same as logins for real accounts.
const DECOY_PASSWORD: &str = "strongbox-decoy-password";

pub type TokenServiceHandle = Arc<dyn TokenService + Send + Sync>;

/// A signed-in user and their bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user: User,
    pub expires_at: UtcDateTime,
}

#[derive(Clone)]
pub struct Accounts {
    repo: CachedRepository,
    hasher: HasherHandle,
    tokens: TokenServiceHandle,
    session_ttl: Duration,
    decoy: Arc<OnceCell<String>>,
}

impl std::fmt::Debug for Accounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accounts").field("session_ttl", &self.session_ttl).finish_non_exhaustive()
    }
}

impl Accounts {
    pub fn new(repo: CachedRepository, hasher: HasherHandle, tokens: TokenServiceHandle) -> Self {
        Self { repo, hasher, tokens, session_ttl: SESSION_TTL, decoy: Arc::default() }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Create an account. The email is normalized (trimmed, lowercased)
    /// before it is stored.
    #[instrument(skip_all)]
    pub async fn register(&self, email: &str, password: &str, full_name: &str) -> Result<User> {
        let email = validate::email(email)?;
        validate::account_password(password)?;
        let full_name = full_name.trim();
        validate::full_name(full_name)?;

        let digest = secret::hash(&self.hasher, password).await?;
        let user = User::new(email, digest, full_name, self.repo.now());
        self.repo.create_user(&user).await?;
        info!(user = %user.id, "account registered");
        Ok(user)
    }

    /// Exchange credentials for a session.
    ///
    /// An unknown email, an inactive account and a wrong password are all
    /// reported as [`ErrorKind::Unauthorized`], and all three pay for one
    /// password verification.
    #[instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        let email = email.trim().to_lowercase();
        let user = match self.repo.get_user_by_email(&email).await {
            Ok(user) => Some(user),
            Err(err) if *err == ErrorKind::NotFound => None,
            Err(err) => return Err(err),
        };
        let digest = match &user {
            Some(user) => user.password_hash.as_str(),
            None => self.decoy_digest().await?,
        };
        let verified = secret::verify(&self.hasher, digest, password).await?;
        let Some(user) = user else {
            debug!("login for unknown email");
            exn::bail!(ErrorKind::Unauthorized);
        };
        if !user.is_active {
            debug!(user = %user.id, "login for inactive account");
            exn::bail!(ErrorKind::Unauthorized);
        }
        if !verified {
            debug!(user = %user.id, "wrong password");
            exn::bail!(ErrorKind::Unauthorized);
        }
        let session = self.issue(user)?;
        info!(user = %session.user.id, "logged in");
        Ok(session)
    }

    /// Resolve a bearer token to an active user.
    pub async fn authenticate(&self, token: &str) -> Result<User> {
        let user_id = match self.tokens.verify(token, self.repo.now()) {
            Ok(user_id) => user_id,
            Err(err) if matches!(&*err, AuthErrorKind::InvalidToken | AuthErrorKind::ExpiredToken) => {
                return Err(err).or_raise(|| ErrorKind::Unauthorized);
            },
            Err(err) => return Err(err).or_raise(|| ErrorKind::Auth),
        };
        let user = match self.repo.get_user_by_id(user_id).await {
            Ok(user) => user,
            Err(err) if *err == ErrorKind::NotFound => exn::bail!(ErrorKind::Unauthorized),
            Err(err) => return Err(err),
        };
        if !user.is_active {
            exn::bail!(ErrorKind::Unauthorized);
        }
        Ok(user)
    }

    /// Trade a still-valid token for a fresh one.
    pub async fn refresh(&self, token: &str) -> Result<Session> {
        let user = self.authenticate(token).await?;
        self.issue(user)
    }

    async fn decoy_digest(&self) -> Result<&str> {
        let digest = self.decoy.get_or_try_init(|| secret::hash(&self.hasher, DECOY_PASSWORD)).await?;
        Ok(digest.as_str())
    }

    fn issue(&self, user: User) -> Result<Session> {
        let now = self.repo.now();
        let token = self.tokens.issue(user.id, self.session_ttl, now).or_raise(|| ErrorKind::Auth)?;
        Ok(Session { token, user, expires_at: now + self.session_ttl })
    }
}
