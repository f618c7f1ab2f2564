//! Accounts and cookie sessions.
//!
//! Passwords are stored as argon2 PHC strings. Sessions are opaque random
//! secrets handed to the browser; only their sha256 digest is persisted and
//! sessions are looked up by that digest, never by the secret itself.

use std::sync::{Arc, LazyLock};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::forms::{
    self, FormErrors, LoginFormInput, SignupFormInput, validate_login_form, validate_signup_form,
};
use crate::application::repos::{CreateUserParams, RepoError, SessionsRepo, UsersRepo};
use crate::domain::entities::{SessionRecord, UserRecord};

const MIN_TOKEN_LEN: usize = 32;

/// Verified against when the username is unknown so both login paths pay for argon2.
static UNKNOWN_USER_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("quillfeed-unknown-user").ok());

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Authenticated account attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
}

impl From<&UserRecord> for CurrentUser {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
        }
    }
}

/// Who is making the current request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Viewer {
    #[default]
    Anonymous,
    Authenticated(CurrentUser),
}

impl Viewer {
    pub fn user(&self) -> Option<&CurrentUser> {
        match self {
            Viewer::Anonymous => None,
            Viewer::Authenticated(user) => Some(user),
        }
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user().map(|user| user.id)
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }
}

/// Browser-facing session secret and its expiry.
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub secret: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug)]
pub enum SignupOutcome {
    Created {
        user: UserRecord,
        session: SessionToken,
    },
    Invalid(FormErrors),
}

#[derive(Debug)]
pub enum LoginOutcome {
    LoggedIn {
        user: UserRecord,
        session: SessionToken,
    },
    Invalid(FormErrors),
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UsersRepo>,
    sessions: Arc<dyn SessionsRepo>,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        sessions: Arc<dyn SessionsRepo>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            session_ttl,
        }
    }

    pub async fn signup(&self, input: &SignupFormInput) -> Result<SignupOutcome, AuthError> {
        let form = match validate_signup_form(input) {
            Ok(form) => form,
            Err(errors) => return Ok(SignupOutcome::Invalid(errors)),
        };

        if self.users.find_by_username(&form.username).await?.is_some() {
            let mut errors = FormErrors::default();
            errors.add("username", forms::USERNAME_TAKEN);
            return Ok(SignupOutcome::Invalid(errors));
        }

        let password_hash = hash_password(&form.password)?;
        let created = self
            .users
            .create_user(CreateUserParams {
                username: form.username,
                email: form.email,
                password_hash,
            })
            .await;

        let user = match created {
            Ok(user) => user,
            // Lost a race with a concurrent signup for the same name.
            Err(RepoError::Duplicate { .. }) => {
                let mut errors = FormErrors::default();
                errors.add("username", forms::USERNAME_TAKEN);
                return Ok(SignupOutcome::Invalid(errors));
            }
            Err(err) => return Err(err.into()),
        };

        info!(
            target = "quillfeed::application::auth",
            user_id = user.id,
            username = %user.username,
            "account created"
        );

        let session = self.start_session(user.id).await?;
        Ok(SignupOutcome::Created { user, session })
    }

    pub async fn login(&self, input: &LoginFormInput) -> Result<LoginOutcome, AuthError> {
        let form = match validate_login_form(input) {
            Ok(form) => form,
            Err(errors) => return Ok(LoginOutcome::Invalid(errors)),
        };

        let user = self.users.find_by_username(&form.username).await?;
        let verified = match &user {
            Some(user) => verify_password(&form.password, &user.password_hash)?,
            None => {
                if let Some(hash) = UNKNOWN_USER_HASH.as_deref() {
                    verify_password(&form.password, hash)?;
                }
                false
            }
        };

        match user {
            Some(user) if verified => {
                let session = self.start_session(user.id).await?;
                debug!(
                    target = "quillfeed::application::auth",
                    user_id = user.id,
                    "session started"
                );
                Ok(LoginOutcome::LoggedIn { user, session })
            }
            _ => {
                let mut errors = FormErrors::default();
                errors.add_non_field(forms::INVALID_LOGIN);
                Ok(LoginOutcome::Invalid(errors))
            }
        }
    }

    pub async fn logout(&self, secret: &str) -> Result<(), AuthError> {
        if let Some(token_hash) = token_hash(secret) {
            self.sessions.delete_session(&token_hash).await?;
        }
        Ok(())
    }

    /// Map a cookie secret to a viewer; unknown or expired sessions are anonymous.
    pub async fn resolve(&self, secret: &str) -> Result<Viewer, AuthError> {
        let Some(token_hash) = token_hash(secret) else {
            return Ok(Viewer::Anonymous);
        };
        let Some(session) = self.sessions.find_session(&token_hash).await? else {
            return Ok(Viewer::Anonymous);
        };

        if !session.is_live_at(OffsetDateTime::now_utc()) {
            self.sessions.delete_session(&token_hash).await?;
            return Ok(Viewer::Anonymous);
        }

        Ok(self
            .users
            .find_by_id(session.user_id)
            .await?
            .map(|user| Viewer::Authenticated(CurrentUser::from(&user)))
            .unwrap_or_default())
    }

    pub async fn purge_expired(&self) -> Result<u64, AuthError> {
        Ok(self
            .sessions
            .delete_expired(OffsetDateTime::now_utc())
            .await?)
    }

    async fn start_session(&self, user_id: i64) -> Result<SessionToken, AuthError> {
        let secret = generate_secret();
        let now = OffsetDateTime::now_utc();
        let expires_at = now + self.session_ttl;
        let token_hash = hash_secret(&secret);

        self.sessions
            .create_session(SessionRecord {
                token_hash,
                user_id,
                created_at: now,
                expires_at,
            })
            .await?;

        Ok(SessionToken { secret, expires_at })
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::Hashing(err.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|err| AuthError::Hashing(err.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn generate_secret() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

fn token_hash(secret: &str) -> Option<String> {
    let secret = secret.trim();
    if secret.len() < MIN_TOKEN_LEN || !secret.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    Some(hash_secret(secret))
}
