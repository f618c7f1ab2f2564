//! Session cookie handling and the login-required extractor.

use axum::{
    extract::{FromRequestParts, OriginalUri},
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use url::form_urlencoded;

use crate::application::auth::{CurrentUser, SessionToken, Viewer};
use crate::config::SessionSettings;

pub const LOGIN_PATH: &str = "/auth/login/";

/// How the session secret travels to the browser.
#[derive(Debug, Clone)]
pub struct SessionCookie {
    name: String,
    secure: bool,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, secure: bool) -> Self {
        Self {
            name: name.into(),
            secure,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn issue(&self, jar: CookieJar, token: &SessionToken) -> CookieJar {
        let cookie = Cookie::build((self.name.clone(), token.secret.clone()))
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .path("/")
            .expires(token.expires_at);
        jar.add(cookie)
    }

    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        jar.remove(Cookie::build(self.name.clone()).path("/"))
    }
}

impl From<&SessionSettings> for SessionCookie {
    fn from(settings: &SessionSettings) -> Self {
        Self::new(settings.cookie_name.clone(), settings.secure_cookie)
    }
}

/// Extractor for routes that need a signed-in user.
///
/// Anonymous requests are rejected with a `303` to the login page carrying the
/// original path in `next`.
#[derive(Debug, Clone)]
pub struct RequireUser(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(Viewer::Authenticated(user)) = parts.extensions.get::<Viewer>() {
            return Ok(Self(user.clone()));
        }

        let original = parts
            .extensions
            .get::<OriginalUri>()
            .map(|uri| uri.0.clone())
            .unwrap_or_else(|| parts.uri.clone());
        let next = original
            .path_and_query()
            .map(|value| value.as_str().to_string())
            .unwrap_or_else(|| original.path().to_string());

        Err(Redirect::to(&login_redirect_target(&next)).into_response())
    }
}

pub fn login_redirect_target(next: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(next.as_bytes()).collect();
    format!("{LOGIN_PATH}?next={encoded}")
}

/// Only same-site absolute paths are followed after login.
pub fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path
        }
        _ => "/",
    }
}
