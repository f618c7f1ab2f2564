//! Typed path parameters that fail as a rendered 404 page.

use axum::{
    extract::{FromRequestParts, Path},
    http::request::Parts,
    response::Response,
};

use crate::{application::auth::Viewer, presentation::views::render_not_found_response};

/// Numeric post id from the `{post_id}` segment.
///
/// Anything that is not an `i64` cannot name a post, so it is answered like an
/// unknown id instead of axum's plain-text 400.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostId(pub i64);

impl<S> FromRequestParts<S> for PostId
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let parsed = Path::<String>::from_request_parts(parts, state)
            .await
            .ok()
            .and_then(|Path(raw)| parse_post_id(&raw));

        match parsed {
            Some(id) => Ok(Self(id)),
            None => {
                let viewer = parts.extensions.get::<Viewer>().cloned().unwrap_or_default();
                Err(render_not_found_response(&viewer))
            }
        }
    }
}

fn parse_post_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().filter(|id| *id > 0)
}
