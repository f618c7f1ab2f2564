mod auth;
mod middleware;
mod params;
mod posts;
mod public;
mod session;
mod social;

pub use params::PostId;
pub use public::build_router;
pub use session::{RequireUser, SessionCookie};

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::application::{
    auth::{AuthError, AuthService},
    comments::CommentService,
    error::{ErrorReport, HttpError},
    feed::FeedService,
    follows::FollowService,
    posts::{PostError, PostService},
    repos::{HealthRepo, RepoError},
};
use crate::cache::CacheState;
use crate::infra::uploads::{UploadStorage, UploadStorageError};

/// Everything the handlers share; cloned per request.
#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub posts: Arc<PostService>,
    pub comments: Arc<CommentService>,
    pub follows: Arc<FollowService>,
    pub auth: Arc<AuthService>,
    pub health: Arc<dyn HealthRepo>,
    pub upload_storage: Arc<UploadStorage>,
    pub cache: CacheState,
    pub session_cookie: SessionCookie,
    /// Upper bound for multipart post submissions.
    pub max_request_bytes: usize,
}

fn db_health_response(result: Result<(), RepoError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

/// Map a repository error to a consistent HTTP error response.
pub fn repo_error_to_http(source: &'static str, err: RepoError) -> HttpError {
    match err {
        RepoError::Duplicate { constraint } => {
            HttpError::new(source, StatusCode::CONFLICT, "Duplicate record", constraint)
        }
        RepoError::NotFound => HttpError::new(
            source,
            StatusCode::NOT_FOUND,
            "Resource not found",
            "resource not found",
        ),
        RepoError::InvalidInput { message } => {
            HttpError::new(source, StatusCode::BAD_REQUEST, "Invalid input", message)
        }
        RepoError::Integrity { message } => HttpError::new(
            source,
            StatusCode::CONFLICT,
            "Integrity constraint violated",
            message,
        ),
        RepoError::Timeout => HttpError::new(
            source,
            StatusCode::SERVICE_UNAVAILABLE,
            "Database timeout",
            "Database timeout",
        ),
        RepoError::Persistence(message) => HttpError::new(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Persistence error",
            message,
        ),
    }
}

fn auth_error_to_http(source: &'static str, err: AuthError) -> HttpError {
    match err {
        AuthError::Repo(err) => repo_error_to_http(source, err),
        AuthError::Hashing(message) => HttpError::new(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Account operation failed",
            message,
        ),
    }
}

fn upload_error_to_http(source: &'static str, err: UploadStorageError) -> HttpError {
    HttpError::from_error(
        source,
        StatusCode::INTERNAL_SERVER_ERROR,
        "Failed to store uploaded image",
        &err,
    )
}

fn post_error_to_http(source: &'static str, err: PostError) -> HttpError {
    match err {
        PostError::NotFound => repo_error_to_http(source, RepoError::NotFound),
        PostError::Repo(err) => repo_error_to_http(source, err),
        PostError::Storage(err) => upload_error_to_http(source, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_errors_map_to_statuses() {
        let cases = [
            (RepoError::NotFound, StatusCode::NOT_FOUND),
            (
                RepoError::Duplicate {
                    constraint: "groups_slug_key".into(),
                },
                StatusCode::CONFLICT,
            ),
            (RepoError::Timeout, StatusCode::SERVICE_UNAVAILABLE),
            (
                RepoError::Persistence("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(repo_error_to_http("test", err).status(), status);
        }
    }

    #[test]
    fn failed_health_check_is_unavailable() {
        let response = db_health_response(Err(RepoError::Timeout));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.extensions().get::<ErrorReport>().is_some());
    }
}
