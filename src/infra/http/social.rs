//! Comments and follow relations.

use axum::{
    Extension, Form,
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;

use crate::{
    application::{
        auth::Viewer,
        comments::{CommentError, CommentOutcome},
        follows::FollowError,
        forms::CommentFormInput,
    },
    presentation::views::{post_url, profile_url, render_not_found_response},
};

use super::{HttpState, PostId, RequireUser, repo_error_to_http};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct CommentPayload {
    text: String,
}

/// Always lands back on the post; invalid text is dropped without a message.
pub(super) async fn add_comment(
    State(state): State<HttpState>,
    RequireUser(user): RequireUser,
    Extension(viewer): Extension<Viewer>,
    PostId(post_id): PostId,
    Form(payload): Form<CommentPayload>,
) -> Response {
    let input = CommentFormInput { text: payload.text };
    match state.comments.add_comment(post_id, &user, &input).await {
        Ok(CommentOutcome::Created(_) | CommentOutcome::Rejected(_)) => {
            Redirect::to(&post_url(post_id)).into_response()
        }
        Err(CommentError::PostNotFound) => render_not_found_response(&viewer),
        Err(CommentError::Repo(err)) => {
            repo_error_to_http("infra::http::social::add_comment", err).into_response()
        }
    }
}

pub(super) async fn follow(
    State(state): State<HttpState>,
    RequireUser(user): RequireUser,
    Extension(viewer): Extension<Viewer>,
    Path(username): Path<String>,
) -> Response {
    let result = state.follows.follow(&user, &username).await;
    follow_response(
        result.map(|(author, _)| author.username),
        &viewer,
        "infra::http::social::follow",
    )
}

pub(super) async fn unfollow(
    State(state): State<HttpState>,
    RequireUser(user): RequireUser,
    Extension(viewer): Extension<Viewer>,
    Path(username): Path<String>,
) -> Response {
    let result = state.follows.unfollow(&user, &username).await;
    follow_response(
        result.map(|(author, _)| author.username),
        &viewer,
        "infra::http::social::unfollow",
    )
}

fn follow_response(
    result: Result<String, FollowError>,
    viewer: &Viewer,
    source: &'static str,
) -> Response {
    match result {
        Ok(username) => Redirect::to(&profile_url(&username)).into_response(),
        Err(FollowError::UnknownAuthor) => render_not_found_response(viewer),
        Err(FollowError::Repo(err)) => repo_error_to_http(source, err).into_response(),
    }
}
