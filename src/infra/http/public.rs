use std::io::ErrorKind;

use axum::{
    Extension, Router,
    body::Body,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::error;

use crate::{
    application::{auth::Viewer, error::HttpError, feed::FeedError, posts::PostError},
    cache::response_cache_layer,
    infra::uploads::UploadStorageError,
    presentation::views::{
        FollowTemplate, GroupTemplate, IndexTemplate, LayoutContext, PostDetailTemplate,
        ProfileTemplate, render_not_found_response, render_template_response,
    },
};

use super::{
    HttpState, PostId, RequireUser, auth, db_health_response,
    middleware::{log_responses, resolve_session, set_request_context},
    post_error_to_http, posts, repo_error_to_http, social,
};

pub fn build_router(state: HttpState) -> Router {
    let cached_routes = Router::new().route("/", get(index)).layer(
        middleware::from_fn_with_state(state.cache.clone(), response_cache_layer),
    );

    let upload_limit = DefaultBodyLimit::max(state.max_request_bytes);
    let routes = Router::new()
        .route("/group/{slug}/", get(group_posts))
        .route("/profile/{username}/", get(profile))
        .route("/posts/{post_id}/", get(post_detail))
        .route(
            "/create/",
            get(posts::create_form)
                .post(posts::create_submit)
                .layer(upload_limit.clone()),
        )
        .route(
            "/posts/{post_id}/edit/",
            get(posts::edit_form)
                .post(posts::edit_submit)
                .layer(upload_limit),
        )
        .route(
            "/posts/{post_id}/comment/",
            axum::routing::post(social::add_comment),
        )
        .route("/follow/", get(follow_index))
        .route(
            "/profile/{username}/follow/",
            get(social::follow).post(social::follow),
        )
        .route(
            "/profile/{username}/unfollow/",
            get(social::unfollow).post(social::unfollow),
        )
        .route(
            "/auth/signup/",
            get(auth::signup_form).post(auth::signup_submit),
        )
        .route("/auth/login/", get(auth::login_form).post(auth::login_submit))
        .route("/auth/logout/", get(auth::logout).post(auth::logout))
        .route("/media/{*path}", get(serve_media))
        .route("/_health/db", get(public_health));

    cached_routes
        .merge(routes)
        .fallback(fallback)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn_with_state(state.clone(), resolve_session))
        .layer(middleware::from_fn(set_request_context))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct PageQuery {
    page: Option<String>,
}

async fn index(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    Query(query): Query<PageQuery>,
) -> Response {
    match state.feed.index(query.page.as_deref()).await {
        Ok(content) => {
            let view = LayoutContext::new(&viewer, content);
            render_template_response(IndexTemplate { view }, StatusCode::OK)
        }
        Err(err) => feed_error_to_response(err, &viewer),
    }
}

async fn group_posts(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    match state.feed.group(&slug, query.page.as_deref()).await {
        Ok(content) => {
            let view = LayoutContext::new(&viewer, content);
            render_template_response(GroupTemplate { view }, StatusCode::OK)
        }
        Err(err) => feed_error_to_response(err, &viewer),
    }
}

async fn profile(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    match state
        .feed
        .profile(&username, &viewer, query.page.as_deref())
        .await
    {
        Ok(content) => {
            let view = LayoutContext::new(&viewer, content);
            render_template_response(ProfileTemplate { view }, StatusCode::OK)
        }
        Err(err) => feed_error_to_response(err, &viewer),
    }
}

async fn post_detail(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    PostId(post_id): PostId,
) -> Response {
    match state.posts.detail(post_id, &viewer).await {
        Ok(content) => {
            let view = LayoutContext::new(&viewer, content);
            render_template_response(PostDetailTemplate { view }, StatusCode::OK)
        }
        Err(PostError::NotFound) => render_not_found_response(&viewer),
        Err(err) => post_error_to_http("infra::http::public::post_detail", err).into_response(),
    }
}

async fn follow_index(
    State(state): State<HttpState>,
    RequireUser(user): RequireUser,
    Extension(viewer): Extension<Viewer>,
    Query(query): Query<PageQuery>,
) -> Response {
    match state.feed.follow_feed(user.id, query.page.as_deref()).await {
        Ok(content) => {
            let view = LayoutContext::new(&viewer, content);
            render_template_response(FollowTemplate { view }, StatusCode::OK)
        }
        Err(err) => feed_error_to_response(err, &viewer),
    }
}

async fn fallback(Extension(viewer): Extension<Viewer>) -> Response {
    render_not_found_response(&viewer)
}

pub(super) fn feed_error_to_response(err: FeedError, viewer: &Viewer) -> Response {
    const SOURCE: &str = "infra::http::feed_error_to_response";
    let reason = match err {
        FeedError::UnknownGroup => "Unknown group",
        FeedError::UnknownAuthor => "Unknown author",
        FeedError::Repo(err) => return repo_error_to_http(SOURCE, err).into_response(),
    };

    let mut response = render_not_found_response(viewer);
    crate::application::error::ErrorReport::from_message(SOURCE, StatusCode::NOT_FOUND, reason)
        .attach(&mut response);
    response
}

async fn public_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.ping().await)
}

async fn serve_media(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_media";

    match state.upload_storage.read(&path).await {
        Ok(bytes) => build_media_response(&path, bytes),
        Err(UploadStorageError::InvalidPath) => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Upload not found",
            "The requested upload is not available",
        )
        .into_response(),
        Err(UploadStorageError::Io(err)) if err.kind() == ErrorKind::NotFound => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Upload not found",
            "The requested upload is not available",
        )
        .into_response(),
        Err(err) => {
            error!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to read stored upload"
            );
            HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read uploaded file",
                err.to_string(),
            )
            .into_response()
        }
    }
}

fn build_media_response(path: &str, bytes: Bytes) -> Response {
    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    // Stored names embed a random id, so content under a path never changes.
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}
