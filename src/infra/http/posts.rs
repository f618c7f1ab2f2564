//! Post creation and author-only editing.

use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::Multipart;
use tracing::error;

use crate::{
    application::{
        auth::Viewer,
        error::HttpError,
        forms::{PostFormInput, UploadedImage},
        posts::{CreateOutcome, EditForm, EditOutcome, PostError},
    },
    presentation::views::{
        LayoutContext, PostFormContext, PostFormTemplate, post_url, profile_url,
        render_not_found_response, render_template_response,
    },
};

use super::{HttpState, PostId, RequireUser, post_error_to_http};

const SOURCE_BASE: &str = "infra::http::posts";

pub(super) async fn create_form(
    State(state): State<HttpState>,
    RequireUser(_user): RequireUser,
    Extension(viewer): Extension<Viewer>,
) -> Response {
    match state.posts.create_form().await {
        Ok(form) => render_form(&viewer, form),
        Err(err) => post_error_to_http("infra::http::posts::create_form", err).into_response(),
    }
}

pub(super) async fn create_submit(
    State(state): State<HttpState>,
    RequireUser(user): RequireUser,
    Extension(viewer): Extension<Viewer>,
    multipart: Multipart,
) -> Response {
    let input = match read_post_form(multipart).await {
        Ok(input) => input,
        Err(err) => return err.into_response(),
    };

    match state.posts.create(&user, &input).await {
        Ok(CreateOutcome::Created(_)) => Redirect::to(&profile_url(&user.username)).into_response(),
        Ok(CreateOutcome::Invalid(form)) => render_form(&viewer, form),
        Err(err) => post_error_to_http("infra::http::posts::create_submit", err).into_response(),
    }
}

pub(super) async fn edit_form(
    State(state): State<HttpState>,
    RequireUser(user): RequireUser,
    Extension(viewer): Extension<Viewer>,
    PostId(post_id): PostId,
) -> Response {
    match state.posts.edit_form(post_id, &user).await {
        Ok(EditForm::Form(form)) => render_form(&viewer, form),
        Ok(EditForm::Forbidden) => Redirect::to(&post_url(post_id)).into_response(),
        Err(PostError::NotFound) => render_not_found_response(&viewer),
        Err(err) => post_error_to_http("infra::http::posts::edit_form", err).into_response(),
    }
}

pub(super) async fn edit_submit(
    State(state): State<HttpState>,
    RequireUser(user): RequireUser,
    Extension(viewer): Extension<Viewer>,
    PostId(post_id): PostId,
    multipart: Multipart,
) -> Response {
    let input = match read_post_form(multipart).await {
        Ok(input) => input,
        Err(err) => return err.into_response(),
    };

    match state.posts.edit(post_id, &user, &input).await {
        Ok(EditOutcome::Updated(post)) => Redirect::to(&post_url(post.id)).into_response(),
        Ok(EditOutcome::Forbidden) => Redirect::to(&post_url(post_id)).into_response(),
        Ok(EditOutcome::Invalid(form)) => render_form(&viewer, form),
        Err(PostError::NotFound) => render_not_found_response(&viewer),
        Err(err) => post_error_to_http("infra::http::posts::edit_submit", err).into_response(),
    }
}

fn render_form(viewer: &Viewer, form: PostFormContext) -> Response {
    let view = LayoutContext::new(viewer, form);
    render_template_response(PostFormTemplate { view }, StatusCode::OK)
}

/// Collect the post form fields; an empty file input means "no new image".
async fn read_post_form(mut multipart: Multipart) -> Result<PostFormInput, HttpError> {
    const SOURCE: &str = "infra::http::posts::read_post_form";
    let mut input = PostFormInput::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                let status = err.status();
                error!(
                    target = SOURCE_BASE,
                    status = status.as_u16(),
                    error = %err,
                    "failed to read multipart payload"
                );
                let public_message = match status {
                    StatusCode::PAYLOAD_TOO_LARGE => "Upload exceeds the allowed size",
                    _ => "Invalid form submission",
                };
                return Err(HttpError::new(SOURCE, status, public_message, err.to_string()));
            }
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("text") => input.text = read_text(field, SOURCE).await?,
            Some("group") => {
                let value = read_text(field, SOURCE).await?;
                let trimmed = value.trim();
                input.group = (!trimmed.is_empty()).then(|| trimmed.to_string());
            }
            Some("image-clear") => {
                let value = read_text(field, SOURCE).await?;
                input.clear_image = matches!(value.trim(), "on" | "true" | "1");
            }
            Some("image") => {
                let file_name = field
                    .file_name()
                    .map(|value| value.trim().to_string())
                    .unwrap_or_default();
                let bytes = field.bytes().await.map_err(|err| {
                    HttpError::new(SOURCE, err.status(), "Invalid form submission", err.to_string())
                })?;
                if !file_name.is_empty() || !bytes.is_empty() {
                    input.image = Some(UploadedImage { file_name, bytes });
                }
            }
            _ => continue,
        }
    }

    Ok(input)
}

async fn read_text(
    field: axum_extra::extract::multipart::Field,
    source: &'static str,
) -> Result<String, HttpError> {
    field.text().await.map_err(|err| {
        HttpError::new(source, err.status(), "Invalid form submission", err.to_string())
    })
}
