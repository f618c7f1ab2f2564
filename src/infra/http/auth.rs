//! Signup, login and logout.

use axum::{
    Extension, Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    application::{
        auth::{LoginOutcome, SignupOutcome, Viewer},
        forms::{FormErrors, LoginFormInput, SignupFormInput},
    },
    presentation::views::{
        LayoutContext, LoginContext, LoginTemplate, SignupContext, SignupTemplate,
        render_template_response,
    },
};

use super::{HttpState, auth_error_to_http, session::safe_next};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct NextQuery {
    next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct LoginPayload {
    username: String,
    password: String,
    next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct SignupPayload {
    username: String,
    email: String,
    password1: String,
    password2: String,
}

pub(super) async fn signup_form(Extension(viewer): Extension<Viewer>) -> Response {
    let content = SignupContext::new("", "", &FormErrors::default());
    render_template_response(
        SignupTemplate {
            view: LayoutContext::new(&viewer, content),
        },
        StatusCode::OK,
    )
}

pub(super) async fn signup_submit(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    jar: CookieJar,
    Form(payload): Form<SignupPayload>,
) -> Response {
    let input = SignupFormInput {
        username: payload.username,
        email: payload.email,
        password1: payload.password1,
        password2: payload.password2,
    };

    match state.auth.signup(&input).await {
        Ok(SignupOutcome::Created { user, session }) => {
            info!(
                target = "quillfeed::http::auth",
                user_id = user.id,
                "account created"
            );
            let jar = state.session_cookie.issue(jar, &session);
            (jar, Redirect::to("/")).into_response()
        }
        Ok(SignupOutcome::Invalid(errors)) => {
            let content = SignupContext::new(&input.username, &input.email, &errors);
            render_template_response(
                SignupTemplate {
                    view: LayoutContext::new(&viewer, content),
                },
                StatusCode::OK,
            )
        }
        Err(err) => auth_error_to_http("infra::http::auth::signup", err).into_response(),
    }
}

pub(super) async fn login_form(
    Extension(viewer): Extension<Viewer>,
    Query(query): Query<NextQuery>,
) -> Response {
    let next = safe_next(query.next.as_deref());
    render_login(&viewer, "", next, &FormErrors::default())
}

pub(super) async fn login_submit(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    jar: CookieJar,
    Form(payload): Form<LoginPayload>,
) -> Response {
    let next = safe_next(payload.next.as_deref()).to_string();
    let input = LoginFormInput {
        username: payload.username,
        password: payload.password,
    };

    match state.auth.login(&input).await {
        Ok(LoginOutcome::LoggedIn { user, session }) => {
            info!(
                target = "quillfeed::http::auth",
                user_id = user.id,
                "user logged in"
            );
            let jar = state.session_cookie.issue(jar, &session);
            (jar, Redirect::to(&next)).into_response()
        }
        Ok(LoginOutcome::Invalid(errors)) => {
            render_login(&viewer, &input.username, &next, &errors)
        }
        Err(err) => auth_error_to_http("infra::http::auth::login", err).into_response(),
    }
}

pub(super) async fn logout(State(state): State<HttpState>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(state.session_cookie.name()) {
        if let Err(err) = state.auth.logout(cookie.value()).await {
            warn!(
                target = "quillfeed::http::auth",
                error = %err,
                "failed to delete session during logout"
            );
        }
    }

    let jar = state.session_cookie.clear(jar);
    (jar, Redirect::to("/")).into_response()
}

fn render_login(viewer: &Viewer, username: &str, next: &str, errors: &FormErrors) -> Response {
    let content = LoginContext::new(username, next, errors);
    render_template_response(
        LoginTemplate {
            view: LayoutContext::new(viewer, content),
        },
        StatusCode::OK,
    )
}
