//! Typed request-to-record mapping.
//!
//! Every form has a raw input struct populated by the HTTP layer and a
//! validating function returning either the cleaned values or `FormErrors`.
//! Invalid submissions never reach a repository.

use std::collections::BTreeMap;

use bytes::Bytes;
use imagesize::ImageType;
use serde::Serialize;

use crate::domain::entities::GroupRecord;
use crate::domain::users::{validate_password, validate_username};

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_CHOICE: &str = "Select a valid choice.";
pub const INVALID_IMAGE: &str = "Upload a valid image.";
pub const IMAGE_TOO_LARGE: &str = "The uploaded image is too large.";
pub const CLEAR_AND_UPLOAD: &str =
    "Please either submit a file or check the clear checkbox, not both.";
pub const PASSWORD_MISMATCH: &str = "The two password fields didn’t match.";
pub const USERNAME_TAKEN: &str = "A user with that username already exists.";
pub const INVALID_LOGIN: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";

/// Field-level and form-level validation messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormErrors {
    fields: BTreeMap<&'static str, Vec<String>>,
    non_field: Vec<String>,
}

impl FormErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.entry(field).or_default().push(message.into());
    }

    pub fn add_non_field(&mut self, message: impl Into<String>) {
        self.non_field.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.non_field.is_empty()
    }

    pub fn field(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn non_field(&self) -> &[String] {
        &self.non_field
    }

    fn into_result<T>(self, value: impl FnOnce() -> T) -> Result<T, FormErrors> {
        if self.is_empty() { Ok(value()) } else { Err(self) }
    }
}

/// Image bytes submitted with a post form.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Default)]
pub struct PostFormInput {
    pub text: String,
    pub group: Option<String>,
    pub image: Option<UploadedImage>,
    pub clear_image: bool,
}

/// A recognised raster image ready to be written to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidImage {
    pub extension: &'static str,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostForm {
    pub text: String,
    pub group_id: Option<i64>,
    pub image: Option<ValidImage>,
    pub clear_image: bool,
}

pub fn validate_post_form(
    input: &PostFormInput,
    groups: &[GroupRecord],
    max_image_bytes: usize,
) -> Result<PostForm, FormErrors> {
    let mut errors = FormErrors::default();

    let text = input.text.trim();
    if text.is_empty() {
        errors.add("text", REQUIRED);
    }

    let group_id = match input.group.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match raw.parse::<i64>() {
            Ok(id) if groups.iter().any(|group| group.id == id) => Some(id),
            _ => {
                errors.add("group", INVALID_CHOICE);
                None
            }
        },
    };

    let image = match &input.image {
        None => None,
        Some(upload) if upload.bytes.is_empty() => None,
        Some(upload) if upload.bytes.len() > max_image_bytes => {
            errors.add("image", IMAGE_TOO_LARGE);
            None
        }
        Some(upload) => match detect_image(&upload.bytes) {
            Some(extension) => Some(ValidImage {
                extension,
                bytes: upload.bytes.clone(),
            }),
            None => {
                errors.add("image", INVALID_IMAGE);
                None
            }
        },
    };

    if input.clear_image && image.is_some() {
        errors.add("image", CLEAR_AND_UPLOAD);
    }

    let text = input.text.clone();
    let clear_image = input.clear_image;
    errors.into_result(|| PostForm {
        text,
        group_id,
        image,
        clear_image,
    })
}

/// File extension for a supported raster image, or `None` when the bytes
/// are not one.
pub fn detect_image(bytes: &[u8]) -> Option<&'static str> {
    let extension = match imagesize::image_type(bytes).ok()? {
        ImageType::Gif => "gif",
        ImageType::Png => "png",
        ImageType::Jpeg => "jpg",
        ImageType::Webp => "webp",
        ImageType::Bmp => "bmp",
        _ => return None,
    };
    let size = imagesize::blob_size(bytes).ok()?;
    (size.width > 0 && size.height > 0).then_some(extension)
}

#[derive(Debug, Clone, Default)]
pub struct CommentFormInput {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentForm {
    pub text: String,
}

pub fn validate_comment_form(input: &CommentFormInput) -> Result<CommentForm, FormErrors> {
    let mut errors = FormErrors::default();
    if input.text.trim().is_empty() {
        errors.add("text", REQUIRED);
    }
    let text = input.text.clone();
    errors.into_result(|| CommentForm { text })
}

#[derive(Debug, Clone, Default)]
pub struct SignupFormInput {
    pub username: String,
    pub email: String,
    pub password1: String,
    pub password2: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupForm {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
}

/// Username uniqueness is checked by the caller against storage.
pub fn validate_signup_form(input: &SignupFormInput) -> Result<SignupForm, FormErrors> {
    let mut errors = FormErrors::default();

    let username = input.username.trim();
    if let Err(message) = validate_username(username) {
        errors.add("username", message);
    }

    let email = input.email.trim();
    if !email.is_empty() && !looks_like_email(email) {
        errors.add("email", "Enter a valid email address.");
    }

    if let Err(message) = validate_password(&input.password1, username) {
        errors.add("password1", message);
    }
    if input.password2.is_empty() {
        errors.add("password2", REQUIRED);
    } else if input.password1 != input.password2 {
        errors.add("password2", PASSWORD_MISMATCH);
    }

    let username = username.to_string();
    let email = (!email.is_empty()).then(|| email.to_string());
    let password = input.password1.clone();
    errors.into_result(|| SignupForm {
        username,
        email,
        password,
    })
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoginFormInput {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

pub fn validate_login_form(input: &LoginFormInput) -> Result<LoginForm, FormErrors> {
    let mut errors = FormErrors::default();
    if input.username.trim().is_empty() {
        errors.add("username", REQUIRED);
    }
    if input.password.is_empty() {
        errors.add("password", REQUIRED);
    }
    let username = input.username.trim().to_string();
    let password = input.password.clone();
    errors.into_result(|| LoginForm { username, password })
}
