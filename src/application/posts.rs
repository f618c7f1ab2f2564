//! Post detail, creation and author-only editing.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::application::auth::{CurrentUser, Viewer};
use crate::application::authz::{Action, Actor, authorize};
use crate::application::forms::{PostForm, PostFormInput, ValidImage, validate_post_form};
use crate::application::repos::{
    CommentsRepo, CreatePostParams, GroupsRepo, PostFilter, PostsRepo, PostsWriteRepo, RepoError,
    UpdatePostParams,
};
use crate::domain::entities::PostRecord;
use crate::infra::uploads::{UploadStorage, UploadStorageError};
use crate::presentation::views::{CommentView, PostCard, PostDetailContext, PostFormContext};

const SOURCE: &str = "quillfeed::application::posts";

#[derive(Debug, Error)]
pub enum PostError {
    #[error("post not found")]
    NotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("failed to store image: {0}")]
    Storage(#[from] UploadStorageError),
}

#[derive(Debug)]
pub enum CreateOutcome {
    Created(PostRecord),
    Invalid(PostFormContext),
}

#[derive(Debug)]
pub enum EditOutcome {
    Updated(PostRecord),
    /// The actor is not the author; nothing was changed.
    Forbidden,
    Invalid(PostFormContext),
}

#[derive(Debug)]
pub enum EditForm {
    Form(PostFormContext),
    Forbidden,
}

#[derive(Clone)]
pub struct PostService {
    reader: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    groups: Arc<dyn GroupsRepo>,
    comments: Arc<dyn CommentsRepo>,
    uploads: Arc<UploadStorage>,
    max_image_bytes: usize,
}

impl PostService {
    pub fn new(
        reader: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        groups: Arc<dyn GroupsRepo>,
        comments: Arc<dyn CommentsRepo>,
        uploads: Arc<UploadStorage>,
        max_image_bytes: usize,
    ) -> Self {
        Self {
            reader,
            writer,
            groups,
            comments,
            uploads,
            max_image_bytes,
        }
    }

    pub async fn detail(&self, post_id: i64, viewer: &Viewer) -> Result<PostDetailContext, PostError> {
        let post = self.load(post_id).await?;
        let comments = self.comments.list_for_post(post.id).await?;
        let author_post_count = self
            .reader
            .count_posts(PostFilter::Author(post.author.id))
            .await?;

        let can_edit = viewer
            .user()
            .map(|user| authorize(actor(user), Action::EditPost(&post)).is_allowed())
            .unwrap_or(false);

        Ok(PostDetailContext {
            title: post.to_string(),
            post: PostCard::from(&post),
            author_post_count,
            can_edit,
            edit_url: format!("/posts/{}/edit/", post.id),
            comments: comments.iter().map(CommentView::from).collect(),
            show_comment_form: viewer.is_authenticated(),
            comment_url: format!("/posts/{}/comment/", post.id),
        })
    }

    pub async fn create_form(&self) -> Result<PostFormContext, PostError> {
        let groups = self.groups.list_groups().await?;
        Ok(PostFormContext::create(&groups))
    }

    pub async fn create(
        &self,
        author: &CurrentUser,
        input: &PostFormInput,
    ) -> Result<CreateOutcome, PostError> {
        let groups = self.groups.list_groups().await?;
        let form = match validate_post_form(input, &groups, self.max_image_bytes) {
            Ok(form) => form,
            Err(errors) => {
                let context = PostFormContext::create(&groups).with_submission(
                    &input.text,
                    input.group.as_deref(),
                    &groups,
                    &errors,
                );
                return Ok(CreateOutcome::Invalid(context));
            }
        };

        let image = self.store_image(input, form.image.as_ref()).await?;
        let created = self
            .writer
            .create_post(CreatePostParams {
                author_id: author.id,
                group_id: form.group_id,
                text: form.text,
                image: image.clone(),
            })
            .await;

        match created {
            Ok(post) => {
                info!(
                    target = SOURCE,
                    post_id = post.id,
                    author_id = author.id,
                    "post created"
                );
                Ok(CreateOutcome::Created(post))
            }
            Err(err) => {
                self.discard_image(image.as_deref()).await;
                Err(err.into())
            }
        }
    }

    pub async fn edit_form(&self, post_id: i64, editor: &CurrentUser) -> Result<EditForm, PostError> {
        let post = self.load(post_id).await?;
        if !authorize(actor(editor), Action::EditPost(&post)).is_allowed() {
            return Ok(EditForm::Forbidden);
        }
        let groups = self.groups.list_groups().await?;
        Ok(EditForm::Form(PostFormContext::edit(&post, &groups)))
    }

    pub async fn edit(
        &self,
        post_id: i64,
        editor: &CurrentUser,
        input: &PostFormInput,
    ) -> Result<EditOutcome, PostError> {
        let post = self.load(post_id).await?;
        if !authorize(actor(editor), Action::EditPost(&post)).is_allowed() {
            warn!(
                target = SOURCE,
                post_id,
                editor_id = editor.id,
                "edit attempt by non-author ignored"
            );
            return Ok(EditOutcome::Forbidden);
        }

        let groups = self.groups.list_groups().await?;
        let form = match validate_post_form(input, &groups, self.max_image_bytes) {
            Ok(form) => form,
            Err(errors) => {
                let context = PostFormContext::edit(&post, &groups).with_submission(
                    &input.text,
                    input.group.as_deref(),
                    &groups,
                    &errors,
                );
                return Ok(EditOutcome::Invalid(context));
            }
        };

        let stored = self.store_image(input, form.image.as_ref()).await?;
        let image = next_image(&post, &form, stored.as_deref());
        let updated = self
            .writer
            .update_post(UpdatePostParams {
                id: post.id,
                group_id: form.group_id,
                text: form.text,
                image: image.clone(),
            })
            .await;

        match updated {
            Ok(updated) => {
                if post.image.is_some() && post.image != image {
                    self.discard_image(post.image.as_deref()).await;
                }
                info!(target = SOURCE, post_id, "post updated");
                Ok(EditOutcome::Updated(updated))
            }
            Err(err) => {
                self.discard_image(stored.as_deref()).await;
                Err(err.into())
            }
        }
    }

    async fn load(&self, post_id: i64) -> Result<PostRecord, PostError> {
        self.reader
            .find_by_id(post_id)
            .await?
            .ok_or(PostError::NotFound)
    }

    async fn store_image(
        &self,
        input: &PostFormInput,
        image: Option<&ValidImage>,
    ) -> Result<Option<String>, PostError> {
        let Some(image) = image else {
            return Ok(None);
        };
        let file_name = input
            .image
            .as_ref()
            .map(|upload| upload.file_name.as_str())
            .unwrap_or("image");
        let stored = self
            .uploads
            .store_post_image(file_name, image.extension, image.bytes.clone())
            .await?;
        Ok(Some(stored.stored_path))
    }

    async fn discard_image(&self, stored_path: Option<&str>) {
        let Some(path) = stored_path else {
            return;
        };
        if let Err(err) = self.uploads.delete(path).await {
            warn!(target = SOURCE, path, error = %err, "failed to remove stored image");
        }
    }
}

fn actor(user: &CurrentUser) -> Actor {
    Actor { user_id: user.id }
}

/// A new upload replaces the image, an explicit clear removes it, otherwise it stays.
fn next_image(post: &PostRecord, form: &PostForm, stored: Option<&str>) -> Option<String> {
    match stored {
        Some(path) => Some(path.to_string()),
        None if form.clear_image => None,
        None => post.image.clone(),
    }
}
