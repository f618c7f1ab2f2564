//! Comments on posts.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::application::auth::CurrentUser;
use crate::application::authz::{Action, Actor, authorize};
use crate::application::forms::{CommentFormInput, FormErrors, validate_comment_form};
use crate::application::repos::{CommentsRepo, CreateCommentParams, PostsRepo, RepoError};
use crate::domain::entities::CommentRecord;

#[derive(Debug, Error)]
pub enum CommentError {
    #[error("post not found")]
    PostNotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug)]
pub enum CommentOutcome {
    Created(CommentRecord),
    Rejected(FormErrors),
}

#[derive(Clone)]
pub struct CommentService {
    posts: Arc<dyn PostsRepo>,
    comments: Arc<dyn CommentsRepo>,
}

impl CommentService {
    pub fn new(posts: Arc<dyn PostsRepo>, comments: Arc<dyn CommentsRepo>) -> Self {
        Self { posts, comments }
    }

    /// Invalid submissions persist nothing; the caller redirects either way.
    pub async fn add_comment(
        &self,
        post_id: i64,
        author: &CurrentUser,
        input: &CommentFormInput,
    ) -> Result<CommentOutcome, CommentError> {
        let post = self
            .posts
            .find_by_id(post_id)
            .await?
            .ok_or(CommentError::PostNotFound)?;

        if !authorize(Actor { user_id: author.id }, Action::Comment(&post)).is_allowed() {
            let mut errors = FormErrors::default();
            errors.add_non_field("Commenting is not allowed.");
            return Ok(CommentOutcome::Rejected(errors));
        }

        let form = match validate_comment_form(input) {
            Ok(form) => form,
            Err(errors) => {
                debug!(
                    target = "quillfeed::application::comments",
                    post_id,
                    author_id = author.id,
                    "discarding invalid comment"
                );
                return Ok(CommentOutcome::Rejected(errors));
            }
        };

        let comment = self
            .comments
            .create_comment(CreateCommentParams {
                post_id: post.id,
                author_id: author.id,
                text: form.text,
            })
            .await?;

        info!(
            target = "quillfeed::application::comments",
            post_id,
            comment_id = comment.id,
            "comment added"
        );
        Ok(CommentOutcome::Created(comment))
    }
}
