//! Follow relations between readers and authors.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::application::auth::CurrentUser;
use crate::application::authz::{Access, Action, Actor, authorize};
use crate::application::repos::{FollowsRepo, RepoError, UsersRepo};
use crate::domain::entities::UserRecord;

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("unknown author")]
    UnknownAuthor,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowChange {
    Created,
    Unchanged,
    Removed,
    /// Self-follow attempts end here.
    Denied,
}

#[derive(Clone)]
pub struct FollowService {
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
}

impl FollowService {
    pub fn new(users: Arc<dyn UsersRepo>, follows: Arc<dyn FollowsRepo>) -> Self {
        Self { users, follows }
    }

    pub async fn follow(
        &self,
        follower: &CurrentUser,
        username: &str,
    ) -> Result<(UserRecord, FollowChange), FollowError> {
        let author = self.author(username).await?;
        let change = match authorize(Actor { user_id: follower.id }, Action::Follow(&author)) {
            Access::Deny => FollowChange::Denied,
            Access::Allow if self.follows.follow(follower.id, author.id).await? => {
                FollowChange::Created
            }
            Access::Allow => FollowChange::Unchanged,
        };
        debug!(
            target = "quillfeed::application::follows",
            follower_id = follower.id,
            author_id = author.id,
            ?change,
            "follow requested"
        );
        Ok((author, change))
    }

    pub async fn unfollow(
        &self,
        follower: &CurrentUser,
        username: &str,
    ) -> Result<(UserRecord, FollowChange), FollowError> {
        let author = self.author(username).await?;
        let change = match authorize(Actor { user_id: follower.id }, Action::Unfollow(&author)) {
            Access::Deny => FollowChange::Denied,
            Access::Allow if self.follows.unfollow(follower.id, author.id).await? => {
                FollowChange::Removed
            }
            Access::Allow => FollowChange::Unchanged,
        };
        debug!(
            target = "quillfeed::application::follows",
            follower_id = follower.id,
            author_id = author.id,
            ?change,
            "unfollow requested"
        );
        Ok((author, change))
    }

    async fn author(&self, username: &str) -> Result<UserRecord, FollowError> {
        self.users
            .find_by_username(username)
            .await?
            .ok_or(FollowError::UnknownAuthor)
    }
}
