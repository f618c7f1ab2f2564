//! Paginated post listings.

use std::sync::Arc;

use thiserror::Error;

use crate::application::auth::Viewer;
use crate::application::pagination::{Page, Paginator};
use crate::application::repos::{
    FollowsRepo, GroupsRepo, PostFilter, PostsRepo, RepoError, UsersRepo,
};
use crate::domain::entities::PostRecord;
use crate::presentation::views::{
    GroupContext, ListingContext, PaginatorView, PostCard, ProfileContext, profile_url,
};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("unknown group")]
    UnknownGroup,
    #[error("unknown author")]
    UnknownAuthor,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostsRepo>,
    groups: Arc<dyn GroupsRepo>,
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
    paginator: Paginator,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        groups: Arc<dyn GroupsRepo>,
        users: Arc<dyn UsersRepo>,
        follows: Arc<dyn FollowsRepo>,
        paginator: Paginator,
    ) -> Self {
        Self {
            posts,
            groups,
            users,
            follows,
            paginator,
        }
    }

    /// Count, clamp the requested page, then fetch exactly that window.
    pub async fn page(
        &self,
        filter: PostFilter,
        requested: Option<&str>,
    ) -> Result<Page<PostRecord>, FeedError> {
        let total = self.posts.count_posts(filter).await?;
        let window = self.paginator.resolve(total, requested);
        let items = self
            .posts
            .list_posts(filter, window.offset, window.limit)
            .await?;
        Ok(Page::new(items, window))
    }

    pub async fn index(&self, requested: Option<&str>) -> Result<ListingContext, FeedError> {
        let page = self.page(PostFilter::All, requested).await?;
        Ok(listing("Latest posts", page))
    }

    pub async fn group(
        &self,
        slug: &str,
        requested: Option<&str>,
    ) -> Result<GroupContext, FeedError> {
        let group = self
            .groups
            .find_by_slug(slug)
            .await?
            .ok_or(FeedError::UnknownGroup)?;
        let page = self.page(PostFilter::Group(group.id), requested).await?;
        Ok(GroupContext::new(&group, page))
    }

    pub async fn profile(
        &self,
        username: &str,
        viewer: &Viewer,
        requested: Option<&str>,
    ) -> Result<ProfileContext, FeedError> {
        let author = self
            .users
            .find_by_username(username)
            .await?
            .ok_or(FeedError::UnknownAuthor)?;
        let page = self.page(PostFilter::Author(author.id), requested).await?;

        let (following, show_follow_controls) = match viewer.user_id() {
            Some(viewer_id) if viewer_id != author.id => {
                (self.follows.is_following(viewer_id, author.id).await?, true)
            }
            _ => (false, false),
        };

        let base = profile_url(&author.username);
        Ok(ProfileContext {
            username: author.username,
            post_count: page.total,
            posts: page.items.iter().map(PostCard::from).collect(),
            paginator: PaginatorView::from_page(&page),
            following,
            show_follow_controls,
            follow_url: format!("{base}follow/"),
            unfollow_url: format!("{base}unfollow/"),
        })
    }

    pub async fn follow_feed(
        &self,
        viewer_id: i64,
        requested: Option<&str>,
    ) -> Result<ListingContext, FeedError> {
        let page = self
            .page(PostFilter::FollowedBy(viewer_id), requested)
            .await?;
        Ok(listing("Posts from authors you follow", page))
    }
}

fn listing(title: &str, page: Page<PostRecord>) -> ListingContext {
    ListingContext {
        title: title.to_string(),
        posts: page.items.iter().map(PostCard::from).collect(),
        paginator: PaginatorView::from_page(&page),
        total: page.total,
    }
}
