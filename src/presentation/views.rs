use crate::application::auth::Viewer;
use crate::application::error::{ErrorReport, HttpError};
use crate::application::forms::FormErrors;
use crate::application::pagination::Page;
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord};
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};

const DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[day] [month repr:short] [year] [hour]:[minute]");

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(viewer: &Viewer) -> Response {
    let view = LayoutContext::new(viewer, NotFoundView::default());
    let mut response = render_template_response(NotFoundTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

pub fn format_date(value: OffsetDateTime) -> String {
    value.format(DATE_FORMAT).unwrap_or_default()
}

pub fn profile_url(username: &str) -> String {
    format!("/profile/{username}/")
}

pub fn group_url(slug: &str) -> String {
    format!("/group/{slug}/")
}

pub fn post_url(id: i64) -> String {
    format!("/posts/{id}/")
}

pub fn media_url(stored_path: &str) -> String {
    format!("/media/{stored_path}")
}

/// Header state shared by every page.
#[derive(Clone, Debug, Default)]
pub struct ViewerView {
    pub is_authenticated: bool,
    pub username: String,
    pub profile_url: String,
}

impl From<&Viewer> for ViewerView {
    fn from(viewer: &Viewer) -> Self {
        match viewer.user() {
            Some(user) => Self {
                is_authenticated: true,
                username: user.username.clone(),
                profile_url: profile_url(&user.username),
            },
            None => Self::default(),
        }
    }
}

pub struct LayoutContext<T> {
    pub viewer: ViewerView,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(viewer: &Viewer, content: T) -> Self {
        Self {
            viewer: ViewerView::from(viewer),
            content,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PostCard {
    pub id: i64,
    pub text: String,
    pub author_username: String,
    pub author_url: String,
    pub published: String,
    pub has_group: bool,
    pub group_title: String,
    pub group_url: String,
    pub has_image: bool,
    pub image_url: String,
    pub detail_url: String,
}

impl From<&PostRecord> for PostCard {
    fn from(post: &PostRecord) -> Self {
        Self {
            id: post.id,
            text: post.text.clone(),
            author_username: post.author.username.clone(),
            author_url: profile_url(&post.author.username),
            published: format_date(post.pub_date),
            has_group: post.group.is_some(),
            group_title: post
                .group
                .as_ref()
                .map(|group| group.title.clone())
                .unwrap_or_default(),
            group_url: post
                .group
                .as_ref()
                .map(|group| group_url(&group.slug))
                .unwrap_or_default(),
            has_image: post.image.is_some(),
            image_url: post.image.as_deref().map(media_url).unwrap_or_default(),
            detail_url: post_url(post.id),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PageLink {
    pub number: u32,
    pub href: String,
    pub is_current: bool,
}

/// Links rendered under a paginated listing.
#[derive(Clone, Debug)]
pub struct PaginatorView {
    pub number: u32,
    pub num_pages: u32,
    pub is_paginated: bool,
    pub has_previous: bool,
    pub has_next: bool,
    pub first_href: String,
    pub previous_href: String,
    pub next_href: String,
    pub last_href: String,
    pub pages: Vec<PageLink>,
}

impl PaginatorView {
    /// Page links are limited to a window of two pages around the current one.
    pub fn from_page<T>(page: &Page<T>) -> Self {
        let href = |number: u32| format!("?page={number}");
        let low = page.number.saturating_sub(2).max(1);
        let high = (page.number + 2).min(page.num_pages);
        Self {
            number: page.number,
            num_pages: page.num_pages,
            is_paginated: page.num_pages > 1,
            has_previous: page.has_previous,
            has_next: page.has_next,
            first_href: href(1),
            previous_href: page.previous_number.map(href).unwrap_or_default(),
            next_href: page.next_number.map(href).unwrap_or_default(),
            last_href: href(page.num_pages),
            pages: (low..=high)
                .map(|number| PageLink {
                    number,
                    href: href(number),
                    is_current: number == page.number,
                })
                .collect(),
        }
    }
}

/// Posts of the main feed or of the follow feed.
pub struct ListingContext {
    pub title: String,
    pub posts: Vec<PostCard>,
    pub paginator: PaginatorView,
    pub total: u64,
}

pub struct GroupContext {
    pub title: String,
    pub description: String,
    pub posts: Vec<PostCard>,
    pub paginator: PaginatorView,
}

impl GroupContext {
    pub fn new(group: &GroupRecord, page: Page<PostRecord>) -> Self {
        let paginator = PaginatorView::from_page(&page);
        Self {
            title: group.title.clone(),
            description: group.description.clone(),
            posts: page.items.iter().map(PostCard::from).collect(),
            paginator,
        }
    }
}

pub struct ProfileContext {
    pub username: String,
    pub post_count: u64,
    pub posts: Vec<PostCard>,
    pub paginator: PaginatorView,
    pub following: bool,
    pub show_follow_controls: bool,
    pub follow_url: String,
    pub unfollow_url: String,
}

pub struct CommentView {
    pub author_username: String,
    pub author_url: String,
    pub text: String,
    pub created: String,
}

impl From<&CommentRecord> for CommentView {
    fn from(comment: &CommentRecord) -> Self {
        Self {
            author_username: comment.author.username.clone(),
            author_url: profile_url(&comment.author.username),
            text: comment.text.clone(),
            created: format_date(comment.created),
        }
    }
}

pub struct PostDetailContext {
    pub title: String,
    pub post: PostCard,
    pub author_post_count: u64,
    pub can_edit: bool,
    pub edit_url: String,
    pub comments: Vec<CommentView>,
    pub show_comment_form: bool,
    pub comment_url: String,
}

#[derive(Clone, Debug)]
pub struct GroupOption {
    pub id: i64,
    pub title: String,
    pub selected: bool,
}

/// Values and errors of the create/edit form.
#[derive(Debug)]
pub struct PostFormContext {
    pub is_edit: bool,
    pub action_url: String,
    pub text: String,
    pub groups: Vec<GroupOption>,
    pub no_group_selected: bool,
    pub has_current_image: bool,
    pub current_image_url: String,
    pub text_errors: Vec<String>,
    pub group_errors: Vec<String>,
    pub image_errors: Vec<String>,
}

impl PostFormContext {
    pub fn create(groups: &[GroupRecord]) -> Self {
        Self::build(false, "/create/".to_string(), "", None, groups, None)
    }

    pub fn edit(post: &PostRecord, groups: &[GroupRecord]) -> Self {
        Self::build(
            true,
            format!("/posts/{}/edit/", post.id),
            &post.text,
            post.group_id(),
            groups,
            post.image.as_deref(),
        )
    }

    /// Re-render submitted values alongside their errors.
    pub fn with_submission(
        mut self,
        text: &str,
        group: Option<&str>,
        groups: &[GroupRecord],
        errors: &FormErrors,
    ) -> Self {
        let selected = group.and_then(|raw| raw.trim().parse::<i64>().ok());
        self.text = text.to_string();
        self.groups = group_options(groups, selected);
        self.no_group_selected = !self.groups.iter().any(|option| option.selected);
        self.text_errors = errors.field("text").to_vec();
        self.group_errors = errors.field("group").to_vec();
        self.image_errors = errors.field("image").to_vec();
        self
    }

    fn build(
        is_edit: bool,
        action_url: String,
        text: &str,
        selected: Option<i64>,
        groups: &[GroupRecord],
        image: Option<&str>,
    ) -> Self {
        let groups = group_options(groups, selected);
        let no_group_selected = !groups.iter().any(|option| option.selected);
        Self {
            is_edit,
            action_url,
            text: text.to_string(),
            groups,
            no_group_selected,
            has_current_image: image.is_some(),
            current_image_url: image.map(media_url).unwrap_or_default(),
            text_errors: Vec::new(),
            group_errors: Vec::new(),
            image_errors: Vec::new(),
        }
    }
}

fn group_options(groups: &[GroupRecord], selected: Option<i64>) -> Vec<GroupOption> {
    groups
        .iter()
        .map(|group| GroupOption {
            id: group.id,
            title: group.title.clone(),
            selected: Some(group.id) == selected,
        })
        .collect()
}

pub struct LoginContext {
    pub username: String,
    pub next: String,
    pub username_errors: Vec<String>,
    pub password_errors: Vec<String>,
    pub non_field_errors: Vec<String>,
}

impl LoginContext {
    pub fn new(username: &str, next: &str, errors: &FormErrors) -> Self {
        Self {
            username: username.to_string(),
            next: next.to_string(),
            username_errors: errors.field("username").to_vec(),
            password_errors: errors.field("password").to_vec(),
            non_field_errors: errors.non_field().to_vec(),
        }
    }
}

pub struct SignupContext {
    pub username: String,
    pub email: String,
    pub username_errors: Vec<String>,
    pub email_errors: Vec<String>,
    pub password1_errors: Vec<String>,
    pub password2_errors: Vec<String>,
}

impl SignupContext {
    pub fn new(username: &str, email: &str, errors: &FormErrors) -> Self {
        Self {
            username: username.to_string(),
            email: email.to_string(),
            username_errors: errors.field("username").to_vec(),
            email_errors: errors.field("email").to_vec(),
            password1_errors: errors.field("password1").to_vec(),
            password2_errors: errors.field("password2").to_vec(),
        }
    }
}

pub struct NotFoundView {
    pub title: String,
    pub message: String,
}

impl Default for NotFoundView {
    fn default() -> Self {
        Self {
            title: "Page not found".to_string(),
            message: "The page you requested does not exist.".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "posts/index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<ListingContext>,
}

#[derive(Template)]
#[template(path = "posts/follow.html")]
pub struct FollowTemplate {
    pub view: LayoutContext<ListingContext>,
}

#[derive(Template)]
#[template(path = "posts/group_list.html")]
pub struct GroupTemplate {
    pub view: LayoutContext<GroupContext>,
}

#[derive(Template)]
#[template(path = "posts/profile.html")]
pub struct ProfileTemplate {
    pub view: LayoutContext<ProfileContext>,
}

#[derive(Template)]
#[template(path = "posts/post_detail.html")]
pub struct PostDetailTemplate {
    pub view: LayoutContext<PostDetailContext>,
}

#[derive(Template)]
#[template(path = "posts/create_post.html")]
pub struct PostFormTemplate {
    pub view: LayoutContext<PostFormContext>,
}

#[derive(Template)]
#[template(path = "users/login.html")]
pub struct LoginTemplate {
    pub view: LayoutContext<LoginContext>,
}

#[derive(Template)]
#[template(path = "users/signup.html")]
pub struct SignupTemplate {
    pub view: LayoutContext<SignupContext>,
}

#[derive(Template)]
#[template(path = "core/404.html")]
pub struct NotFoundTemplate {
    pub view: LayoutContext<NotFoundView>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::auth::CurrentUser;
    use crate::application::pagination::Paginator;
    use crate::domain::entities::{AuthorRef, GroupRef};

    fn post() -> PostRecord {
        PostRecord {
            id: 3,
            author: AuthorRef {
                id: 1,
                username: "auth".into(),
            },
            group: Some(GroupRef {
                id: 2,
                slug: "test-slug".into(),
                title: "Тестовая группа".into(),
            }),
            text: "Тестовый текст <b>".into(),
            image: Some("posts/abc-small.gif".into()),
            pub_date: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn post_card_links() {
        let card = PostCard::from(&post());
        assert_eq!(card.author_url, "/profile/auth/");
        assert_eq!(card.detail_url, "/posts/3/");
        assert_eq!(card.image_url, "/media/posts/abc-small.gif");
        assert!(card.has_group);
        assert_eq!(card.group_url, "/group/test-slug/");
        assert_eq!(card.published, "01 Jan 1970 00:00");
    }

    #[test]
    fn paginator_view_windows_links() {
        let window = Paginator::default().resolve(95, Some("5"));
        let page = Page::new(Vec::<u8>::new(), window);
        let view = PaginatorView::from_page(&page);
        let numbers: Vec<u32> = view.pages.iter().map(|link| link.number).collect();
        assert_eq!(numbers, vec![3, 4, 5, 6, 7]);
        assert_eq!(view.previous_href, "?page=4");
        assert_eq!(view.last_href, "?page=10");
        assert!(view.is_paginated);
    }

    #[test]
    fn edit_form_preselects_group() {
        let groups = vec![GroupRecord {
            id: 2,
            title: "Тестовая группа".into(),
            slug: "test-slug".into(),
            description: String::new(),
        }];
        let context = PostFormContext::edit(&post(), &groups);
        assert!(context.is_edit);
        assert_eq!(context.action_url, "/posts/3/edit/");
        assert!(context.groups[0].selected);
        assert!(!context.no_group_selected);
    }

    #[test]
    fn index_template_escapes_post_text() {
        let page = Page::new(vec![post()], Paginator::default().resolve(1, None));
        let content = ListingContext {
            title: "Latest posts".into(),
            posts: page.items.iter().map(PostCard::from).collect(),
            paginator: PaginatorView::from_page(&page),
            total: 1,
        };
        let viewer = Viewer::Authenticated(CurrentUser {
            id: 1,
            username: "auth".into(),
        });
        let html = render_template(IndexTemplate {
            view: LayoutContext::new(&viewer, content),
        })
        .expect("render");
        assert!(html.0.contains("Тестовый текст &#60;b&#62;") || html.0.contains("&lt;b&gt;"));
        assert!(html.0.contains("/profile/auth/"));
        assert!(html.0.contains("/auth/logout/"));
    }

    #[test]
    fn not_found_response_uses_template() {
        let response = render_not_found_response(&Viewer::Anonymous);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.extensions().get::<ErrorReport>().is_some());
    }
}
