//! Shared fixtures: an in-memory store implementing every repository and a
//! router wired exactly like the server, minus Postgres.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{
        Request, StatusCode,
        header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
    },
    response::Response,
};
use quillfeed::{
    application::{
        auth::AuthService,
        comments::CommentService,
        feed::FeedService,
        follows::FollowService,
        pagination::Paginator,
        posts::PostService,
        repos::{
            CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams,
            CreateUserParams, FollowsRepo, GroupsRepo, HealthRepo, PostFilter, PostsRepo,
            PostsWriteRepo, RepoError, SessionsRepo, UpdatePostParams, UsersRepo,
        },
    },
    cache::{CacheConfig, CacheState, INDEX_PAGE_PREFIX},
    domain::entities::{
        AuthorRef, CommentRecord, GroupRecord, GroupRef, PostRecord, SessionRecord, UserRecord,
    },
    infra::{
        http::{HttpState, SessionCookie, build_router},
        uploads::UploadStorage,
    },
};
use tempfile::TempDir;
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;

pub const PASSWORD: &str = "correct-horse-42";
pub const COOKIE_NAME: &str = "quillfeed_session";

/// 1x1 transparent GIF.
pub const SMALL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x21, 0xf9, 0x04,
    0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02,
    0x01, 0x00, 0x00,
];

#[derive(Default)]
struct StoreState {
    next_id: i64,
    users: Vec<UserRecord>,
    sessions: HashMap<String, SessionRecord>,
    groups: Vec<GroupRecord>,
    posts: Vec<StoredPost>,
    comments: Vec<CommentRecord>,
    follows: BTreeSet<(i64, i64)>,
}

impl StoreState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn username(&self, id: i64) -> Result<String, RepoError> {
        self.users
            .iter()
            .find(|user| user.id == id)
            .map(|user| user.username.clone())
            .ok_or_else(|| RepoError::InvalidInput {
                message: format!("unknown user {id}"),
            })
    }

    fn hydrate(&self, post: &StoredPost) -> PostRecord {
        let author = AuthorRef {
            id: post.author_id,
            username: self.username(post.author_id).unwrap_or_default(),
        };
        let group = post.group_id.and_then(|id| {
            self.groups
                .iter()
                .find(|group| group.id == id)
                .map(GroupRef::from)
        });
        PostRecord {
            id: post.id,
            author,
            group,
            text: post.text.clone(),
            image: post.image.clone(),
            pub_date: post.pub_date,
        }
    }

    fn matches(&self, post: &StoredPost, filter: PostFilter) -> bool {
        match filter {
            PostFilter::All => true,
            PostFilter::Group(id) => post.group_id == Some(id),
            PostFilter::Author(id) => post.author_id == id,
            PostFilter::FollowedBy(user_id) => self.follows.contains(&(user_id, post.author_id)),
        }
    }
}

#[derive(Clone)]
struct StoredPost {
    id: i64,
    author_id: i64,
    group_id: Option<i64>,
    text: String,
    image: Option<String>,
    pub_date: OffsetDateTime,
}

/// Repository double backed by a mutex-guarded state.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    fn with_state<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        let mut guard = self.state.lock().expect("store lock");
        f(&mut guard)
    }

    pub fn post_count(&self) -> usize {
        self.with_state(|state| state.posts.len())
    }

    pub fn follow_count(&self) -> usize {
        self.with_state(|state| state.follows.len())
    }

    pub fn comment_count(&self) -> usize {
        self.with_state(|state| state.comments.len())
    }

    pub fn comments_for(&self, post_id: i64) -> Vec<CommentRecord> {
        self.with_state(|state| {
            state
                .comments
                .iter()
                .filter(|comment| comment.post_id == post_id)
                .cloned()
                .collect()
        })
    }

    pub fn post(&self, id: i64) -> Option<PostRecord> {
        self.with_state(|state| {
            state
                .posts
                .iter()
                .find(|post| post.id == id)
                .map(|post| state.hydrate(post))
        })
    }

    pub fn latest_post(&self) -> Option<PostRecord> {
        self.with_state(|state| state.posts.last().map(|post| state.hydrate(post)))
    }

    pub fn user_id(&self, username: &str) -> i64 {
        self.with_state(|state| {
            state
                .users
                .iter()
                .find(|user| user.username == username)
                .map(|user| user.id)
                .expect("known user")
        })
    }

    pub fn insert_group(&self, title: &str, slug: &str) -> GroupRecord {
        self.with_state(|state| {
            let group = GroupRecord {
                id: state.next_id(),
                title: title.to_string(),
                slug: slug.to_string(),
                description: format!("About {title}"),
            };
            state.groups.push(group.clone());
            group
        })
    }

    /// Insert a user without a usable password; enough for authoring fixtures.
    pub fn insert_author(&self, username: &str) -> i64 {
        self.with_state(|state| {
            let id = state.next_id();
            state.users.push(UserRecord {
                id,
                username: username.to_string(),
                email: None,
                password_hash: "!".to_string(),
                created_at: OffsetDateTime::now_utc(),
            });
            id
        })
    }

    /// Posts get strictly increasing publication times in insertion order.
    pub fn insert_post(&self, author_id: i64, group_id: Option<i64>, text: &str) -> i64 {
        self.with_state(|state| {
            let id = state.next_id();
            let pub_date = OffsetDateTime::UNIX_EPOCH + Duration::seconds(id);
            state.posts.push(StoredPost {
                id,
                author_id,
                group_id,
                text: text.to_string(),
                image: None,
                pub_date,
            });
            id
        })
    }

    pub fn remove_post(&self, id: i64) {
        self.with_state(|state| state.posts.retain(|post| post.id != id));
    }
}

#[async_trait]
impl UsersRepo for MemoryStore {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        self.with_state(|state| {
            if state
                .users
                .iter()
                .any(|user| user.username == params.username)
            {
                return Err(RepoError::Duplicate {
                    constraint: "users_username_key".into(),
                });
            }
            let user = UserRecord {
                id: state.next_id(),
                username: params.username,
                email: params.email,
                password_hash: params.password_hash,
                created_at: OffsetDateTime::now_utc(),
            };
            state.users.push(user.clone());
            Ok(user)
        })
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.with_state(|state| state.users.iter().find(|user| user.id == id).cloned()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.with_state(|state| {
            state
                .users
                .iter()
                .find(|user| user.username == username)
                .cloned()
        }))
    }
}

#[async_trait]
impl SessionsRepo for MemoryStore {
    async fn create_session(&self, session: SessionRecord) -> Result<(), RepoError> {
        self.with_state(|state| {
            state.sessions.insert(session.token_hash.clone(), session);
        });
        Ok(())
    }

    async fn find_session(&self, token_hash: &str) -> Result<Option<SessionRecord>, RepoError> {
        Ok(self.with_state(|state| state.sessions.get(token_hash).cloned()))
    }

    async fn delete_session(&self, token_hash: &str) -> Result<(), RepoError> {
        self.with_state(|state| {
            state.sessions.remove(token_hash);
        });
        Ok(())
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        Ok(self.with_state(|state| {
            let before = state.sessions.len();
            state.sessions.retain(|_, session| session.is_live_at(now));
            (before - state.sessions.len()) as u64
        }))
    }
}

#[async_trait]
impl GroupsRepo for MemoryStore {
    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        self.with_state(|state| {
            if state.groups.iter().any(|group| group.slug == params.slug) {
                return Err(RepoError::Duplicate {
                    constraint: "groups_slug_key".into(),
                });
            }
            let group = GroupRecord {
                id: state.next_id(),
                title: params.title,
                slug: params.slug,
                description: params.description,
            };
            state.groups.push(group.clone());
            Ok(group)
        })
    }

    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError> {
        Ok(self.with_state(|state| state.groups.clone()))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<GroupRecord>, RepoError> {
        Ok(self.with_state(|state| state.groups.iter().find(|group| group.id == id).cloned()))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        Ok(self.with_state(|state| {
            state
                .groups
                .iter()
                .find(|group| group.slug == slug)
                .cloned()
        }))
    }
}

#[async_trait]
impl PostsRepo for MemoryStore {
    async fn count_posts(&self, filter: PostFilter) -> Result<u64, RepoError> {
        Ok(self.with_state(|state| {
            state
                .posts
                .iter()
                .filter(|post| state.matches(post, filter))
                .count() as u64
        }))
    }

    async fn list_posts(
        &self,
        filter: PostFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<PostRecord>, RepoError> {
        Ok(self.with_state(|state| {
            let mut posts: Vec<&StoredPost> = state
                .posts
                .iter()
                .filter(|post| state.matches(post, filter))
                .collect();
            posts.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
            posts
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .map(|post| state.hydrate(post))
                .collect()
        }))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        Ok(self.post(id))
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryStore {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        self.with_state(|state| {
            state.username(params.author_id)?;
            let id = state.next_id();
            let post = StoredPost {
                id,
                author_id: params.author_id,
                group_id: params.group_id,
                text: params.text,
                image: params.image,
                pub_date: OffsetDateTime::now_utc(),
            };
            state.posts.push(post.clone());
            Ok(state.hydrate(&post))
        })
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        self.with_state(|state| {
            let post = state
                .posts
                .iter_mut()
                .find(|post| post.id == params.id)
                .ok_or(RepoError::NotFound)?;
            post.group_id = params.group_id;
            post.text = params.text;
            post.image = params.image;
            let post = post.clone();
            Ok(state.hydrate(&post))
        })
    }

    async fn delete_post(&self, id: i64) -> Result<(), RepoError> {
        self.with_state(|state| {
            let before = state.posts.len();
            state.posts.retain(|post| post.id != id);
            if state.posts.len() == before {
                Err(RepoError::NotFound)
            } else {
                state.comments.retain(|comment| comment.post_id != id);
                Ok(())
            }
        })
    }
}

#[async_trait]
impl CommentsRepo for MemoryStore {
    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        self.with_state(|state| {
            let username = state.username(params.author_id)?;
            let comment = CommentRecord {
                id: state.next_id(),
                post_id: params.post_id,
                author: AuthorRef {
                    id: params.author_id,
                    username,
                },
                text: params.text,
                created: OffsetDateTime::now_utc(),
            };
            state.comments.push(comment.clone());
            Ok(comment)
        })
    }

    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentRecord>, RepoError> {
        Ok(self.comments_for(post_id))
    }
}

#[async_trait]
impl FollowsRepo for MemoryStore {
    async fn follow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        Ok(self.with_state(|state| state.follows.insert((user_id, author_id))))
    }

    async fn unfollow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        Ok(self.with_state(|state| state.follows.remove(&(user_id, author_id))))
    }

    async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        Ok(self.with_state(|state| state.follows.contains(&(user_id, author_id))))
    }
}

#[async_trait]
impl HealthRepo for MemoryStore {
    async fn ping(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub cache: CacheState,
    _uploads: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_cache(CacheConfig::default())
    }

    pub fn without_cache() -> Self {
        Self::with_cache(CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        })
    }

    pub fn with_cache(cache_config: CacheConfig) -> Self {
        let store = Arc::new(MemoryStore::default());
        let uploads = TempDir::new().expect("temp uploads dir");
        let upload_storage =
            Arc::new(UploadStorage::new(uploads.path().to_path_buf()).expect("upload storage"));
        let max_request_bytes = 1024 * 1024;

        let feed = Arc::new(FeedService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            Paginator::default(),
        ));
        let posts = Arc::new(PostService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            upload_storage.clone(),
            max_request_bytes,
        ));
        let comments = Arc::new(CommentService::new(store.clone(), store.clone()));
        let follows = Arc::new(FollowService::new(store.clone(), store.clone()));
        let auth = Arc::new(AuthService::new(
            store.clone(),
            store.clone(),
            Duration::hours(1),
        ));
        let cache = CacheState::new(cache_config, INDEX_PAGE_PREFIX);

        let state = HttpState {
            feed,
            posts,
            comments,
            follows,
            auth,
            health: store.clone(),
            upload_storage,
            cache: cache.clone(),
            session_cookie: SessionCookie::new(COOKIE_NAME, false),
            max_request_bytes,
        };

        Self {
            router: build_router(state),
            store,
            cache,
            _uploads: uploads,
        }
    }

    pub fn uploads_root(&self) -> &Path {
        self._uploads.path()
    }

    /// Every file under the uploads root, as sorted paths relative to it.
    pub fn stored_files(&self) -> Vec<String> {
        fn walk(root: &Path, dir: &Path, found: &mut Vec<String>) {
            let Ok(entries) = std::fs::read_dir(dir) else {
                return;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    walk(root, &path, found);
                } else if let Ok(relative) = path.strip_prefix(root) {
                    found.push(relative.to_string_lossy().replace('\\', "/"));
                }
            }
        }

        let mut found = Vec::new();
        walk(self.uploads_root(), self.uploads_root(), &mut found);
        found.sort();
        found
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).expect("request"))
            .await
    }

    pub async fn post_form(&self, uri: &str, cookie: Option<&str>, body: &str) -> Response {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).expect("request"))
            .await
    }

    pub async fn post_multipart(
        &self,
        uri: &str,
        cookie: Option<&str>,
        form: MultipartForm,
    ) -> Response {
        let (content_type, body) = form.finish();
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, content_type);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body)).expect("request"))
            .await
    }

    /// Create an account through the signup form and return its session cookie.
    pub async fn sign_up(&self, username: &str) -> String {
        let body = format!("username={username}&email=&password1={PASSWORD}&password2={PASSWORD}");
        let response = self.post_form("/auth/signup/", None, &body).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "signup redirects");
        session_cookie(&response).expect("signup sets a session cookie")
    }
}

/// `name=value` pair of the session cookie set by a response.
pub fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with(&format!("{COOKIE_NAME}=")))
        .and_then(|value| value.split(';').next())
        .map(str::to_string)
}

pub fn location(response: &Response) -> Option<String> {
    response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

pub async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

pub fn count_cards(html: &str) -> usize {
    html.matches("class=\"post-card\"").count()
}

/// Minimal `multipart/form-data` encoder.
pub struct MultipartForm {
    boundary: &'static str,
    body: Vec<u8>,
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self {
            boundary: "quillfeed-test-boundary",
            body: Vec::new(),
        }
    }
}

impl MultipartForm {
    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn finish(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (
            format!("multipart/form-data; boundary={}", self.boundary),
            self.body,
        )
    }
}
