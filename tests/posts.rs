mod support;

use axum::http::StatusCode;
use quillfeed::domain::entities::PostRecord;
use support::{MultipartForm, SMALL_GIF, TestApp, body_text, location};

#[tokio::test]
async fn anonymous_create_redirects_to_login_and_stores_nothing() {
    let app = TestApp::without_cache();

    let form = app.get("/create/", None).await;
    assert_eq!(form.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&form).as_deref(),
        Some("/auth/login/?next=%2Fcreate%2F")
    );

    let submit = app
        .post_multipart(
            "/create/",
            None,
            MultipartForm::default().text("text", "sneaky post"),
        )
        .await;
    assert_eq!(submit.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&submit).as_deref(),
        Some("/auth/login/?next=%2Fcreate%2F")
    );
    assert_eq!(app.store.post_count(), 0);
}

#[tokio::test]
async fn create_form_renders_for_signed_in_user() {
    let app = TestApp::without_cache();
    let cookie = app.sign_up("author").await;
    app.store.insert_group("Cats", "cats");

    let response = app.get("/create/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("New post"));
    assert!(html.contains("Cats"));
}

#[tokio::test]
async fn valid_create_persists_post_and_redirects_to_profile() {
    let app = TestApp::without_cache();
    let cookie = app.sign_up("author").await;
    let group = app.store.insert_group("Cats", "cats");

    let response = app
        .post_multipart(
            "/create/",
            Some(&cookie),
            MultipartForm::default()
                .text("text", "Fresh post about cats")
                .text("group", &group.id.to_string())
                .file("image", "small.gif", "image/gif", SMALL_GIF),
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response).as_deref(), Some("/profile/author/"));
    assert_eq!(app.store.post_count(), 1);

    let post = app.store.latest_post().expect("post stored");
    assert_eq!(post.text, "Fresh post about cats");
    assert_eq!(post.author.username, "author");
    assert_eq!(post.group_id(), Some(group.id));
    let image = post.image.expect("image stored");
    assert!(image.ends_with(".gif"));

    let media = app.get(&format!("/media/{image}"), None).await;
    assert_eq!(media.status(), StatusCode::OK);
}

#[tokio::test]
async fn create_without_group_or_image_is_accepted() {
    let app = TestApp::without_cache();
    let cookie = app.sign_up("author").await;

    let response = app
        .post_multipart(
            "/create/",
            Some(&cookie),
            MultipartForm::default()
                .text("text", "Just words")
                .text("group", "")
                .file("image", "", "application/octet-stream", b""),
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let post = app.store.latest_post().expect("post stored");
    assert_eq!(post.group, None);
    assert_eq!(post.image, None);
}

#[tokio::test]
async fn invalid_create_rerenders_form_with_errors() {
    let app = TestApp::without_cache();
    let cookie = app.sign_up("author").await;

    let blank = app
        .post_multipart(
            "/create/",
            Some(&cookie),
            MultipartForm::default().text("text", "   "),
        )
        .await;
    assert_eq!(blank.status(), StatusCode::OK);
    assert!(body_text(blank).await.contains("class=\"errors\""));

    let bad_group = app
        .post_multipart(
            "/create/",
            Some(&cookie),
            MultipartForm::default()
                .text("text", "hello")
                .text("group", "9999"),
        )
        .await;
    assert_eq!(bad_group.status(), StatusCode::OK);
    assert!(body_text(bad_group).await.contains("Select a valid choice."));

    let not_an_image = app
        .post_multipart(
            "/create/",
            Some(&cookie),
            MultipartForm::default().text("text", "hello").file(
                "image",
                "notes.txt",
                "text/plain",
                b"plain text is not a picture",
            ),
        )
        .await;
    assert_eq!(not_an_image.status(), StatusCode::OK);
    assert!(body_text(not_an_image).await.contains("Upload a valid image."));

    assert_eq!(app.store.post_count(), 0);
}

#[tokio::test]
async fn author_edit_updates_text_and_group() {
    let app = TestApp::without_cache();
    let cookie = app.sign_up("author").await;
    let author_id = app.store.user_id("author");
    let group = app.store.insert_group("Dogs", "dogs");
    let post_id = app.store.insert_post(author_id, None, "first draft");
    let published = app.store.post(post_id).expect("post").pub_date;

    let form = app
        .get(&format!("/posts/{post_id}/edit/"), Some(&cookie))
        .await;
    assert_eq!(form.status(), StatusCode::OK);
    assert!(body_text(form).await.contains("first draft"));

    let response = app
        .post_multipart(
            &format!("/posts/{post_id}/edit/"),
            Some(&cookie),
            MultipartForm::default()
                .text("text", "second draft")
                .text("group", &group.id.to_string()),
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response).as_deref(),
        Some(format!("/posts/{post_id}/").as_str())
    );

    let post = app.store.post(post_id).expect("post");
    assert_eq!(post.text, "second draft");
    assert_eq!(post.group_id(), Some(group.id));
    assert_eq!(post.pub_date, published);
    assert_eq!(app.store.post_count(), 1);
}

#[tokio::test]
async fn non_author_edit_is_redirected_and_changes_nothing() {
    let app = TestApp::without_cache();
    let owner = app.sign_up("owner").await;
    let cats = app.store.insert_group("Cats", "cats");
    let dogs = app.store.insert_group("Dogs", "dogs");
    let original = publish_with_image(&app, &owner, cats.id, "owner's words").await;
    let original_image = original.image.clone().expect("image stored");
    let files_before = app.stored_files();
    let intruder = app.sign_up("intruder").await;

    let form = app
        .get(&format!("/posts/{}/edit/", original.id), Some(&intruder))
        .await;
    assert_eq!(form.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&form).as_deref(),
        Some(format!("/posts/{}/", original.id).as_str())
    );

    let response = app
        .post_multipart(
            &format!("/posts/{}/edit/", original.id),
            Some(&intruder),
            MultipartForm::default()
                .text("text", "defaced")
                .text("group", &dogs.id.to_string())
                .file("image", "graffiti.gif", "image/gif", SMALL_GIF),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response).as_deref(),
        Some(format!("/posts/{}/", original.id).as_str())
    );

    let post = app.store.post(original.id).expect("post");
    assert_eq!(post.text, "owner's words");
    assert_eq!(post.author.username, "owner");
    assert_eq!(post.group_id(), Some(cats.id));
    assert_eq!(post.image.as_deref(), Some(original_image.as_str()));
    assert_eq!(app.stored_files(), files_before);
    assert!(app.uploads_root().join(&original_image).is_file());
}

#[tokio::test]
async fn author_edit_with_new_upload_replaces_image_file() {
    let app = TestApp::without_cache();
    let cookie = app.sign_up("author").await;
    let cats = app.store.insert_group("Cats", "cats");
    let original = publish_with_image(&app, &cookie, cats.id, "with a picture").await;
    let old_image = original.image.clone().expect("image stored");

    let response = app
        .post_multipart(
            &format!("/posts/{}/edit/", original.id),
            Some(&cookie),
            MultipartForm::default()
                .text("text", "with a better picture")
                .text("group", &cats.id.to_string())
                .file("image", "better.gif", "image/gif", SMALL_GIF),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let post = app.store.post(original.id).expect("post");
    let new_image = post.image.expect("image replaced");
    assert_ne!(new_image, old_image);
    assert!(new_image.ends_with("-better.gif"));
    assert!(!app.uploads_root().join(&old_image).exists());
    assert!(app.uploads_root().join(&new_image).is_file());
    assert_eq!(app.stored_files(), vec![new_image.clone()]);

    let media = app.get(&format!("/media/{new_image}"), None).await;
    assert_eq!(media.status(), StatusCode::OK);
    let stale = app.get(&format!("/media/{old_image}"), None).await;
    assert_eq!(stale.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn author_edit_with_clear_removes_image_file() {
    let app = TestApp::without_cache();
    let cookie = app.sign_up("author").await;
    let cats = app.store.insert_group("Cats", "cats");
    let original = publish_with_image(&app, &cookie, cats.id, "picture to drop").await;
    let old_image = original.image.clone().expect("image stored");

    let response = app
        .post_multipart(
            &format!("/posts/{}/edit/", original.id),
            Some(&cookie),
            MultipartForm::default()
                .text("text", "words only now")
                .text("group", &cats.id.to_string())
                .text("image-clear", "on"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let post = app.store.post(original.id).expect("post");
    assert_eq!(post.text, "words only now");
    assert_eq!(post.image, None);
    assert!(!app.uploads_root().join(&old_image).exists());
    assert!(app.stored_files().is_empty());
}

#[tokio::test]
async fn author_edit_without_upload_keeps_image_file() {
    let app = TestApp::without_cache();
    let cookie = app.sign_up("author").await;
    let cats = app.store.insert_group("Cats", "cats");
    let original = publish_with_image(&app, &cookie, cats.id, "keep the picture").await;
    let image = original.image.clone().expect("image stored");

    let response = app
        .post_multipart(
            &format!("/posts/{}/edit/", original.id),
            Some(&cookie),
            MultipartForm::default()
                .text("text", "new caption, same picture")
                .text("group", &cats.id.to_string())
                .file("image", "", "application/octet-stream", b""),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let post = app.store.post(original.id).expect("post");
    assert_eq!(post.text, "new caption, same picture");
    assert_eq!(post.image.as_deref(), Some(image.as_str()));
    assert_eq!(app.stored_files(), vec![image.clone()]);
}

#[tokio::test]
async fn upload_together_with_clear_is_rejected() {
    let app = TestApp::without_cache();
    let cookie = app.sign_up("author").await;
    let cats = app.store.insert_group("Cats", "cats");
    let original = publish_with_image(&app, &cookie, cats.id, "ambiguous edit").await;
    let image = original.image.clone().expect("image stored");

    let response = app
        .post_multipart(
            &format!("/posts/{}/edit/", original.id),
            Some(&cookie),
            MultipartForm::default()
                .text("text", "which one?")
                .text("group", &cats.id.to_string())
                .text("image-clear", "on")
                .file("image", "other.gif", "image/gif", SMALL_GIF),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        body_text(response)
            .await
            .contains("Please either submit a file or check the clear checkbox, not both.")
    );

    let post = app.store.post(original.id).expect("post");
    assert_eq!(post.text, "ambiguous edit");
    assert_eq!(post.image.as_deref(), Some(image.as_str()));
    assert_eq!(app.stored_files(), vec![image.clone()]);
}

#[tokio::test]
async fn anonymous_edit_redirects_to_login() {
    let app = TestApp::without_cache();
    let owner_id = app.store.insert_author("owner");
    let post_id = app.store.insert_post(owner_id, None, "unchanged");

    let response = app
        .post_multipart(
            &format!("/posts/{post_id}/edit/"),
            None,
            MultipartForm::default().text("text", "changed"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let target = location(&response).expect("redirect");
    assert!(target.starts_with("/auth/login/?next="));
    assert_eq!(app.store.post(post_id).expect("post").text, "unchanged");
}

#[tokio::test]
async fn editing_missing_post_is_not_found() {
    let app = TestApp::without_cache();
    let cookie = app.sign_up("author").await;

    let response = app.get("/posts/9999/edit/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_post_ids_are_not_found() {
    let app = TestApp::without_cache();
    let cookie = app.sign_up("author").await;

    for uri in [
        "/posts/abc/edit/",
        "/posts/99999999999999999999/edit/",
        "/posts/-1/edit/",
    ] {
        let response = app.get(uri, Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        assert!(body_text(response).await.contains("Page not found"), "{uri}");
    }

    let submit = app
        .post_multipart(
            "/posts/abc/edit/",
            Some(&cookie),
            MultipartForm::default().text("text", "nowhere"),
        )
        .await;
    assert_eq!(submit.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.store.post_count(), 0);
}

/// Publish through the create form so the image lands in the uploads root.
async fn publish_with_image(app: &TestApp, cookie: &str, group_id: i64, text: &str) -> PostRecord {
    let response = app
        .post_multipart(
            "/create/",
            Some(cookie),
            MultipartForm::default()
                .text("text", text)
                .text("group", &group_id.to_string())
                .file("image", "small.gif", "image/gif", SMALL_GIF),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER, "create redirects");
    let post = app.store.latest_post().expect("post stored");
    let image = post.image.as_deref().expect("image stored");
    assert!(app.uploads_root().join(image).is_file());
    post
}
