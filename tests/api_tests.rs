mod common;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use common::{spawn_app, spawn_app_with_store, Part, PASSWORD, PNG};
use meme_marketplace::{domain::DocumentStore, errors::RepoError, memory::InMemoryDocumentStore};
use serde_json::{json, Value};
use std::{collections::HashSet, sync::Arc};

/// In-memory store whose `users` collection rejects new documents.
struct UsersUnavailable(InMemoryDocumentStore);

#[async_trait]
impl DocumentStore for UsersUnavailable {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, RepoError> {
        self.0.get(collection, id).await
    }

    async fn put(&self, collection: &str, id: &str, doc: Value) -> Result<(), RepoError> {
        self.0.put(collection, id, doc).await
    }

    async fn insert(&self, collection: &str, id: &str, doc: Value) -> Result<(), RepoError> {
        if collection == "users" {
            return Err(RepoError::BackendError(anyhow::anyhow!("users table unavailable")));
        }
        self.0.insert(collection, id, doc).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, RepoError> {
        self.0.delete(collection, id).await
    }

    async fn scan(&self, collection: &str) -> Result<Vec<Value>, RepoError> {
        self.0.scan(collection).await
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let app = spawn_app().await;
    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn register_login_and_me() {
    let app = spawn_app().await;
    let (token, user_id) = app.register("grumpy_cat").await;

    let (status, me) = app.get("/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["user_id"], user_id.as_str());
    assert_eq!(me["is_public"], false);
    assert!(me.get("password_hash").is_none());

    let (status, _) = app
        .json(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "GRUMPY_CAT@memes.test", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .json(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "grumpy_cat@memes.test", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn usernames_are_unique_ignoring_case() {
    let app = spawn_app().await;
    app.register("doge").await;
    let (status, _) = app
        .json(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "username": "DOGE", "email": "other@memes.test", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // The username of a rejected registration is released again.
    let (status, _) = app
        .json(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "username": "shibe", "email": "doge@memes.test", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    app.register("shibe").await;
}

#[tokio::test]
async fn requests_without_token_are_unauthorized() {
    let app = spawn_app().await;
    let (status, _) = app.get("/memes/mine", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.get("/memes/mine", Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn feed_only_shows_memes_of_public_creators() {
    let app = spawn_app().await;
    let (alice, _) = app.register("alice").await;
    let (bob, _) = app.register("bob").await;
    let meme_id = app.upload_meme(&alice, "Private creator", true).await;

    let (_, feed) = app.get("/memes", Some(&bob)).await;
    assert_eq!(feed.as_array().unwrap().len(), 0);
    let (status, _) = app.get(&format!("/memes/{}", meme_id), Some(&bob)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The owner still sees it.
    let (status, _) = app.get(&format!("/memes/{}", meme_id), Some(&alice)).await;
    assert_eq!(status, StatusCode::OK);

    app.json(Method::PATCH, "/users/me", Some(&alice), Some(json!({ "is_public": true })))
        .await;
    let (_, feed) = app.get("/memes?tag=cats", None).await;
    let feed = feed.as_array().unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0]["creator_username"], "alice");
    assert_eq!(feed[0]["image_url"], format!("/memes/{}/image", meme_id));
}

#[tokio::test]
async fn likes_require_visibility_and_are_unique() {
    let app = spawn_app().await;
    let (alice, _) = app.register("alice").await;
    let (bob, _) = app.register("bob").await;
    let meme_id = app.upload_meme(&alice, "Likeable", true).await;
    let like_uri = format!("/social/memes/{}/like", meme_id);

    let (status, _) = app.json(Method::POST, &like_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.json(Method::PATCH, "/users/me", Some(&alice), Some(json!({ "is_public": true })))
        .await;
    let (status, _) = app.json(Method::POST, &like_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app.json(Method::POST, &like_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, summary) = app.get(&format!("/social/meme/{}/likes", meme_id), Some(&bob)).await;
    assert_eq!(summary["count"], 1);
    assert_eq!(summary["liked_by_me"], true);

    let (_, liked) = app.get("/social/liked", Some(&bob)).await;
    assert_eq!(liked.as_array().unwrap().len(), 1);
    let (_, trending) = app.get("/memes/trending", None).await;
    assert_eq!(trending[0]["meme_id"], meme_id.as_str());
    assert_eq!(trending[0]["like_count"], 1);

    let (status, _) = app.json(Method::DELETE, &like_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.json(Method::DELETE, &like_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reviews_average_and_reject_self_review() {
    let app = spawn_app().await;
    let (alice, _) = app.register_public("alice").await;
    let (bob, _) = app.register("bob").await;
    let (carol, _) = app.register("carol").await;
    let meme_id = app.upload_meme(&alice, "Rate me", true).await;
    let reviews_uri = format!("/social/memes/{}/reviews", meme_id);

    let (status, _) = app
        .json(Method::POST, &reviews_uri, Some(&alice), Some(json!({ "rating": 5, "comment": "mine" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .json(Method::POST, &reviews_uri, Some(&bob), Some(json!({ "rating": 6 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for (token, rating) in [(&bob, 4), (&carol, 5)] {
        let (status, _) = app
            .json(Method::POST, &reviews_uri, Some(token), Some(json!({ "rating": rating, "comment": "nice" })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, _) = app
        .json(Method::POST, &reviews_uri, Some(&bob), Some(json!({ "rating": 1 })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .json(Method::PUT, &format!("{}/mine", reviews_uri), Some(&bob), Some(json!({ "rating": 2 })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, list) = app.get(&reviews_uri, None).await;
    assert_eq!(list["count"], 2);
    assert_eq!(list["average_rating"], 3.5);
    assert!(list["reviews"].as_array().unwrap().iter().any(|r| r["username"] == "carol"));
}

#[tokio::test]
async fn premium_purchase_splits_commission_once() {
    let app = spawn_app().await;
    let (alice, alice_id) = app.register_public("alice").await;
    let (bob, _) = app.register("bob").await;
    let meme_id = app.upload_meme(&alice, "Rare pepe", true).await;
    let meme_uri = format!("/memes/{}", meme_id);

    let (status, _) = app
        .json(Method::PATCH, &meme_uri, Some(&alice), Some(json!({ "is_premium": true })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "premium needs a price");
    let (status, _) = app
        .json(Method::PATCH, &meme_uri, Some(&alice), Some(json!({ "is_premium": true, "price_cents": 50 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "below the minimum price");
    let (status, _) = app
        .json(Method::PATCH, &meme_uri, Some(&alice), Some(json!({ "is_premium": true, "price_cents": 1999 })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, view) = app.get(&meme_uri, Some(&bob)).await;
    assert!(view["image_url"].is_null());
    let (status, _) = app.raw(Method::GET, &format!("{}/image", meme_uri), Some(&bob)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let purchase_uri = format!("/market/memes/{}/purchase", meme_id);
    let (status, _) = app.json(Method::POST, &purchase_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, tx) = app.json(Method::POST, &purchase_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(tx["price_cents"], 1999);
    assert_eq!(tx["commission_bps"], 1000);
    assert_eq!(tx["platform_earnings_cents"], 200);
    assert_eq!(tx["seller_earnings_cents"], 1799);
    assert_eq!(tx["seller_id"], alice_id.as_str());

    let (status, _) = app.json(Method::POST, &purchase_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, bytes) = app.raw(Method::GET, &format!("{}/image", meme_uri), Some(&bob)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, PNG);

    let (_, earnings) = app.get("/market/earnings", Some(&alice)).await;
    assert_eq!(earnings["sales_count"], 1);
    assert_eq!(earnings["seller_earnings_cents"], 1799);
    let (_, purchases) = app.get("/market/purchases", Some(&bob)).await;
    assert_eq!(purchases.as_array().unwrap().len(), 1);
    let (_, premium) = app.get("/market/premium", None).await;
    assert_eq!(premium[0]["price_cents"], 1999);

    let (_, stats) = app.get("/analytics/me", Some(&alice)).await;
    assert_eq!(stats["sales_count"], 1);
    assert_eq!(stats["earnings_cents"], 1799);
}

#[tokio::test]
async fn hidden_premium_memes_cannot_be_bought() {
    let app = spawn_app().await;
    let (alice, _) = app.register("alice").await;
    let (bob, _) = app.register("bob").await;
    let meme_id = app.upload_meme(&alice, "Secret", true).await;
    app.json(
        Method::PATCH,
        &format!("/memes/{}", meme_id),
        Some(&alice),
        Some(json!({ "is_premium": true, "price_cents": 500 })),
    )
    .await;

    // alice's profile is private
    let (status, _) = app
        .json(Method::POST, &format!("/market/memes/{}/purchase", meme_id), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn deleting_a_meme_removes_image_and_engagement() {
    let app = spawn_app().await;
    let (alice, _) = app.register_public("alice").await;
    let (bob, _) = app.register("bob").await;
    let meme_id = app.upload_meme(&alice, "Short lived", true).await;
    app.json(Method::POST, &format!("/social/memes/{}/like", meme_id), Some(&bob), None)
        .await;
    assert!(app.files.contains(&format!("memes/{}.png", meme_id)).await);

    let (status, _) = app.json(Method::DELETE, &format!("/memes/{}", meme_id), Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.json(Method::DELETE, &format!("/memes/{}", meme_id), Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert!(!app.files.contains(&format!("memes/{}.png", meme_id)).await);
    assert!(app.state.likes().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn uploads_reject_non_images() {
    let app = spawn_app().await;
    let (alice, _) = app.register("alice").await;
    let (status, _) = app
        .multipart(
            "/memes",
            &alice,
            &[
                Part::Text("title", "Not an image"),
                Part::File { name: "image", file_name: "payload.exe", content_type: "application/octet-stream", data: b"MZ" },
            ],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.multipart("/memes", &alice, &[Part::Text("title", "No file")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn generated_images_can_be_published() {
    let app = spawn_app().await;
    let (alice, _) = app.register("alice").await;

    let (status, generated) = app
        .json(Method::POST, "/generate", Some(&alice), Some(json!({ "prompt": "a cat in a suit" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let generated_id = generated["image_id"].as_str().unwrap().to_string();

    let (_, history) = app.get("/generate/history", Some(&alice)).await;
    assert_eq!(history.as_array().unwrap().len(), 1);

    let (status, meme) = app
        .json(
            Method::POST,
            &format!("/memes/from-generated/{}", generated_id),
            Some(&alice),
            Some(json!({ "title": "Business cat", "tags": "cats,work" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(meme["source"], "generated");
    assert_eq!(meme["tags"], json!(["cats", "work"]));

    // Deleting the generation keeps the published meme's own copy.
    let (status, _) = app
        .json(Method::DELETE, &format!("/generate/{}", generated_id), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let meme_id = meme["meme_id"].as_str().unwrap();
    let (status, _) = app.raw(Method::GET, &format!("/memes/{}/image", meme_id), Some(&alice)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn private_profiles_are_not_found() {
    let app = spawn_app().await;
    let (_, alice_id) = app.register("alice").await;
    let (bob, _) = app.register("bob").await;

    let (status, _) = app.get(&format!("/users/{}", alice_id), Some(&bob)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.get("/users/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn failed_user_write_releases_username_and_email() {
    let app = spawn_app_with_store(Arc::new(UsersUnavailable(InMemoryDocumentStore::new()))).await;
    let (status, _) = app
        .json(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "username": "Nyan", "email": "nyan@memes.test", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    assert!(app.state.usernames().get("nyan").await.unwrap().is_none());
    assert!(app.state.emails().get("nyan@memes.test").await.unwrap().is_none());
}

#[tokio::test]
async fn password_change_replaces_old_password() {
    let app = spawn_app().await;
    let (token, _) = app.register("keyboard_cat").await;
    let uri = "/users/me/password";

    let (status, _) = app
        .json(
            Method::PUT,
            uri,
            Some(&token),
            Some(json!({ "current_password": "not-the-password", "new_password": "brand-new-secret" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app
        .json(Method::PUT, uri, Some(&token), Some(json!({ "current_password": PASSWORD, "new_password": "short" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app
        .json(
            Method::PUT,
            uri,
            Some(&token),
            Some(json!({ "current_password": PASSWORD, "new_password": "brand-new-secret" })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let login = |password: &'static str| json!({ "email": "keyboard_cat@memes.test", "password": password });
    let (status, _) = app.json(Method::POST, "/auth/login", None, Some(login(PASSWORD))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.json(Method::POST, "/auth/login", None, Some(login("brand-new-secret"))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn avatars_follow_profile_visibility() {
    let app = spawn_app().await;
    let (alice, alice_id) = app.register_public("alice").await;
    let (bob, bob_id) = app.register("bob").await;

    let (status, _) = app.get(&format!("/users/{}/avatar", alice_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "no avatar uploaded yet");

    let (status, profile) = app
        .multipart(
            "/users/me/avatar",
            &alice,
            &[Part::File { name: "image", file_name: "me.png", content_type: "image/png", data: PNG }],
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", profile);
    assert!(profile["avatar_url"].is_string());

    let (status, bytes) = app.raw(Method::GET, &format!("/users/{}/avatar", alice_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, PNG);

    let (status, _) = app
        .multipart(
            "/users/me/avatar",
            &bob,
            &[Part::File { name: "image", file_name: "me.png", content_type: "image/png", data: PNG }],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    // bob's profile is private
    let (status, _) = app.get(&format!("/users/{}/avatar", bob_id), Some(&alice)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.raw(Method::GET, &format!("/users/{}/avatar", bob_id), Some(&bob)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn own_review_can_be_edited_and_removed() {
    let app = spawn_app().await;
    let (alice, _) = app.register_public("alice").await;
    let (bob, _) = app.register("bob").await;
    let meme_id = app.upload_meme(&alice, "Review target", true).await;
    let reviews_uri = format!("/social/memes/{}/reviews", meme_id);
    let mine_uri = format!("{}/mine", reviews_uri);

    let (status, _) = app.json(Method::PUT, &mine_uri, Some(&bob), Some(json!({ "rating": 3 }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.json(Method::DELETE, &mine_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .json(Method::POST, &reviews_uri, Some(&bob), Some(json!({ "rating": 2, "comment": "meh" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, review) = app
        .json(Method::PUT, &mine_uri, Some(&bob), Some(json!({ "rating": 5, "comment": "grew on me" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(review["rating"], 5);
    assert_eq!(review["comment"], "grew on me");

    let (_, list) = app.get(&reviews_uri, None).await;
    assert_eq!(list["average_rating"], 5.0);

    let (status, _) = app.json(Method::DELETE, &mine_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, list) = app.get(&reviews_uri, None).await;
    assert_eq!(list["count"], 0);
    assert!(list["average_rating"].is_null());
}

#[tokio::test]
async fn feed_filters_by_tag_text_and_page() {
    let app = spawn_app().await;
    let (alice, _) = app.register_public("alice").await;
    app.upload_meme(&alice, "Cat one", true).await;
    app.upload_meme(&alice, "Cat two", true).await;
    let (status, _) = app
        .multipart(
            "/memes",
            &alice,
            &[
                Part::Text("title", "Good boy"),
                Part::Text("description", "A very good dog"),
                Part::Text("tags", "dogs"),
                Part::Text("is_public", "true"),
                Part::File { name: "image", file_name: "dog.png", content_type: "image/png", data: PNG },
            ],
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let titles = |feed: &Value| -> Vec<String> {
        feed.as_array().unwrap().iter().map(|m| m["title"].as_str().unwrap().to_string()).collect()
    };

    let (_, feed) = app.get("/memes?tag=%23Dogs", None).await;
    assert_eq!(titles(&feed), vec!["Good boy"]);
    let (_, feed) = app.get("/memes?tag=cats", None).await;
    assert_eq!(titles(&feed).len(), 2);
    let (_, feed) = app.get("/memes?q=TWO", None).await;
    assert_eq!(titles(&feed), vec!["Cat two"]);
    let (_, feed) = app.get("/memes?q=good%20dog", None).await;
    assert_eq!(titles(&feed), vec!["Good boy"]);

    let (_, first) = app.get("/memes?limit=2", None).await;
    let (_, rest) = app.get("/memes?limit=2&offset=2", None).await;
    assert_eq!(titles(&first).len(), 2);
    assert_eq!(titles(&rest).len(), 1);
    let all: HashSet<String> = titles(&first).into_iter().chain(titles(&rest)).collect();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn raised_minimum_price_does_not_block_other_edits() {
    let app = spawn_app().await;
    let root = app.admin_token().await;
    let (alice, _) = app.register_public("alice").await;
    let meme_id = app.upload_meme(&alice, "Cheap pepe", true).await;
    let meme_uri = format!("/memes/{}", meme_id);

    let (status, _) = app
        .json(Method::PATCH, &meme_uri, Some(&alice), Some(json!({ "is_premium": true, "price_cents": 150 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .json(Method::PUT, "/admin/settings", Some(&root), Some(json!({ "min_price_cents": 200 })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, view) = app
        .json(Method::PATCH, &meme_uri, Some(&alice), Some(json!({ "title": "Vintage pepe" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["title"], "Vintage pepe");

    let (status, _) = app
        .json(Method::PATCH, &meme_uri, Some(&alice), Some(json!({ "price_cents": 150 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
