//! Integration tests for the forum routes and the authorization pipeline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use topic_forum::auth::{start_session, Identity, IdentityProvider};
use topic_forum::config::Config;
use topic_forum::db::{Database, Filter, Post, PostColumn, Topic, User};
use topic_forum::error::ForumError;
use topic_forum::web::{create_app, AppState};
use tower::ServiceExt;

struct NoLogin;

#[async_trait]
impl IdentityProvider for NoLogin {
    fn authorize_url(&self, state: &str) -> String {
        format!("https://id.example.com/authorize?state={state}")
    }

    async fn exchange(&self, _code: &str) -> anyhow::Result<Identity> {
        anyhow::bail!("login is not used by these tests")
    }
}

fn test_config(temp_dir: &TempDir) -> Config {
    Config {
        database_path: temp_dir.path().join("test.sqlite"),
        ..Config::for_testing()
    }
}

struct TestApp {
    db: Database,
    app: Router,
    _temp_dir: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = test_config(&temp_dir);
        let db = Database::new(&config.database_path)
            .await
            .expect("Failed to create database");

        let app = create_app(AppState {
            db: db.clone(),
            config: Arc::new(config),
            identity: Arc::new(NoLogin),
        });

        Self {
            db,
            app,
            _temp_dir: temp_dir,
        }
    }

    async fn user(&self, email: &str, is_admin: bool) -> User {
        let user = self.db.users().add(None, email, "someone").await.unwrap();
        if is_admin {
            self.db.users().update_admin(None, &user, true).await.unwrap()
        } else {
            user
        }
    }

    /// `Cookie` header value for a fresh session of `user`.
    async fn cookie(&self, user: &User) -> String {
        let session = start_session(&self.db, user, Duration::from_secs(3600))
            .await
            .unwrap();
        format!("session={}", session.token)
    }

    async fn topic(&self, name: &str) -> Topic {
        self.db
            .topics()
            .add(None, name, "Title", "Description")
            .await
            .unwrap()
    }

    async fn post(&self, title: &str, topic: &Topic, creator: &User) -> Post {
        self.db
            .posts()
            .add(None, title, "body", topic, creator)
            .await
            .unwrap()
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        cookie: Option<&str>,
        form: Option<&str>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let body = match form {
            Some(form) => {
                builder = builder.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
                Body::from(form.to_string())
            }
            None => Body::empty(),
        };

        self.app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap()
    }

    async fn get_json(&self, uri: &str, cookie: Option<&str>) -> Value {
        let response = self.send("GET", uri, cookie, None).await;
        assert_eq!(response.status(), StatusCode::OK, "GET {uri}");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }
}

fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
}

fn titles(posts: &Value) -> Vec<String> {
    posts
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["title"].as_str().unwrap().to_string())
        .collect()
}

// ========== Basic routes ==========

#[tokio::test]
async fn test_health() {
    let t = TestApp::new().await;
    let response = t.send("GET", "/healthz", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_index_lists_topics_anonymously() {
    let t = TestApp::new().await;
    t.topic("rust").await;
    t.topic("python").await;

    let page = t.get_json("/", None).await;
    assert!(page["user"].is_null());
    let names: Vec<&str> = page["topics"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["python", "rust"]);
    assert_eq!(page["topics"][0]["url"], "/topics/python");
}

#[tokio::test]
async fn test_index_shows_session_user() {
    let t = TestApp::new().await;
    let user = t.user("a@example.com", false).await;
    let cookie = t.cookie(&user).await;

    let page = t.get_json("/", Some(&cookie)).await;
    assert_eq!(page["user"]["email"], "a@example.com");
}

#[tokio::test]
async fn test_unknown_session_token_is_anonymous() {
    let t = TestApp::new().await;
    let page = t.get_json("/", Some("session=not-a-real-token")).await;
    assert!(page["user"].is_null());
}

// ========== Path resolution ==========

#[tokio::test]
async fn test_unknown_topic_is_not_found() {
    let t = TestApp::new().await;
    let response = t.send("GET", "/topics/haskell", None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_topic_name_is_case_insensitive() {
    let t = TestApp::new().await;
    t.topic("python").await;

    let page = t.get_json("/topics/PyThOn", None).await;
    assert_eq!(page["topic"]["name"], "python");
}

#[tokio::test]
async fn test_malformed_post_id_is_bad_request() {
    let t = TestApp::new().await;
    t.topic("python").await;

    let response = t.send("GET", "/topics/python/posts/abc", None, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Rejected before the topic is looked up
    let response = t.send("GET", "/topics/haskell/posts/abc", None, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_post_from_other_topic_is_not_found() {
    let t = TestApp::new().await;
    let user = t.user("a@example.com", false).await;
    let python = t.topic("python").await;
    t.topic("rust").await;
    let post = t.post("Loops", &python, &user).await;

    let ok = t
        .send("GET", &format!("/topics/python/posts/{}", post.id), None, None)
        .await;
    assert_eq!(ok.status(), StatusCode::OK);

    let response = t
        .send("GET", &format!("/topics/rust/posts/{}", post.id), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_tag_resolution() {
    let t = TestApp::new().await;
    let python = t.topic("python").await;
    t.topic("rust").await;
    t.db.tags().add(None, "loops", &python).await.unwrap();

    let page = t.get_json("/topics/python/tags/LOOPS", None).await;
    assert_eq!(page["tag"]["name"], "loops");
    assert_eq!(page["tag"]["url"], "/topics/python/tags/loops");

    let response = t.send("GET", "/topics/rust/tags/loops", None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_entity_resolution_runs_before_gate() {
    let t = TestApp::new().await;
    t.topic("python").await;

    // Anonymous, but the post does not exist: 404 rather than 403
    let response = t
        .send("POST", "/topics/python/posts/999/hide", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ========== Gates ==========

#[tokio::test]
async fn test_create_topic_requires_admin() {
    let t = TestApp::new().await;
    let user = t.user("a@example.com", false).await;
    let admin = t.user("admin@example.com", true).await;
    let form = "name=Python&title=Python&description=Snakes";

    let response = t.send("POST", "/topics/new", None, Some(form)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let cookie = t.cookie(&user).await;
    let response = t.send("POST", "/topics/new", Some(&cookie), Some(form)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let cookie = t.cookie(&admin).await;
    let response = t.send("POST", "/topics/new", Some(&cookie), Some(form)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/topics/python");

    let response = t.send("POST", "/topics/new", Some(&cookie), Some(form)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_create_topic_invalid_name() {
    let t = TestApp::new().await;
    let admin = t.user("admin@example.com", true).await;
    let cookie = t.cookie(&admin).await;

    let response = t
        .send(
            "POST",
            "/topics/new",
            Some(&cookie),
            Some("name=two+words&title=T&description=D"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_hide_gate_ordering() {
    let t = TestApp::new().await;
    let creator = t.user("creator@example.com", false).await;
    let stranger = t.user("stranger@example.com", false).await;
    let admin = t.user("admin@example.com", true).await;
    let topic = t.topic("python").await;
    let post = t.post("Loops", &topic, &creator).await;
    let uri = format!("/topics/python/posts/{}/hide", post.id);

    let response = t.send("POST", &uri, None, None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let cookie = t.cookie(&stranger).await;
    let response = t.send("POST", &uri, Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let cookie = t.cookie(&creator).await;
    let response = t.send("POST", &uri, Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = t.cookie(&admin).await;
    let response = t.send("DELETE", &uri, Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = t.send("POST", &uri, Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_pin_requires_admin() {
    let t = TestApp::new().await;
    let creator = t.user("creator@example.com", false).await;
    let admin = t.user("admin@example.com", true).await;
    let topic = t.topic("python").await;
    let post = t.post("Loops", &topic, &creator).await;
    let uri = format!("/topics/python/posts/{}/pin", post.id);

    let cookie = t.cookie(&creator).await;
    let response = t.send("POST", &uri, Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let cookie = t.cookie(&admin).await;
    let response = t.send("POST", &uri, Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let page = t.get_json("/topics/python", None).await;
    assert_eq!(titles(&page["pinned_posts"]), vec!["Loops"]);
    assert!(page["unpinned_posts"].as_array().unwrap().is_empty());
}

// ========== Visibility ==========

#[tokio::test]
async fn test_hidden_posts_visibility() {
    let t = TestApp::new().await;
    let creator = t.user("creator@example.com", false).await;
    let stranger = t.user("stranger@example.com", false).await;
    let admin = t.user("admin@example.com", true).await;
    let topic = t.topic("python").await;
    let post = t.post("Secret", &topic, &creator).await;
    t.db.posts().update_visibility(None, &post, false).await.unwrap();
    let detail = format!("/topics/python/posts/{}", post.id);

    let creator_cookie = t.cookie(&creator).await;
    let stranger_cookie = t.cookie(&stranger).await;
    let admin_cookie = t.cookie(&admin).await;

    // Detail
    assert_eq!(
        t.send("GET", &detail, None, None).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        t.send("GET", &detail, Some(&stranger_cookie), None).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        t.send("GET", &detail, Some(&creator_cookie), None).await.status(),
        StatusCode::OK
    );
    assert_eq!(
        t.send("GET", &detail, Some(&admin_cookie), None).await.status(),
        StatusCode::OK
    );

    // Every post route treats the hidden post as missing for a stranger
    for (method, suffix) in [
        ("POST", "/vote"),
        ("DELETE", "/vote"),
        ("POST", "/hide"),
        ("DELETE", "/hide"),
        ("POST", "/pin"),
    ] {
        let uri = format!("{detail}{suffix}");
        assert_eq!(
            t.send(method, &uri, Some(&stranger_cookie), None).await.status(),
            StatusCode::NOT_FOUND,
            "{method} {suffix}"
        );
    }

    // The creator can still vote on it
    let vote = format!("{detail}/vote");
    assert_eq!(
        t.send("POST", &vote, Some(&creator_cookie), None).await.status(),
        StatusCode::OK
    );
    assert_eq!(
        t.send("DELETE", &vote, Some(&creator_cookie), None).await.status(),
        StatusCode::OK
    );

    // Listing
    let page = t.get_json("/topics/python", Some(&creator_cookie)).await;
    assert!(page["unpinned_posts"].as_array().unwrap().is_empty());
    let page = t.get_json("/topics/python", Some(&admin_cookie)).await;
    assert_eq!(titles(&page["unpinned_posts"]), vec!["Secret"]);
    assert_eq!(page["unpinned_posts"][0]["is_visible"], false);
}

#[tokio::test]
async fn test_post_page_lists_related_posts() {
    let t = TestApp::new().await;
    let user = t.user("a@example.com", false).await;
    let topic = t.topic("python").await;
    let loops = t.db.tags().add(None, "loops", &topic).await.unwrap();
    let first = t.post("For loops", &topic, &user).await;
    let second = t.post("While loops", &topic, &user).await;
    let hidden = t.post("Hidden loops", &topic, &user).await;
    t.post("Untagged", &topic, &user).await;
    for post in [&first, &second, &hidden] {
        t.db.posts().add_post_tag(None, post, &loops).await.unwrap();
    }
    t.db.posts().update_visibility(None, &hidden, false).await.unwrap();

    let page = t
        .get_json(&format!("/topics/python/posts/{}", first.id), None)
        .await;
    assert_eq!(page["post"]["title"], "For loops");
    assert_eq!(titles(&page["related_posts"]), vec!["While loops"]);
    assert_eq!(page["topic"]["new_post_url"], "/topics/python/new");

    let untagged = t
        .db
        .posts()
        .find_one(None, &[Filter::eq(PostColumn::Title, "Untagged")])
        .await
        .unwrap();
    let page = t
        .get_json(&format!("/topics/python/posts/{}", untagged.id), None)
        .await;
    assert!(page["related_posts"].as_array().unwrap().is_empty());
}

// ========== Posts and votes ==========

#[tokio::test]
async fn test_create_post_requires_login() {
    let t = TestApp::new().await;
    t.topic("python").await;

    let response = t
        .send("POST", "/topics/python/new", None, Some("title=Hi&text=there"))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_create_post_with_malformed_tag_id() {
    let t = TestApp::new().await;
    let user = t.user("a@example.com", false).await;
    t.topic("python").await;
    let cookie = t.cookie(&user).await;

    let response = t
        .send(
            "POST",
            "/topics/python/new",
            Some(&cookie),
            Some("title=Hi&text=there&tag=abc"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(t.db.posts().find(None, &[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_post_with_foreign_tag_rolls_back() {
    let t = TestApp::new().await;
    let user = t.user("a@example.com", false).await;
    t.topic("python").await;
    let rust = t.topic("rust").await;
    let rust_tag = t.db.tags().add(None, "borrowck", &rust).await.unwrap();
    let cookie = t.cookie(&user).await;

    let form = format!("title=Orphan&text=body&tag={}", rust_tag.id);
    let response = t
        .send("POST", "/topics/python/new", Some(&cookie), Some(&form))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let err = t
        .db
        .posts()
        .find_one(None, &[Filter::eq(PostColumn::Title, "Orphan")])
        .await
        .unwrap_err();
    assert!(matches!(err, ForumError::NotFound));
}

#[tokio::test]
async fn test_create_post_with_empty_content() {
    let t = TestApp::new().await;
    let user = t.user("a@example.com", false).await;
    t.topic("python").await;
    let cookie = t.cookie(&user).await;

    let response = t
        .send("POST", "/topics/python/new", Some(&cookie), Some("title=Hi&text="))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_vote_routes() {
    let t = TestApp::new().await;
    let user = t.user("a@example.com", false).await;
    let topic = t.topic("python").await;
    let post = t.post("Loops", &topic, &user).await;
    let uri = format!("/topics/python/posts/{}/vote", post.id);
    let cookie = t.cookie(&user).await;

    assert_eq!(
        t.send("POST", &uri, None, None).await.status(),
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        t.send("POST", &uri, Some(&cookie), None).await.status(),
        StatusCode::OK
    );
    assert_eq!(
        t.send("POST", &uri, Some(&cookie), None).await.status(),
        StatusCode::CONFLICT
    );

    let page = t
        .get_json(&format!("/topics/python/posts/{}", post.id), Some(&cookie))
        .await;
    assert_eq!(page["post"]["score"], 1);
    assert_eq!(page["post"]["voted"], true);

    for _ in 0..2 {
        assert_eq!(
            t.send("DELETE", &uri, Some(&cookie), None).await.status(),
            StatusCode::OK
        );
    }
    let page = t
        .get_json(&format!("/topics/python/posts/{}", post.id), Some(&cookie))
        .await;
    assert_eq!(page["post"]["score"], 0);
    assert_eq!(page["post"]["voted"], false);
}

#[tokio::test]
async fn test_user_page() {
    let t = TestApp::new().await;
    let user = t.user("Ada@Example.com", false).await;
    let topic = t.topic("python").await;
    t.post("Mine", &topic, &user).await;

    let page = t.get_json("/users/ada@example.com", None).await;
    assert_eq!(page["profile"]["email"], "ada@example.com");
    assert_eq!(titles(&page["posts"]), vec!["Mine"]);

    let response = t.send("GET", "/users/nobody@example.com", None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ========== End to end ==========

#[tokio::test]
async fn test_python_loops_scenario() {
    let t = TestApp::new().await;
    let admin = t.user("admin@example.com", true).await;
    let user_a = t.user("a@example.com", false).await;
    let user_b = t.user("b@example.com", false).await;
    let admin_cookie = t.cookie(&admin).await;
    let a_cookie = t.cookie(&user_a).await;
    let b_cookie = t.cookie(&user_b).await;

    // Admin creates the topic and tag
    let response = t
        .send(
            "POST",
            "/topics/new",
            Some(&admin_cookie),
            Some("name=python&title=Python&description=All+things+Python"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = t
        .send(
            "POST",
            "/topics/python/tags/new",
            Some(&admin_cookie),
            Some("name=loops"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/topics/python/tags/loops");

    let tags = t.get_json("/topics/python/tags", None).await;
    let tag_id = tags["tags"][0]["id"].as_i64().unwrap();

    // User A posts, tagged
    let form = format!("title=Intro&text=Hello+**world**&tag={tag_id}");
    let response = t
        .send("POST", "/topics/python/new", Some(&a_cookie), Some(&form))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let post_url = location(&response).to_string();
    assert!(post_url.starts_with("/topics/python/posts/"));

    let tagged = t.get_json("/topics/python/tags/loops", None).await;
    assert_eq!(titles(&tagged["posts"]), vec!["Intro"]);
    assert_eq!(tagged["posts"][0]["tag_id"], tag_id);

    // User B votes
    let response = t
        .send("POST", &format!("{post_url}/vote"), Some(&b_cookie), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let page = t.get_json("/topics/python", None).await;
    assert_eq!(titles(&page["unpinned_posts"]), vec!["Intro"]);
    assert_eq!(page["unpinned_posts"][0]["score"], 1);
    assert!(page["pinned_posts"].as_array().unwrap().is_empty());

    // User B unvotes
    let response = t
        .send("DELETE", &format!("{post_url}/vote"), Some(&b_cookie), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let page = t.get_json("/topics/python", None).await;
    assert_eq!(page["unpinned_posts"][0]["score"], 0);

    // Admin pins
    let response = t
        .send("POST", &format!("{post_url}/pin"), Some(&admin_cookie), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let page = t.get_json("/topics/python", None).await;
    assert_eq!(titles(&page["pinned_posts"]), vec!["Intro"]);
    assert!(page["unpinned_posts"].as_array().unwrap().is_empty());
}
