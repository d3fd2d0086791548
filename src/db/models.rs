use std::sync::LazyLock;

use ammonia::clean;
use pulldown_cmark::{html, Options, Parser};
use regex::Regex;
use serde::Serialize;

/// Topic and tag names: a single word of ASCII letters, digits or `_`.
static SLUG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_]+$").expect("valid slug regex")
});

/// Whether `name` is a valid topic or tag slug (checked before lowercasing).
#[must_use]
pub fn is_valid_slug(name: &str) -> bool {
    SLUG_REGEX.is_match(name)
}

/// A forum member. Created on first login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub is_admin: bool,
}

impl User {
    #[must_use]
    pub fn url(&self) -> String {
        format!("/users/{}", self.email)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Topic {
    pub id: i64,
    pub name: String,
    pub title: String,
    pub description: String,
}

impl Topic {
    #[must_use]
    pub fn url(&self) -> String {
        format!("/topics/{}", self.name)
    }

    #[must_use]
    pub fn tags_url(&self) -> String {
        format!("{}/tags", self.url())
    }

    #[must_use]
    pub fn new_post_url(&self) -> String {
        format!("{}/new", self.url())
    }
}

/// A label scoped to one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub topic: Topic,
}

impl Tag {
    #[must_use]
    pub fn url(&self) -> String {
        format!("{}/{}", self.topic.tags_url(), self.name)
    }
}

/// A post as read through the aggregated select: `score` is the number of
/// vote rows at read time and is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    /// Raw markdown as submitted.
    pub content: String,
    pub created_at: String,
    pub is_pinned: bool,
    pub is_visible: bool,
    pub score: i64,
    pub tag_id: Option<i64>,
    pub topic: Topic,
    pub creator: User,
}

impl Post {
    #[must_use]
    pub fn url(&self) -> String {
        format!("{}/posts/{}", self.topic.url(), self.id)
    }

    /// Markdown rendered to HTML with scripts, handlers and other unsafe
    /// markup stripped.
    #[must_use]
    pub fn sanitized_content(&self) -> String {
        render_markdown(&self.content)
    }
}

/// Render markdown to sanitized HTML, trimmed.
#[must_use]
pub fn render_markdown(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH);
    let mut unsafe_html = String::new();
    html::push_html(&mut unsafe_html, parser);
    clean(&unsafe_html).trim().to_string()
}

/// Server-side login session.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Session {
    pub id: i64,
    pub token: String,
    pub user_id: i64,
    pub created_at: String,
    pub expires_at: String,
}
