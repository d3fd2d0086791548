use std::collections::HashSet;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Row, Sqlite, SqliteConnection};
use tracing::info;

use super::filter::{exactly_one, push_where, Column, Filter};
use super::models::{render_markdown, Post, Tag, Topic, User};
use super::topics::{joined_topic, JOINED_TOPIC_COLUMNS};
use super::votes::VoteColumn;
use super::{now_timestamp, Database};
use crate::error::{ForumError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostColumn {
    Id,
    Title,
    TopicId,
    CreatorId,
    IsPinned,
    IsVisible,
    /// Matches posts carrying the tag; untagged posts never match.
    TagId,
}

impl Column for PostColumn {
    fn sql(self) -> &'static str {
        match self {
            Self::Id => "posts.id",
            Self::Title => "posts.title",
            Self::TopicId => "posts.topic_id",
            Self::CreatorId => "posts.creator_user_id",
            Self::IsPinned => "posts.is_pinned",
            Self::IsVisible => "posts.is_visible",
            Self::TagId => "post_tags.tag_id",
        }
    }
}

const POST_SELECT: &str = "SELECT posts.id, posts.title, posts.content, posts.created_at, \
     posts.is_pinned, posts.is_visible, COUNT(post_votes.user_id) AS score, \
     post_tags.tag_id AS tag_id, \
     users.id AS creator_id, users.email AS creator_email, users.name AS creator_name, \
     users.is_admin AS creator_is_admin, ";

const POST_FROM: &str = " FROM posts \
     JOIN topics ON topics.id = posts.topic_id \
     JOIN users ON users.id = posts.creator_user_id \
     LEFT JOIN post_votes ON post_votes.post_id = posts.id \
     LEFT JOIN post_tags ON post_tags.post_id = posts.id";

const POST_ORDER: &str =
    " GROUP BY posts.id ORDER BY score DESC, posts.created_at DESC, posts.id DESC";

impl FromRow<'_, SqliteRow> for Post {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
            is_pinned: row.try_get("is_pinned")?,
            is_visible: row.try_get("is_visible")?,
            score: row.try_get("score")?,
            tag_id: row.try_get("tag_id")?,
            topic: joined_topic(row)?,
            creator: User {
                id: row.try_get("creator_id")?,
                email: row.try_get("creator_email")?,
                name: row.try_get("creator_name")?,
                is_admin: row.try_get("creator_is_admin")?,
            },
        })
    }
}

pub struct PostRepo<'a> {
    db: &'a Database,
}

impl<'a> PostRepo<'a> {
    pub(crate) const fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Posts matching every filter with their vote score, best first.
    pub async fn find(
        &self,
        tx: Option<&mut SqliteConnection>,
        filters: &[Filter<PostColumn>],
    ) -> Result<Vec<Post>> {
        let mut conn = self.db.acquire(tx).await?;
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(POST_SELECT);
        qb.push(JOINED_TOPIC_COLUMNS);
        qb.push(POST_FROM);
        push_where(&mut qb, filters);
        qb.push(POST_ORDER);

        let posts = qb.build_query_as::<Post>().fetch_all(&mut *conn).await?;
        Ok(posts)
    }

    pub async fn find_one(
        &self,
        tx: Option<&mut SqliteConnection>,
        filters: &[Filter<PostColumn>],
    ) -> Result<Post> {
        exactly_one(self.find(tx, filters).await?)
    }

    /// Create a visible, unpinned post with no votes.
    pub async fn add(
        &self,
        tx: Option<&mut SqliteConnection>,
        title: &str,
        content: &str,
        topic: &Topic,
        creator: &User,
    ) -> Result<Post> {
        let title = title.trim();
        if title.is_empty() || render_markdown(content).is_empty() {
            return Err(ForumError::InvalidInput(
                "title and/or content cannot be empty".to_string(),
            ));
        }

        let mut conn = self.db.acquire(tx).await?;
        let id = sqlx::query(
            "INSERT INTO posts (title, content, created_at, topic_id, creator_user_id) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(title)
        .bind(content)
        .bind(now_timestamp())
        .bind(topic.id)
        .bind(creator.id)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        info!(post_id = id, topic = %topic.name, creator_id = creator.id, "Created post");
        self.find_one(Some(&mut *conn), &[Filter::eq(PostColumn::Id, id)])
            .await
    }

    /// Attach `tag` to `post`. The tag must belong to the post's topic and a
    /// post carries at most one tag.
    pub async fn add_post_tag(
        &self,
        tx: Option<&mut SqliteConnection>,
        post: &Post,
        tag: &Tag,
    ) -> Result<()> {
        let mut conn = self.db.acquire(tx).await?;
        sqlx::query("INSERT INTO post_tags (post_id, tag_id, topic_id) VALUES (?, ?, ?)")
            .bind(post.id)
            .bind(tag.id)
            .bind(post.topic.id)
            .execute(&mut *conn)
            .await
            .map_err(|e| ForumError::from(e).conflict_as("post is already tagged"))?;
        Ok(())
    }

    /// Show or hide a post. Setting the current value again is a no-op.
    pub async fn update_visibility(
        &self,
        tx: Option<&mut SqliteConnection>,
        post: &Post,
        is_visible: bool,
    ) -> Result<Post> {
        let mut conn = self.db.acquire(tx).await?;
        sqlx::query("UPDATE posts SET is_visible = ? WHERE id = ?")
            .bind(is_visible)
            .bind(post.id)
            .execute(&mut *conn)
            .await?;

        info!(post_id = post.id, is_visible, "Updated post visibility");
        self.find_one(Some(&mut *conn), &[Filter::eq(PostColumn::Id, post.id)])
            .await
    }

    /// Pin or unpin a post. Setting the current value again is a no-op.
    pub async fn update_pinned(
        &self,
        tx: Option<&mut SqliteConnection>,
        post: &Post,
        is_pinned: bool,
    ) -> Result<Post> {
        let mut conn = self.db.acquire(tx).await?;
        sqlx::query("UPDATE posts SET is_pinned = ? WHERE id = ?")
            .bind(is_pinned)
            .bind(post.id)
            .execute(&mut *conn)
            .await?;

        info!(post_id = post.id, is_pinned, "Updated post pin");
        self.find_one(Some(&mut *conn), &[Filter::eq(PostColumn::Id, post.id)])
            .await
    }

    /// Ids of posts with a vote row matching every filter, typically
    /// `UserId = viewer`.
    pub async fn get_voted_post_ids(
        &self,
        tx: Option<&mut SqliteConnection>,
        filters: &[Filter<VoteColumn>],
    ) -> Result<HashSet<i64>> {
        let mut conn = self.db.acquire(tx).await?;
        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT post_votes.post_id FROM post_votes");
        push_where(&mut qb, filters);

        let ids: Vec<(i64,)> = qb.build_query_as().fetch_all(&mut *conn).await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}
