use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Row, Sqlite, SqliteConnection};
use tracing::info;

use super::filter::{exactly_one, push_where, Column, Filter};
use super::models::{is_valid_slug, Tag, Topic};
use super::topics::{joined_topic, JOINED_TOPIC_COLUMNS};
use super::Database;
use crate::error::{ForumError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagColumn {
    Id,
    Name,
    TopicId,
}

impl Column for TagColumn {
    fn sql(self) -> &'static str {
        match self {
            Self::Id => "tags.id",
            Self::Name => "tags.name",
            Self::TopicId => "tags.topic_id",
        }
    }
}

impl FromRow<'_, SqliteRow> for Tag {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            topic: joined_topic(row)?,
        })
    }
}

pub struct TagRepo<'a> {
    db: &'a Database,
}

impl<'a> TagRepo<'a> {
    pub(crate) const fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Tags matching every filter, each with its topic, ordered by name.
    pub async fn find(
        &self,
        tx: Option<&mut SqliteConnection>,
        filters: &[Filter<TagColumn>],
    ) -> Result<Vec<Tag>> {
        let mut conn = self.db.acquire(tx).await?;
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT tags.id, tags.name, ");
        qb.push(JOINED_TOPIC_COLUMNS);
        qb.push(" FROM tags JOIN topics ON topics.id = tags.topic_id");
        push_where(&mut qb, filters);
        qb.push(" ORDER BY tags.name, tags.id");

        let tags = qb.build_query_as::<Tag>().fetch_all(&mut *conn).await?;
        Ok(tags)
    }

    pub async fn find_one(
        &self,
        tx: Option<&mut SqliteConnection>,
        filters: &[Filter<TagColumn>],
    ) -> Result<Tag> {
        exactly_one(self.find(tx, filters).await?)
    }

    /// Create a tag under `topic`. Names are unique per topic.
    pub async fn add(
        &self,
        tx: Option<&mut SqliteConnection>,
        name: &str,
        topic: &Topic,
    ) -> Result<Tag> {
        if !is_valid_slug(name) {
            return Err(ForumError::InvalidInput("invalid tag name".to_string()));
        }
        let name = name.to_lowercase();

        let mut conn = self.db.acquire(tx).await?;
        let id = sqlx::query("INSERT INTO tags (name, topic_id) VALUES (?, ?)")
            .bind(&name)
            .bind(topic.id)
            .execute(&mut *conn)
            .await
            .map_err(|e| ForumError::from(e).conflict_as("tag already exists in this topic"))?
            .last_insert_rowid();

        info!(tag_id = id, topic = %topic.name, name = %name, "Created tag");
        self.find_one(Some(&mut *conn), &[Filter::eq(TagColumn::Id, id)])
            .await
    }
}
