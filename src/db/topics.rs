use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use tracing::info;

use super::filter::{exactly_one, push_where, Column, Filter};
use super::models::{is_valid_slug, Topic};
use super::Database;
use crate::error::{ForumError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicColumn {
    Id,
    Name,
}

impl Column for TopicColumn {
    fn sql(self) -> &'static str {
        match self {
            Self::Id => "topics.id",
            Self::Name => "topics.name",
        }
    }
}

/// Read a topic embedded in a joined row under `topic_*` aliases.
pub(crate) fn joined_topic(row: &SqliteRow) -> Result<Topic, sqlx::Error> {
    Ok(Topic {
        id: row.try_get("topic_id")?,
        name: row.try_get("topic_name")?,
        title: row.try_get("topic_title")?,
        description: row.try_get("topic_description")?,
    })
}

/// Column list for embedding a topic into another entity's select.
pub(crate) const JOINED_TOPIC_COLUMNS: &str = "topics.id AS topic_id, topics.name AS topic_name, \
     topics.title AS topic_title, topics.description AS topic_description";

pub struct TopicRepo<'a> {
    db: &'a Database,
}

impl<'a> TopicRepo<'a> {
    pub(crate) const fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// All topics matching every filter, ordered by name.
    pub async fn find(
        &self,
        tx: Option<&mut SqliteConnection>,
        filters: &[Filter<TopicColumn>],
    ) -> Result<Vec<Topic>> {
        let mut conn = self.db.acquire(tx).await?;
        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT topics.id, topics.name, topics.title, topics.description FROM topics");
        push_where(&mut qb, filters);
        qb.push(" ORDER BY topics.name");

        let topics = qb.build_query_as::<Topic>().fetch_all(&mut *conn).await?;
        Ok(topics)
    }

    pub async fn find_one(
        &self,
        tx: Option<&mut SqliteConnection>,
        filters: &[Filter<TopicColumn>],
    ) -> Result<Topic> {
        exactly_one(self.find(tx, filters).await?)
    }

    /// Create a topic. The name is validated as a slug and stored lowercased.
    pub async fn add(
        &self,
        tx: Option<&mut SqliteConnection>,
        name: &str,
        title: &str,
        description: &str,
    ) -> Result<Topic> {
        let title = title.trim();
        let description = description.trim();
        if title.is_empty() || description.is_empty() || !is_valid_slug(name) {
            return Err(ForumError::InvalidInput(
                "invalid name, title and/or description".to_string(),
            ));
        }
        let name = name.to_lowercase();

        let mut conn = self.db.acquire(tx).await?;
        let id = sqlx::query("INSERT INTO topics (name, title, description) VALUES (?, ?, ?)")
            .bind(&name)
            .bind(title)
            .bind(description)
            .execute(&mut *conn)
            .await
            .map_err(|e| ForumError::from(e).conflict_as("topic already exists"))?
            .last_insert_rowid();

        info!(topic_id = id, name = %name, "Created topic");
        self.find_one(Some(&mut *conn), &[Filter::eq(TopicColumn::Id, id)])
            .await
    }
}
