use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::{debug, info};

use super::filter::{exactly_one, push_where, Column, Filter};
use super::models::User;
use super::Database;
use crate::error::{ForumError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserColumn {
    Id,
    Email,
}

impl Column for UserColumn {
    fn sql(self) -> &'static str {
        match self {
            Self::Id => "users.id",
            Self::Email => "users.email",
        }
    }
}

pub struct UserRepo<'a> {
    db: &'a Database,
}

impl<'a> UserRepo<'a> {
    pub(crate) const fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub async fn find(
        &self,
        tx: Option<&mut SqliteConnection>,
        filters: &[Filter<UserColumn>],
    ) -> Result<Vec<User>> {
        let mut conn = self.db.acquire(tx).await?;
        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT users.id, users.email, users.name, users.is_admin FROM users");
        push_where(&mut qb, filters);
        qb.push(" ORDER BY users.id");

        let users = qb.build_query_as::<User>().fetch_all(&mut *conn).await?;
        Ok(users)
    }

    pub async fn find_one(
        &self,
        tx: Option<&mut SqliteConnection>,
        filters: &[Filter<UserColumn>],
    ) -> Result<User> {
        exactly_one(self.find(tx, filters).await?)
    }

    /// Insert a new user. The email is stored lowercased and the name
    /// title-cased.
    pub async fn add(
        &self,
        tx: Option<&mut SqliteConnection>,
        email: &str,
        name: &str,
    ) -> Result<User> {
        let (email, name) = normalize_identity(email, name)?;

        let mut conn = self.db.acquire(tx).await?;
        let id = sqlx::query("INSERT INTO users (email, name) VALUES (?, ?)")
            .bind(&email)
            .bind(&name)
            .execute(&mut *conn)
            .await
            .map_err(|e| ForumError::from(e).conflict_as("user already exists"))?
            .last_insert_rowid();

        info!(user_id = id, email = %email, "Created user");
        self.find_one(Some(&mut *conn), &[Filter::eq(UserColumn::Id, id)])
            .await
    }

    /// Look a user up by email, creating them if this is their first login.
    pub async fn upsert_by_email(
        &self,
        mut tx: Option<&mut SqliteConnection>,
        email: &str,
        name: &str,
    ) -> Result<User> {
        let (email, _) = normalize_identity(email, name)?;
        let by_email = [Filter::eq(UserColumn::Email, email.as_str())];

        match self.find_one(tx.as_deref_mut(), &by_email).await {
            Ok(user) => return Ok(user),
            Err(ForumError::NotFound) => {}
            Err(e) => return Err(e),
        }

        match self.add(tx.as_deref_mut(), &email, name).await {
            // Lost a race with a concurrent first login.
            Err(ForumError::Conflict(_)) => {
                debug!(email = %email, "User created concurrently, re-reading");
                self.find_one(tx, &by_email).await
            }
            other => other,
        }
    }

    pub async fn update_admin(
        &self,
        tx: Option<&mut SqliteConnection>,
        user: &User,
        is_admin: bool,
    ) -> Result<User> {
        let mut conn = self.db.acquire(tx).await?;
        sqlx::query("UPDATE users SET is_admin = ? WHERE id = ?")
            .bind(is_admin)
            .bind(user.id)
            .execute(&mut *conn)
            .await?;

        info!(user_id = user.id, is_admin, "Updated admin flag");
        self.find_one(Some(&mut *conn), &[Filter::eq(UserColumn::Id, user.id)])
            .await
    }
}

fn normalize_identity(email: &str, name: &str) -> Result<(String, String)> {
    let email = email.trim();
    let name = name.trim();
    if email.is_empty() || name.is_empty() {
        return Err(ForumError::InvalidInput(
            "email and/or name cannot be empty".to_string(),
        ));
    }
    Ok((email.to_lowercase(), title_case(name)))
}

/// Uppercase the first letter of every whitespace-separated word.
fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}
