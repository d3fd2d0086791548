use sqlx::SqliteConnection;
use tracing::{debug, info};

use super::filter::Column;
use super::models::{Post, User};
use super::Database;
use crate::error::{ForumError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteColumn {
    UserId,
    PostId,
}

impl Column for VoteColumn {
    fn sql(self) -> &'static str {
        match self {
            Self::UserId => "post_votes.user_id",
            Self::PostId => "post_votes.post_id",
        }
    }
}

/// One row per (user, post) upvote. Scores are aggregated from these rows
/// whenever a post is read.
pub struct VoteLedger<'a> {
    db: &'a Database,
}

impl<'a> VoteLedger<'a> {
    pub(crate) const fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Record `user`'s vote on `post`. A second vote for the same pair fails
    /// with `Conflict` from the primary key, with no read beforehand.
    pub async fn add_vote(
        &self,
        tx: Option<&mut SqliteConnection>,
        post: &Post,
        user: &User,
    ) -> Result<()> {
        let mut conn = self.db.acquire(tx).await?;
        sqlx::query("INSERT INTO post_votes (user_id, post_id) VALUES (?, ?)")
            .bind(user.id)
            .bind(post.id)
            .execute(&mut *conn)
            .await
            .map_err(|e| ForumError::from(e).conflict_as("vote already cast"))?;

        info!(post_id = post.id, user_id = user.id, "Vote added");
        Ok(())
    }

    /// Withdraw a vote. Removing a vote that was never cast is a no-op.
    pub async fn remove_vote(
        &self,
        tx: Option<&mut SqliteConnection>,
        post: &Post,
        user: &User,
    ) -> Result<()> {
        let mut conn = self.db.acquire(tx).await?;
        let removed = sqlx::query("DELETE FROM post_votes WHERE user_id = ? AND post_id = ?")
            .bind(user.id)
            .bind(post.id)
            .execute(&mut *conn)
            .await?
            .rows_affected();

        debug!(post_id = post.id, user_id = user.id, removed, "Vote removed");
        Ok(())
    }
}
