//! Background worker that purges expired sessions.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::db::{delete_expired_sessions, Database};

/// Run a single cleanup cycle.
async fn cleanup_once(db: &Database) {
    match delete_expired_sessions(db.pool()).await {
        Ok(count) => {
            if count > 0 {
                tracing::info!(expired_sessions = count, "Cleaned up expired sessions");
            }
        }
        Err(e) => {
            tracing::error!("Failed to delete expired sessions: {e}");
        }
    }
}

/// Run the cleanup worker: once on start, then every `interval` until
/// `shutdown` is cancelled.
pub async fn run_cleanup_worker(db: Database, interval: Duration, shutdown: CancellationToken) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        "Starting session cleanup worker"
    );

    cleanup_once(&db).await;

    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // first tick is immediate

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                cleanup_once(&db).await;
            }
            () = shutdown.cancelled() => {
                tracing::info!("Session cleanup worker shutting down");
                break;
            }
        }
    }
}
