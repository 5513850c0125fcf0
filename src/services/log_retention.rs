use crate::db::entities::security_logs;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{error, info};

/// Security log rows older than this are deleted.
pub const RETENTION_DAYS: i64 = 30;
const CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);

pub fn retention_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(RETENTION_DAYS)
}

/// Deletes expired rows from the security audit trail.
pub struct LogRetentionService {
    db: DatabaseConnection,
}

impl LogRetentionService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Starts the background cleanup task. Runs every hour.
    pub fn start_cleanup_runner(self: Arc<Self>) {
        tokio::spawn(async move {
            info!("Security log retention runner started.");
            loop {
                sleep(CLEANUP_INTERVAL).await;

                let cutoff = retention_cutoff(Utc::now());
                match security_logs::Entity::delete_many()
                    .filter(security_logs::Column::CreatedAt.lt(cutoff))
                    .exec(&self.db)
                    .await
                {
                    Ok(result) => {
                        if result.rows_affected > 0 {
                            info!(
                                "Deleted {} security log row(s) older than {}",
                                result.rows_affected, cutoff
                            );
                        }
                    }
                    Err(e) => {
                        error!("Failed to delete expired security logs: {:?}", e);
                    }
                }
            }
        });
    }
}
