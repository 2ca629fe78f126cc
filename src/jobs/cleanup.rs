//! Background job: tombstone retention.
//!
//! Runs hourly. Workers tombstoned longer than the retention period are
//! physically removed together with their credentials, and credentials that
//! are already past `expires_at` are swept so they do not linger until their
//! next presentation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time;

use crate::store::ForgeStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub workers: u64,
    pub credentials: u64,
}

/// Spawn the background cleanup task. Call this once at startup.
pub fn spawn(store: Arc<dyn ForgeStore>, retention_days: u32) {
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(3600)); // every hour
        loop {
            interval.tick().await;
            if let Err(e) = purge(store.as_ref(), retention_days).await {
                tracing::error!("cleanup job failed: {}", e);
            }
        }
    });
}

/// One retention pass.
pub async fn purge(store: &dyn ForgeStore, retention_days: u32) -> anyhow::Result<PurgeReport> {
    let now = Utc::now();
    // A cutoff before the representable range means no tombstone is old enough.
    let cutoff = chrono::Duration::try_days(i64::from(retention_days))
        .and_then(|retention| now.checked_sub_signed(retention));

    let workers = match cutoff {
        Some(cutoff) => store.purge_workers(cutoff).await?,
        None => 0,
    };
    if workers > 0 {
        tracing::info!(rows = workers, retention_days, "purged tombstoned workers");
    }

    let credentials = store.delete_expired_credentials(now).await?;
    if credentials > 0 {
        tracing::info!(rows = credentials, "deleted expired credentials");
    }

    Ok(PurgeReport {
        workers,
        credentials,
    })
}
