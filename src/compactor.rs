use std::time::Duration;

use tracing::{debug, info, warn};

use crate::store::WalStore;

pub const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that compacts the WAL once enough appends pile up.
/// Exits when the store's writer is gone.
pub async fn run_compactor(store: WalStore, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        match compact_if_needed(&store, threshold).await {
            Ok(true) => info!("compacted WAL"),
            Ok(false) => {}
            Err(e) => {
                warn!("compactor stopping: {e}");
                return;
            }
        }
    }
}

/// Returns whether a compaction ran.
pub async fn compact_if_needed(
    store: &WalStore,
    threshold: u64,
) -> Result<bool, crate::store::StoreError> {
    let appends = store.appends_since_compact().await?;
    if appends < threshold {
        debug!("compactor skip: {appends} appends < {threshold}");
        return Ok(false);
    }
    store.compact().await?;
    Ok(true)
}
