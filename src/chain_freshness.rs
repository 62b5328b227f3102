use crate::errors::SidecarError;
use crate::settings::ChainConfig;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Anything that can report the node's latest committed height.
#[async_trait]
pub trait HeightSource: Send + Sync {
    async fn latest_height(&self) -> anyhow::Result<u64>;
}

/// In-process height store fed by the ingest side.
///
/// Heights only move forward; a regression is logged and dropped so a
/// lagging publisher cannot rewind consumers.
#[derive(Debug, Default)]
pub struct ChainHeightStore {
    height: AtomicU64,
}

impl ChainHeightStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_height(&self, height: u64) {
        let prev = self.height.fetch_max(height, Ordering::Relaxed);
        if height < prev {
            warn!("Ignoring chain height regression: stored {prev}, got {height}");
        } else if height > prev {
            debug!("Recorded chain height {height}");
        }
    }

    pub fn latest(&self) -> u64 {
        self.height.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl HeightSource for ChainHeightStore {
    async fn latest_height(&self) -> anyhow::Result<u64> {
        Ok(self.latest())
    }
}

struct LastSeen {
    height: u64,
    updated_at: Instant,
}

/// Rejects reads from a node that has stopped advancing.
///
/// One instance guards the whole process. It remembers the last height it
/// saw advance and when; a height that stops moving for longer than the
/// configured delta turns every check into a stale-height error until the
/// chain catches up again.
pub struct ChainFreshnessGuard {
    source: Arc<dyn HeightSource>,
    last_seen: Mutex<Option<LastSeen>>,
    max_allowed: Duration,
    check_timeout: Duration,
}

impl ChainFreshnessGuard {
    pub fn new(source: Arc<dyn HeightSource>, config: &ChainConfig) -> Self {
        Self {
            source,
            last_seen: Mutex::new(None),
            max_allowed: Duration::from_secs(config.max_allowed_height_update_delta_secs),
            check_timeout: Duration::from_millis(config.check_timeout_ms),
        }
    }

    /// Returns the latest chain height if the node is keeping up.
    ///
    /// 1. Height advanced since the last check: record (height, now) and return it.
    /// 2. Height unchanged within the allowed delta: return it, recorded state untouched.
    /// 3. Height unchanged past the allowed delta: stale-height error carrying the
    ///    stored height and elapsed seconds; recorded state stays untouched so the
    ///    condition persists until the chain advances.
    ///
    /// The source fetch runs under its own timeout, which surfaces as a
    /// distinct error rather than as staleness.
    pub async fn get_latest_height(&self) -> Result<u64, SidecarError> {
        let observed = tokio::time::timeout(self.check_timeout, self.source.latest_height())
            .await
            .map_err(|_| SidecarError::HeightCheckTimeout {
                timeout_ms: self.check_timeout.as_millis() as u64,
            })?
            .map_err(SidecarError::HeightSource)?;

        let mut last_seen = self.last_seen.lock().await;
        let now = Instant::now();
        match last_seen.as_mut() {
            Some(last) if observed > last.height => {
                last.height = observed;
                last.updated_at = now;
                Ok(observed)
            }
            Some(last) => {
                let elapsed = now.duration_since(last.updated_at);
                if elapsed > self.max_allowed {
                    Err(SidecarError::StaleHeight {
                        stored_height: last.height,
                        time_since_last_update_secs: elapsed.as_secs(),
                        max_allowed_time_delta_secs: self.max_allowed.as_secs(),
                    })
                } else {
                    Ok(observed)
                }
            }
            None => {
                *last_seen = Some(LastSeen {
                    height: observed,
                    updated_at: now,
                });
                Ok(observed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct HangingSource;

    #[async_trait]
    impl HeightSource for HangingSource {
        async fn latest_height(&self) -> anyhow::Result<u64> {
            futures::future::pending().await
        }
    }

    struct FailingSource;

    #[async_trait]
    impl HeightSource for FailingSource {
        async fn latest_height(&self) -> anyhow::Result<u64> {
            anyhow::bail!("node unreachable")
        }
    }

    fn guard_over(store: Arc<ChainHeightStore>) -> ChainFreshnessGuard {
        ChainFreshnessGuard::new(store, &ChainConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn advancing_height_stays_fresh() {
        let store = Arc::new(ChainHeightStore::new());
        let guard = guard_over(store.clone());

        store.record_height(100);
        assert_eq!(guard.get_latest_height().await.unwrap(), 100);

        tokio::time::advance(Duration::from_secs(40)).await;
        store.record_height(101);
        assert_eq!(guard.get_latest_height().await.unwrap(), 101);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_height_within_delta_is_fresh() {
        let store = Arc::new(ChainHeightStore::new());
        let guard = guard_over(store.clone());

        store.record_height(100);
        assert_eq!(guard.get_latest_height().await.unwrap(), 100);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(guard.get_latest_height().await.unwrap(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_height_past_delta_is_stale_until_chain_advances() {
        let store = Arc::new(ChainHeightStore::new());
        let guard = guard_over(store.clone());

        store.record_height(100);
        assert_eq!(guard.get_latest_height().await.unwrap(), 100);

        tokio::time::advance(Duration::from_secs(31)).await;
        let err = guard.get_latest_height().await.unwrap_err();
        assert!(err.is_stale_height());
        assert_eq!(
            err.to_string(),
            "height (100) is stale, time since last update (31), max allowed (30)"
        );

        // The failed check must not refresh the recorded state, so the same
        // height stays stale on the next check.
        let err = guard.get_latest_height().await.unwrap_err();
        assert!(err.is_stale_height());

        store.record_height(101);
        assert_eq!(guard.get_latest_height().await.unwrap(), 101);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_source_times_out() {
        let guard = ChainFreshnessGuard::new(Arc::new(HangingSource), &ChainConfig::default());
        let err = guard.get_latest_height().await.unwrap_err();
        assert_eq!(err.to_string(), "height check timed out after 5000ms");
    }

    #[tokio::test]
    async fn source_failure_is_not_staleness() {
        let guard = ChainFreshnessGuard::new(Arc::new(FailingSource), &ChainConfig::default());
        let err = guard.get_latest_height().await.unwrap_err();
        assert!(!err.is_stale_height());
        assert_eq!(err.to_string(), "height source: node unreachable");
    }

    #[test]
    fn store_ignores_height_regression() {
        let store = ChainHeightStore::new();
        store.record_height(100);
        store.record_height(50);
        assert_eq!(store.latest(), 100);
        store.record_height(101);
        assert_eq!(store.latest(), 101);
    }
}
