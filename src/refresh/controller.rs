//! One refresh cycle with bounded retries and automatic rollback.
//!
//! Each attempt takes a fresh snapshot, pulls everything from the gateway,
//! and commits through the store's chunked update. On failure the snapshot
//! is restored and the attempt backs off exponentially; the first success
//! returns immediately. The snapshot is an explicit value moved through the
//! attempt, never shared state captured by a closure.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};

use crate::provider::CatalogGateway;
use crate::store::CatalogStore;

/// Retry settings for a refresh cycle.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts before the cycle reports failure.
    pub max_retries: u32,
    /// Base backoff; attempt `n` waits `retry_delay * 2^n`.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(60),
        }
    }
}

/// Backoff before the attempt after `attempt` (0-based).
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * 2u32.saturating_pow(attempt)
}

/// Execute one refresh cycle against `gateway`, committing into `store`.
///
/// Returns `Ok(())` on the first successful attempt. After `max_retries`
/// failed attempts the last error is surfaced to the caller; the store is
/// left restored to the snapshot of the final attempt.
pub async fn run_refresh_cycle(
    gateway: &dyn CatalogGateway,
    store: &CatalogStore,
    policy: &RetryPolicy,
) -> Result<()> {
    let mut last_error = None;

    for attempt in 0..policy.max_retries {
        let snapshot = store.snapshot();

        match try_refresh(gateway, store).await {
            Ok(catalog_count) => {
                info!(attempt = attempt + 1, catalog_count, "Refresh completed");
                return Ok(());
            }
            Err(e) => {
                error!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    error = %e,
                    "Refresh attempt failed"
                );

                // Roll back whatever the failed attempt committed. The
                // restore outcome is logged on its own; it never replaces
                // the original error.
                store.restore(snapshot);
                info!("Restored previous cache state");

                last_error = Some(e);

                if attempt + 1 < policy.max_retries {
                    let wait = backoff_delay(policy.retry_delay, attempt);
                    info!(
                        wait_secs = wait.as_secs(),
                        next_attempt = attempt + 2,
                        "Backing off before next refresh attempt"
                    );
                    tokio::time::sleep(wait).await;
                } else {
                    warn!("All refresh attempts exhausted");
                }
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| anyhow::anyhow!("refresh cycle ran zero attempts"))
        .context("refresh cycle failed"))
}

/// A single attempt: fetch everything, commit catalogs in chunks, then swap
/// in the new manifest. Returns the number of catalogs committed.
async fn try_refresh(gateway: &dyn CatalogGateway, store: &CatalogStore) -> Result<usize> {
    let fetch = gateway
        .fetch_all_catalogs()
        .await
        .context("failed to fetch catalogs from upstream")?;

    if fetch.catalogs.is_empty() {
        bail!("no catalogs retrieved");
    }

    let count = fetch.catalogs.len();
    store
        .update_catalogs(fetch.catalogs)
        .context("catalog commit failed")?;
    store.set_manifest(fetch.manifest);

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CatalogEntry, CatalogItem, ChangeLogEntry, Manifest, MetaRecord};
    use crate::provider::CatalogFetch;
    use crate::store::DEFAULT_CHUNK_SIZE;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Gateway that fails a configurable number of times before succeeding.
    struct FlakyGateway {
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakyGateway {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CatalogGateway for FlakyGateway {
        async fn fetch_all_catalogs(&self) -> anyhow::Result<CatalogFetch> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                anyhow::bail!("upstream unavailable");
            }

            let mut catalogs = HashMap::new();
            catalogs.insert(
                "netflix.popular.movie".to_string(),
                CatalogEntry {
                    items: vec![CatalogItem {
                        id: "tt1".to_string(),
                        year: Some(2020),
                        genres: vec!["Drama".to_string()],
                    }],
                },
            );

            Ok(CatalogFetch {
                manifest: Manifest {
                    name: "Upstream".to_string(),
                    version: "1.0.0".to_string(),
                    ..Default::default()
                },
                catalogs,
            })
        }

        async fn resolve_metas(
            &self,
            _ids: &[String],
        ) -> anyhow::Result<HashMap<String, MetaRecord>> {
            Ok(HashMap::new())
        }

        async fn simplified_genre(&self, _genre: &str) -> Option<String> {
            None
        }

        async fn recent_changes(&self) -> anyhow::Result<Vec<ChangeLogEntry>> {
            Ok(Vec::new())
        }
    }

    /// Gateway whose catalog set is empty, which must count as a failure.
    struct EmptyGateway;

    #[async_trait]
    impl CatalogGateway for EmptyGateway {
        async fn fetch_all_catalogs(&self) -> anyhow::Result<CatalogFetch> {
            Ok(CatalogFetch::default())
        }

        async fn resolve_metas(
            &self,
            _ids: &[String],
        ) -> anyhow::Result<HashMap<String, MetaRecord>> {
            Ok(HashMap::new())
        }

        async fn simplified_genre(&self, _genre: &str) -> Option<String> {
            None
        }

        async fn recent_changes(&self) -> anyhow::Result<Vec<ChangeLogEntry>> {
            Ok(Vec::new())
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            retry_delay: Duration::from_secs(60),
        }
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let base = Duration::from_secs(60);
        assert_eq!(backoff_delay(base, 0), Duration::from_secs(60));
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(120));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(240));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_two_failures_with_expected_backoff() {
        let gateway = FlakyGateway::new(2);
        let store = CatalogStore::new(DEFAULT_CHUNK_SIZE);
        let started = tokio::time::Instant::now();

        run_refresh_cycle(&gateway, &store, &fast_policy())
            .await
            .unwrap();

        assert_eq!(gateway.calls(), 3);
        // Backoffs of 60s and 120s only; no sleep after the final attempt.
        assert_eq!(started.elapsed(), Duration::from_secs(180));
        assert!(store.get("netflix.popular.movie").is_some());
        assert_eq!(store.manifest().version, "1.0.0");
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_restore_snapshot_and_fail() {
        let gateway = FlakyGateway::new(u32::MAX);
        let store = CatalogStore::new(DEFAULT_CHUNK_SIZE);

        let mut seeded = HashMap::new();
        seeded.insert(
            "seeded.catalog".to_string(),
            CatalogEntry {
                items: vec![CatalogItem {
                    id: "tt0".to_string(),
                    year: None,
                    genres: Vec::new(),
                }],
            },
        );
        store.update_catalogs(seeded).unwrap();

        let result = run_refresh_cycle(&gateway, &store, &fast_policy()).await;
        assert!(result.is_err());
        assert_eq!(gateway.calls(), 3);

        // Pre-cycle contents intact.
        assert_eq!(store.catalog_count(), 1);
        assert!(store.get("seeded.catalog").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_catalog_set_is_a_failure() {
        let store = CatalogStore::new(DEFAULT_CHUNK_SIZE);
        let result = run_refresh_cycle(&EmptyGateway, &store, &fast_policy()).await;

        let err = format!("{:#}", result.unwrap_err());
        assert!(err.contains("no catalogs retrieved"));
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_returns_without_backoff() {
        let gateway = FlakyGateway::new(0);
        let store = CatalogStore::new(DEFAULT_CHUNK_SIZE);
        let started = tokio::time::Instant::now();

        run_refresh_cycle(&gateway, &store, &fast_policy())
            .await
            .unwrap();

        assert_eq!(gateway.calls(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
