use std::time::Duration;

use metrics::counter;
use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use vanish_domain::{
    config::ConfigError,
    services::telemetry::TelemetryError,
    storage::{RecordStore, StorageError},
};

#[derive(Debug, Error)]
pub enum SweeperError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

/// Deletes every lapsed key once and reports how many went away.
pub async fn sweep_once<S>(store: &S) -> Result<u64, SweeperError>
where
    S: RecordStore + ?Sized,
{
    match store.purge_expired().await {
        Ok(purged) => {
            counter!("sweeper_runs_total", "result" => "ok").increment(1);
            counter!("sweeper_purged_keys_total").increment(purged);
            if purged > 0 {
                info!(purged, "purged lapsed records");
            } else {
                debug!("no lapsed records");
            }
            Ok(purged)
        }
        Err(err) => {
            counter!("sweeper_runs_total", "result" => "error").increment(1);
            Err(err.into())
        }
    }
}

/// Sweeps every `period` forever. A failed pass is logged and retried on
/// the next tick.
pub async fn run_sweeper<S>(period: Duration, store: &S) -> Result<(), SweeperError>
where
    S: RecordStore + ?Sized,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(?period, "sweeper started");

    loop {
        ticker.tick().await;
        if let Err(err) = sweep_once(store).await {
            warn!(%err, "sweep failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use vanish_domain::storage::{
        Fields, KeyTtl, RecordKey, StorageResult, StoreOp, WatchedKey,
    };
    use vanish_storage::SeaOrmStorage;

    use super::*;

    async fn storage() -> SeaOrmStorage {
        SeaOrmStorage::builder()
            .database_url("sqlite::memory:")
            .max_connections(1)
            .build()
            .await
            .expect("storage inits")
    }

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(field, value)| (field.to_string(), value.to_string()))
            .collect()
    }

    /// Store whose purge always fails after counting the attempt.
    #[derive(Default)]
    struct FailingStore {
        purges: AtomicU32,
    }

    #[async_trait]
    impl RecordStore for FailingStore {
        async fn hgetall(&self, _key: &RecordKey) -> StorageResult<Option<Fields>> {
            Ok(None)
        }

        async fn hget(&self, _key: &RecordKey, _field: &str) -> StorageResult<Option<String>> {
            Ok(None)
        }

        async fn ttl(&self, _key: &RecordKey) -> StorageResult<KeyTtl> {
            Ok(KeyTtl::Missing)
        }

        async fn version(&self, _key: &RecordKey) -> StorageResult<Option<u64>> {
            Ok(None)
        }

        async fn execute(&self, _ops: Vec<StoreOp>, _watched: Vec<WatchedKey>) -> StorageResult<()> {
            Ok(())
        }

        async fn purge_expired(&self) -> StorageResult<u64> {
            self.purges.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Database("database is locked".into()))
        }
    }

    #[tokio::test]
    async fn purges_only_lapsed_keys() {
        let storage = storage().await;
        let lapsed = RecordKey::from("custom_domain:old:object");
        let live = RecordKey::from("custom_domain:new:object");
        let persistent = RecordKey::from("customer:cust-1:custom_domains");

        storage.hset(&lapsed, fields(&[("display_domain", "old.example.com")])).await.unwrap();
        storage.expire(&lapsed, Duration::from_millis(1)).await.unwrap();
        storage.hset(&live, fields(&[("display_domain", "new.example.com")])).await.unwrap();
        storage.expire(&live, Duration::from_secs(3_600)).await.unwrap();
        storage.hset(&persistent, fields(&[("new.example.com", "new")])).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(sweep_once(&storage).await.unwrap(), 1);
        assert_eq!(storage.ttl(&lapsed).await.unwrap(), KeyTtl::Missing);
        assert!(storage.exists(&live).await.unwrap());
        assert_eq!(storage.ttl(&persistent).await.unwrap(), KeyTtl::Persistent);

        assert_eq!(sweep_once(&storage).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn surfaces_store_failures() {
        let store = FailingStore::default();
        let err = sweep_once(&store).await.unwrap_err();
        assert!(matches!(err, SweeperError::Storage(_)));
        assert_eq!(store.purges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_running_after_failed_pass() {
        let store = FailingStore::default();
        let result = tokio::time::timeout(
            Duration::from_secs(125),
            run_sweeper(Duration::from_secs(60), &store),
        )
        .await;
        assert!(result.is_err(), "sweeper loop never returns");
        // Ticks at 0s, 60s and 120s.
        assert_eq!(store.purges.load(Ordering::SeqCst), 3);
    }
}
