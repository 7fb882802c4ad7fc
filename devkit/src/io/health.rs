//! Time-boxed cache over the downstream health probes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::core::types::{HealthSnapshot, ServiceHealth};

pub const HEALTH_TTL: Duration = Duration::from_secs(5);

/// A downstream dependency that can report its own health.
///
/// Implementations never fail: every problem is folded into an error status.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> ServiceHealth;
}

struct CachedHealth {
    snapshot: HealthSnapshot,
    checked_at: Instant,
}

/// Memoizes one [`HealthSnapshot`] for `ttl`.
///
/// The entry lock is held while probing, so concurrent callers that find the
/// cache stale wait for one refresh instead of probing in parallel.
pub struct HealthCache {
    postgres: Arc<dyn HealthProbe>,
    minio: Arc<dyn HealthProbe>,
    ttl: Duration,
    entry: Mutex<Option<CachedHealth>>,
}

impl HealthCache {
    pub fn new(postgres: Arc<dyn HealthProbe>, minio: Arc<dyn HealthProbe>) -> Self {
        Self {
            postgres,
            minio,
            ttl: HEALTH_TTL,
            entry: Mutex::new(None),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Cached snapshot if fresh, otherwise probe both dependencies and cache the result.
    pub async fn get(&self) -> HealthSnapshot {
        let mut entry = self.entry.lock().await;
        if let Some(cached) = entry.as_ref()
            && cached.checked_at.elapsed() < self.ttl
        {
            return cached.snapshot.clone();
        }

        let checked_at = Instant::now();
        let snapshot = HealthSnapshot {
            postgres: self.postgres.check().await,
            minio: self.minio.check().await,
        };
        debug!(
            postgres = ?snapshot.postgres.status,
            minio = ?snapshot.minio.status,
            "health snapshot refreshed"
        );
        *entry = Some(CachedHealth {
            snapshot: snapshot.clone(),
            checked_at,
        });
        snapshot
    }
}
