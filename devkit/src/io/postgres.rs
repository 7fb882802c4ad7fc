//! Relational-store liveness probe.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::types::ServiceHealth;
use crate::io::config::DatabaseConfig;
use crate::io::health::HealthProbe;

/// Upper bound for obtaining a connection during a probe.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const MAX_CONNECTIONS: u32 = 10;

pub const CONNECTION_FAILED: &str = "Database connection failed";
pub const INTERFACE_ERROR: &str = "Database interface error";
pub const DATABASE_ERROR: &str = "Database error";

/// Probes Postgres with `SELECT 1` through a lazily connected pool.
///
/// The pool is created on [`PostgresProbe::open`] or on the first check, and
/// recreated by a check that finds it missing or closed.
pub struct PostgresProbe {
    options: PgConnectOptions,
    pool: Mutex<Option<PgPool>>,
}

impl PostgresProbe {
    pub fn new(config: &DatabaseConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.name)
            .username(&config.user)
            .password(&config.password);
        Self {
            options,
            pool: Mutex::new(None),
        }
    }

    /// Create the pool without connecting. Connections are made on demand.
    pub async fn open(&self) {
        let mut pool = self.pool.lock().await;
        if pool.as_ref().is_none_or(|existing| existing.is_closed()) {
            *pool = Some(self.lazy_pool());
            info!("postgres pool opened");
        }
    }

    pub async fn close(&self) {
        let pool = self.pool.lock().await.take();
        if let Some(pool) = pool {
            pool.close().await;
            info!("postgres pool closed");
        }
    }

    pub async fn is_open(&self) -> bool {
        self.pool
            .lock()
            .await
            .as_ref()
            .is_some_and(|pool| !pool.is_closed())
    }

    async fn pool(&self) -> PgPool {
        let mut pool = self.pool.lock().await;
        match pool.as_ref() {
            Some(existing) if !existing.is_closed() => existing.clone(),
            _ => {
                debug!("postgres pool missing or closed, reopening");
                let fresh = self.lazy_pool();
                *pool = Some(fresh.clone());
                fresh
            }
        }
    }

    fn lazy_pool(&self) -> PgPool {
        PgPoolOptions::new()
            .min_connections(0)
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect_lazy_with(self.options.clone())
    }
}

#[async_trait]
impl HealthProbe for PostgresProbe {
    async fn check(&self) -> ServiceHealth {
        let pool = self.pool().await;
        match sqlx::query("SELECT 1").execute(&pool).await {
            Ok(_) => ServiceHealth::ok(),
            Err(err) => {
                warn!(error = %err, "postgres health check failed");
                ServiceHealth::error(failure_message(&err))
            }
        }
    }
}

/// Map a driver error to the caller-facing probe message.
pub fn failure_message(err: &sqlx::Error) -> &'static str {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => CONNECTION_FAILED,
        sqlx::Error::Protocol(_) => INTERFACE_ERROR,
        _ => DATABASE_ERROR,
    }
}
