//! Shared application state for the API server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use devkit::io::context::DevkitContext;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<DevkitContext>,
    /// `None` means open mode: mutating routes accept any caller.
    pub api_key: Option<ApiKey>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(ctx: Arc<DevkitContext>) -> Self {
        let config = ctx.config();
        let api_key = config.api_key().map(ApiKey::new);
        if api_key.is_none() {
            info!("DEVKIT_API_KEY not set, mutating routes are open");
        }
        let limiter = Arc::new(RateLimiter::new(config.rate_limit_rpm));
        Self {
            ctx,
            api_key,
            limiter,
        }
    }
}

/// Configured shared secret, kept only as a SHA-256 digest.
#[derive(Clone)]
pub struct ApiKey {
    digest: [u8; 32],
}

impl ApiKey {
    pub fn new(secret: &str) -> Self {
        Self {
            digest: Sha256::digest(secret.as_bytes()).into(),
        }
    }

    /// Compare digests so timing does not depend on where the inputs differ.
    pub fn matches(&self, presented: &str) -> bool {
        let presented: [u8; 32] = Sha256::digest(presented.as_bytes()).into();
        ct_eq(&self.digest, &presented)
    }
}

fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

/// A bucket idle this long has refilled completely and can be forgotten.
const REFILL_WINDOW: Duration = Duration::from_secs(60);

/// Per-caller token bucket. `rpm == 0` disables limiting.
pub struct RateLimiter {
    rpm: u32,
    buckets: Mutex<Buckets>,
}

struct Buckets {
    by_caller: HashMap<String, Bucket>,
    last_sweep: Instant,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(rpm: u32) -> Self {
        if rpm == 0 {
            info!("rate limiting disabled");
        } else {
            info!(rpm, "rate limiter initialized");
        }
        Self {
            rpm,
            buckets: Mutex::new(Buckets {
                by_caller: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    pub fn rpm(&self) -> u32 {
        self.rpm
    }

    pub fn try_acquire(&self, caller: &str) -> bool {
        if self.rpm == 0 {
            return true;
        }
        self.acquire_at(caller, Instant::now())
    }

    fn acquire_at(&self, caller: &str, now: Instant) -> bool {
        let capacity = f64::from(self.rpm);
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        if now.duration_since(buckets.last_sweep) >= REFILL_WINDOW {
            let before = buckets.by_caller.len();
            buckets
                .by_caller
                .retain(|_, bucket| now.duration_since(bucket.last_refill) < REFILL_WINDOW);
            buckets.last_sweep = now;
            debug!(dropped = before - buckets.by_caller.len(), "idle rate-limit buckets swept");
        }
        let bucket = buckets.by_caller.entry(caller.to_string()).or_insert(Bucket {
            tokens: capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        let refill = elapsed * capacity / REFILL_WINDOW.as_secs_f64();
        bucket.tokens = (bucket.tokens + refill).min(capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
