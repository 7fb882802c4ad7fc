//! Test-only fixtures: manifest drafts, scripted probes and temp-dir configs.

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Map;

use crate::core::types::ServiceHealth;
use crate::core::validation::ManifestDraft;
use crate::io::config::{DatabaseConfig, DevkitConfig};
use crate::io::health::HealthProbe;

/// Registration payload with only `name` and `version` set.
pub fn draft(name: &str, version: &str) -> ManifestDraft {
    ManifestDraft {
        name: Some(name.to_string()),
        version: Some(version.to_string()),
        id: None,
        extra: Map::new(),
    }
}

/// Config rooted at `state_dir` with non-default credentials and no API key.
pub fn config_in(state_dir: &Path) -> DevkitConfig {
    DevkitConfig {
        state_dir: state_dir.to_path_buf(),
        openapi_path: state_dir.join("openapi.json"),
        module_template: None,
        database: DatabaseConfig {
            password: "devkit-test-pass".to_string(),
            ..DatabaseConfig::default()
        },
        s3_secret_key: "devkit-test-secret".to_string(),
        ..DevkitConfig::default()
    }
}

/// Probe that returns whatever health it was last given and counts calls.
pub struct ScriptedProbe {
    health: Mutex<ServiceHealth>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new(health: ServiceHealth) -> Self {
        Self {
            health: Mutex::new(health),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, health: ServiceHealth) {
        *self.health.lock().expect("probe health") = health;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn check(&self) -> ServiceHealth {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.health.lock().expect("probe health").clone()
    }
}
