//! Persisted and wire-level record types.
//!
//! Field names follow the JSON documents on disk (`modules.json`, `runs.json`)
//! and the HTTP payloads, so these types must stay serialization-stable.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A registered module manifest.
///
/// Known fields are typed; any other keys supplied at registration are kept in
/// `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleManifest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModuleManifest {
    /// Fill in `id` from `name` for records written without one (e.g. seed templates).
    pub fn normalized(mut self) -> Self {
        if self.id.is_empty() {
            self.id = self.name.clone();
        }
        self
    }
}

/// Lifecycle status of a run. The stub completes every run synchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub status: ResultStatus,
    pub summary: Map<String, Value>,
}

/// One invocation record of a module (`runs.json` value).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRun {
    pub run_id: String,
    pub module_id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    pub result: RunResult,
    /// Unix timestamp in seconds (fractional).
    pub created_at: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Ok,
    Error,
}

/// Result of a single downstream health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: ProbeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ServiceHealth {
    pub fn ok() -> Self {
        Self {
            status: ProbeStatus::Ok,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ProbeStatus::Error,
            message: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ProbeStatus::Ok
    }
}

/// Probe results for both downstream dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub postgres: ServiceHealth,
    pub minio: ServiceHealth,
}

/// Overall readiness verdict derived from a [`HealthSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Readiness {
    Ready,
    Degraded,
}
