//! Mocked module runs backed by `runs.json`.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::types::{ModuleRun, ResultStatus, RunResult, RunStatus};
use crate::core::validation::RunRequest;
use crate::error::{DevkitError, Result};
use crate::io::json_store::AtomicJsonStore;
use crate::io::registry::ModuleRegistry;

pub const RUN_ID_PREFIX: &str = "devkit-run-";
pub const STUB_SUMMARY: &str = "Devkit stub executed successfully";

/// Stored as raw values so one undecodable record never hides the rest.
type RunMap = BTreeMap<String, Value>;

pub struct RunLog {
    store: AtomicJsonStore,
}

impl RunLog {
    pub fn new(store: AtomicJsonStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &AtomicJsonStore {
        &self.store
    }

    /// Record a run for a registered module. The stub completes it immediately.
    pub fn start(&self, registry: &ModuleRegistry, request: RunRequest) -> Result<ModuleRun> {
        if !registry.contains(&request.module_id)? {
            return Err(DevkitError::NotFound(
                "Module not registered in devkit".to_string(),
            ));
        }

        let run = ModuleRun {
            run_id: new_run_id(),
            module_id: request.module_id,
            status: RunStatus::Completed,
            parameters: request.parameters,
            result: stub_result(),
            created_at: unix_now(),
        };
        let run = self.store.update(RunMap::new(), move |runs: &mut RunMap| {
            insert_new(runs, run, new_run_id)
        })?;
        info!(run_id = %run.run_id, module_id = %run.module_id, "module run recorded");
        Ok(run)
    }

    pub fn get(&self, run_id: &str) -> Result<ModuleRun> {
        let mut runs: RunMap = self.store.read(RunMap::new())?;
        let not_found = || DevkitError::NotFound("Run not found".to_string());
        let entry = runs.remove(run_id).ok_or_else(not_found)?;
        serde_json::from_value(entry).map_err(|err| {
            debug!(run_id, error = %err, "stored run record does not decode");
            not_found()
        })
    }

    pub fn result(&self, run_id: &str) -> Result<RunResult> {
        Ok(self.get(run_id)?.result)
    }

    pub fn count(&self) -> Result<usize> {
        let runs: RunMap = self.store.read(RunMap::new())?;
        Ok(runs.len())
    }
}

/// Insert `run` under a fresh id; existing runs are never overwritten.
fn insert_new(
    runs: &mut RunMap,
    mut run: ModuleRun,
    mut next_id: impl FnMut() -> String,
) -> Result<ModuleRun> {
    while runs.contains_key(&run.run_id) {
        debug!(run_id = %run.run_id, "run id collision, regenerating");
        run.run_id = next_id();
    }
    runs.insert(run.run_id.clone(), serde_json::to_value(&run)?);
    Ok(run)
}

fn new_run_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{RUN_ID_PREFIX}{}", &hex[..8])
}

fn stub_result() -> RunResult {
    let mut summary = Map::new();
    summary.insert("message".to_string(), Value::from(STUB_SUMMARY));
    RunResult {
        status: ResultStatus::Success,
        summary,
    }
}

fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
