//! Module manifest registry backed by `modules.json`.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::types::ModuleManifest;
use crate::core::validation::ManifestDraft;
use crate::error::{DevkitError, Result};
use crate::io::json_store::AtomicJsonStore;

pub struct ModuleRegistry {
    store: AtomicJsonStore,
    template: Option<PathBuf>,
}

impl ModuleRegistry {
    pub fn new(store: AtomicJsonStore) -> Self {
        Self {
            store,
            template: None,
        }
    }

    /// Seed the document from `template` on first use.
    pub fn with_template(mut self, template: impl Into<PathBuf>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn store(&self) -> &AtomicJsonStore {
        &self.store
    }

    /// Create the document if missing: template contents when it parses as a list, else `[]`.
    pub fn bootstrap(&self) -> Result<()> {
        let seeded = self
            .store
            .initialize_with(|| load_template(self.template.as_deref()))?;
        if seeded {
            info!(path = %self.store.path().display(), "module state initialized");
        }
        Ok(())
    }

    /// Stored manifests. Entries that do not decode as a manifest stay on disk but are not listed.
    pub fn list(&self) -> Result<Vec<ModuleManifest>> {
        self.bootstrap()?;
        let entries: Vec<Value> = self.store.read(Vec::new())?;
        Ok(entries.into_iter().filter_map(decode_manifest).collect())
    }

    pub fn contains(&self, module_id: &str) -> Result<bool> {
        Ok(self.list()?.iter().any(|module| module.id == module_id))
    }

    /// Validate and upsert a manifest by id. Nothing is written if validation fails.
    pub fn register(&self, draft: ManifestDraft) -> Result<ModuleManifest> {
        let manifest = draft.validate()?;
        self.bootstrap()?;
        let stored = serde_json::to_value(&manifest)?;
        let id = manifest.id.clone();
        let replaced = self.store.update(Vec::new(), move |entries: &mut Vec<Value>| {
            let before = entries.len();
            entries.retain(|entry| entry_id(entry) != Some(id.as_str()));
            let replaced = entries.len() != before;
            entries.push(stored);
            Ok(replaced)
        })?;
        info!(module_id = %manifest.id, version = %manifest.version, replaced, "module registered");
        Ok(manifest)
    }

    /// Remove a manifest by id.
    pub fn delete(&self, module_id: &str) -> Result<()> {
        self.bootstrap()?;
        self.store.update(Vec::new(), |entries: &mut Vec<Value>| {
            let before = entries.len();
            entries.retain(|entry| entry_id(entry) != Some(module_id));
            if entries.len() == before {
                return Err(DevkitError::NotFound("Module not found".to_string()));
            }
            Ok(())
        })?;
        info!(module_id, "module deleted");
        Ok(())
    }
}

/// `id`, or `name` for entries written without one.
fn entry_id(entry: &Value) -> Option<&str> {
    string_field(entry, "id").or_else(|| string_field(entry, "name"))
}

fn string_field<'a>(entry: &'a Value, key: &str) -> Option<&'a str> {
    entry.get(key).and_then(Value::as_str).filter(|value| !value.is_empty())
}

fn decode_manifest(entry: Value) -> Option<ModuleManifest> {
    match serde_json::from_value::<ModuleManifest>(entry) {
        Ok(manifest) => Some(manifest.normalized()),
        Err(err) => {
            debug!(error = %err, "skipping stored module entry");
            None
        }
    }
}

fn load_template(template: Option<&Path>) -> Vec<Value> {
    let Some(path) = template else {
        return Vec::new();
    };
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "module template unavailable");
            return Vec::new();
        }
    };
    match serde_json::from_str::<Value>(&contents) {
        Ok(Value::Array(items)) => items,
        Ok(_) => {
            warn!(path = %path.display(), "module template is not a list, seeding empty state");
            Vec::new()
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "module template is not valid json, seeding empty state");
            Vec::new()
        }
    }
}
