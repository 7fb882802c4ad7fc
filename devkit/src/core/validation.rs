//! Shape validation for registration and run requests.
//!
//! Validation runs before any state document is touched: a rejected request
//! never reaches the store.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core::types::ModuleManifest;
use crate::error::{DevkitError, Result};

pub const MAX_ID_LEN: usize = 128;

static SAFE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("safe id regex"));
static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+\.\d+\.\d+(-[a-zA-Z0-9.]+)?$").expect("version regex")
});

/// True when `value` is non-empty and only uses `[A-Za-z0-9_-]`.
pub fn is_safe_id(value: &str) -> bool {
    SAFE_ID_RE.is_match(value)
}

/// True when `value` looks like `MAJOR.MINOR.PATCH` with an optional `-prerelease`.
pub fn is_valid_version(value: &str) -> bool {
    VERSION_RE.is_match(value)
}

/// Unvalidated registration payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestDraft {
    pub name: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ManifestDraft {
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(DevkitError::Validation(
                "manifest must be a JSON object".to_string(),
            ));
        }
        serde_json::from_value(value)
            .map_err(|err| DevkitError::Validation(format!("invalid manifest: {err}")))
    }

    /// Check every constraint and produce the manifest to persist (`id` defaults to `name`).
    pub fn validate(self) -> Result<ModuleManifest> {
        let name = self
            .name
            .ok_or_else(|| DevkitError::Validation("name is required".to_string()))?;
        check_identifier("name", &name)?;

        let version = self
            .version
            .ok_or_else(|| DevkitError::Validation("version is required".to_string()))?;
        if !is_valid_version(&version) {
            return Err(DevkitError::Validation(format!(
                "version {version:?} must match MAJOR.MINOR.PATCH[-prerelease]"
            )));
        }

        let id = match self.id {
            Some(id) => {
                check_identifier("id", &id)?;
                id
            }
            None => name.clone(),
        };

        Ok(ModuleManifest {
            id,
            name,
            version,
            extra: self.extra,
        })
    }
}

/// Validated request to start a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub module_id: String,
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RunRequestDraft {
    #[serde(rename = "moduleId", alias = "module_id")]
    module_id: Option<String>,
    #[serde(default)]
    parameters: Option<Map<String, Value>>,
}

impl RunRequest {
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(DevkitError::Validation(
                "run request must be a JSON object".to_string(),
            ));
        }
        let draft: RunRequestDraft = serde_json::from_value(value)
            .map_err(|err| DevkitError::Validation(format!("invalid run request: {err}")))?;
        let module_id = draft
            .module_id
            .ok_or_else(|| DevkitError::Validation("moduleId is required".to_string()))?;
        if !is_safe_id(&module_id) {
            return Err(DevkitError::Validation(
                "moduleId must be alphanumeric with dashes/underscores only".to_string(),
            ));
        }
        Ok(Self {
            module_id,
            parameters: draft.parameters.unwrap_or_default(),
        })
    }
}

fn check_identifier(field: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.chars().count() > MAX_ID_LEN {
        return Err(DevkitError::Validation(format!(
            "{field} must be 1-{MAX_ID_LEN} characters"
        )));
    }
    if !is_safe_id(value) {
        return Err(DevkitError::Validation(format!(
            "{field} must be alphanumeric with dashes/underscores only"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validate(value: Value) -> Result<ModuleManifest> {
        ManifestDraft::from_value(value)?.validate()
    }

    #[test]
    fn id_defaults_to_name() {
        let manifest = validate(json!({"name": "test-module", "version": "1.0.0"})).expect("valid");
        assert_eq!(manifest.id, "test-module");
        assert!(manifest.extra.is_empty());
    }

    #[test]
    fn explicit_id_and_extra_fields_are_kept() {
        let manifest = validate(json!({
            "name": "display_name",
            "id": "mod_1",
            "version": "2.3.4-rc.1",
            "runtime": "python"
        }))
        .expect("valid");
        assert_eq!(manifest.id, "mod_1");
        assert_eq!(manifest.extra.get("runtime"), Some(&json!("python")));
    }

    #[test]
    fn rejects_traversal_in_name_and_id() {
        for bad in ["../evil", "a/b", "has space", "semi;colon", ""] {
            let err = validate(json!({"name": bad, "version": "1.0.0"})).unwrap_err();
            assert!(matches!(err, DevkitError::Validation(_)), "name {bad:?}");
            let err = validate(json!({"name": "ok", "id": bad, "version": "1.0.0"})).unwrap_err();
            assert!(matches!(err, DevkitError::Validation(_)), "id {bad:?}");
        }
    }

    #[test]
    fn rejects_overlong_name() {
        let long = "a".repeat(MAX_ID_LEN + 1);
        assert!(validate(json!({"name": long, "version": "1.0.0"})).is_err());
        let exact = "a".repeat(MAX_ID_LEN);
        assert!(validate(json!({"name": exact, "version": "1.0.0"})).is_ok());
    }

    #[test]
    fn version_pattern() {
        for good in ["0.0.1", "10.20.30", "1.0.0-alpha", "1.0.0-rc.1"] {
            assert!(is_valid_version(good), "{good}");
        }
        for bad in ["1.0", "v1.0.0", "1.0.0-", "1.0.0+build", "1.0.0-rc_1", ""] {
            assert!(!is_valid_version(bad), "{bad}");
        }
    }

    #[test]
    fn missing_version_is_rejected() {
        let err = validate(json!({"name": "ok-name"})).unwrap_err();
        assert_eq!(err.to_string(), "version is required");
    }

    #[test]
    fn non_object_manifest_is_rejected() {
        assert!(ManifestDraft::from_value(json!(["x"])).is_err());
        assert!(ManifestDraft::from_value(json!({"name": 5, "version": "1.0.0"})).is_err());
    }

    #[test]
    fn run_request_accepts_both_key_spellings() {
        let request = RunRequest::from_value(json!({"moduleId": "alpha"})).expect("camel");
        assert_eq!(request.module_id, "alpha");
        assert!(request.parameters.is_empty());

        let request = RunRequest::from_value(json!({
            "module_id": "beta",
            "parameters": {"k": 1}
        }))
        .expect("snake");
        assert_eq!(request.module_id, "beta");
        assert_eq!(request.parameters.get("k"), Some(&json!(1)));
    }

    #[test]
    fn run_request_rejects_unsafe_module_id() {
        let err = RunRequest::from_value(json!({"moduleId": "../x"})).unwrap_err();
        assert!(matches!(err, DevkitError::Validation(_)));
        assert!(RunRequest::from_value(json!({})).is_err());
    }
}
