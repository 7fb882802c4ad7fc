//! Application context: every long-lived resource, built once at startup.

use std::fs;
use std::sync::Arc;

use tracing::info;

use crate::core::types::HealthSnapshot;
use crate::error::{DevkitError, Result};
use crate::io::config::{DevkitConfig, StatePaths};
use crate::io::health::{HealthCache, HealthProbe};
use crate::io::json_store::{AtomicJsonStore, CorruptStatePolicy};
use crate::io::object_store::{ObjectStoreProbe, ReqwestTransport};
use crate::io::postgres::PostgresProbe;
use crate::io::registry::ModuleRegistry;
use crate::io::run_log::RunLog;

pub struct DevkitContext {
    config: DevkitConfig,
    paths: StatePaths,
    registry: ModuleRegistry,
    runs: RunLog,
    health: HealthCache,
    postgres: Option<Arc<PostgresProbe>>,
}

impl DevkitContext {
    /// Validate the config, prepare state and connect the real probes.
    ///
    /// Fails before touching disk if credentials are insecure or a state path
    /// escapes the state dir.
    pub async fn open(config: DevkitConfig) -> Result<Self> {
        let (paths, registry, runs) = prepare_state(&config)?;

        let postgres = Arc::new(PostgresProbe::new(&config.database));
        postgres.open().await;
        let minio = ObjectStoreProbe::new(config.minio_health_url.clone(), ReqwestTransport::new()?);
        let health = HealthCache::new(postgres.clone(), Arc::new(minio));

        Ok(Self {
            config,
            paths,
            registry,
            runs,
            health,
            postgres: Some(postgres),
        })
    }

    /// Same startup checks as [`DevkitContext::open`], with caller-supplied probes.
    pub fn with_probes(
        config: DevkitConfig,
        postgres: Arc<dyn HealthProbe>,
        minio: Arc<dyn HealthProbe>,
    ) -> Result<Self> {
        let (paths, registry, runs) = prepare_state(&config)?;
        Ok(Self {
            config,
            paths,
            registry,
            runs,
            health: HealthCache::new(postgres, minio),
            postgres: None,
        })
    }

    pub fn config(&self) -> &DevkitConfig {
        &self.config
    }

    pub fn paths(&self) -> &StatePaths {
        &self.paths
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn runs(&self) -> &RunLog {
        &self.runs
    }

    pub async fn health(&self) -> HealthSnapshot {
        self.health.get().await
    }

    /// Release pooled connections. Later health checks reopen lazily.
    pub async fn close(&self) {
        if let Some(postgres) = &self.postgres {
            postgres.close().await;
        }
    }
}

fn prepare_state(config: &DevkitConfig) -> Result<(StatePaths, ModuleRegistry, RunLog)> {
    config.validate()?;
    config.check_credentials()?;
    let paths = config.state_paths()?;

    fs::create_dir_all(&paths.state_dir)
        .map_err(|err| DevkitError::io("create state dir", &paths.state_dir, err))?;

    let policy = if config.strict_state {
        CorruptStatePolicy::Fail
    } else {
        CorruptStatePolicy::TreatAsEmpty
    };
    let store = |path: &std::path::Path| {
        AtomicJsonStore::new(path)
            .with_lock_timeout(config.lock_timeout)
            .with_corrupt_policy(policy)
    };

    let mut registry = ModuleRegistry::new(store(paths.module_state_path.as_path()));
    if let Some(template) = &config.module_template {
        registry = registry.with_template(template);
    }
    registry.bootstrap()?;
    let runs = RunLog::new(store(paths.run_state_path.as_path()));

    info!(
        state_dir = %paths.state_dir.display(),
        modules = %paths.module_state_path.display(),
        runs = %paths.run_state_path.display(),
        strict = config.strict_state,
        "devkit state ready"
    );
    Ok((paths, registry, runs))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::core::types::ServiceHealth;
    use crate::test_support::{ScriptedProbe, config_in};

    fn probes() -> (Arc<dyn HealthProbe>, Arc<dyn HealthProbe>) {
        (
            Arc::new(ScriptedProbe::new(ServiceHealth::ok())),
            Arc::new(ScriptedProbe::new(ServiceHealth::ok())),
        )
    }

    #[test]
    fn startup_bootstraps_module_state() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (postgres, minio) = probes();
        let ctx = DevkitContext::with_probes(config_in(temp.path()), postgres, minio)
            .expect("context");

        assert!(ctx.paths().module_state_path.exists());
        assert!(ctx.registry().list().expect("list").is_empty());
        assert_eq!(ctx.runs().count().expect("count"), 0);
    }

    #[test]
    fn configured_template_seeds_first_startup() {
        let temp = tempfile::tempdir().expect("tempdir");
        let template = temp.path().join("modules.json");
        fs::write(&template, r#"[{"name": "seeded", "version": "0.1.0"}]"#).expect("write");
        let config = DevkitConfig {
            module_template: Some(template),
            ..config_in(&temp.path().join("state"))
        };
        let (postgres, minio) = probes();
        let ctx = DevkitContext::with_probes(config, postgres, minio).expect("context");

        assert!(ctx.registry().contains("seeded").expect("contains"));
    }

    #[test]
    fn traversal_override_fails_before_any_file_is_created() {
        let temp = tempfile::tempdir().expect("tempdir");
        let state_dir = temp.path().join("state");
        let config = DevkitConfig {
            module_state: PathBuf::from("../../outside.json"),
            ..config_in(&state_dir)
        };
        let (postgres, minio) = probes();

        let err = DevkitContext::with_probes(config, postgres, minio).err();
        assert!(matches!(err, Some(DevkitError::PathTraversal { .. })));
        assert!(!state_dir.exists());
    }

    #[test]
    fn insecure_credentials_fail_startup() {
        let temp = tempfile::tempdir().expect("tempdir");
        let state_dir = temp.path().join("state");
        let mut config = config_in(&state_dir);
        config.database.password = "postgres".to_string();
        let (postgres, minio) = probes();

        let err = DevkitContext::with_probes(config, postgres, minio).err();
        assert!(matches!(err, Some(DevkitError::InsecureConfiguration { .. })));
        assert!(!state_dir.exists());
    }

    #[test]
    fn strict_state_surfaces_corrupt_documents() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("runs.json"), "{not json").expect("write");
        let mut config = config_in(temp.path());
        config.strict_state = true;
        let (postgres, minio) = probes();
        let ctx = DevkitContext::with_probes(config, postgres, minio).expect("context");

        assert!(matches!(
            ctx.runs().count(),
            Err(DevkitError::CorruptState { .. })
        ));
    }
}
