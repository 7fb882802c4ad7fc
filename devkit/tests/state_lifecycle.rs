//! End-to-end state tests through the public context API.
//!
//! Covers registration and run lifecycles, crash leftovers and concurrent
//! writers sharing one state directory.

use std::fs;
use std::sync::Arc;
use std::thread;

use devkit::core::readiness::readiness;
use devkit::core::types::{Readiness, RunStatus, ServiceHealth};
use devkit::core::validation::RunRequest;
use devkit::error::DevkitError;
use devkit::io::context::DevkitContext;
use devkit::io::json_store::AtomicJsonStore;
use devkit::io::registry::ModuleRegistry;
use devkit::test_support::{ScriptedProbe, config_in, draft};
use serde_json::{Map, json};

fn context(dir: &std::path::Path) -> (DevkitContext, Arc<ScriptedProbe>) {
    let postgres = Arc::new(ScriptedProbe::new(ServiceHealth::ok()));
    let minio = Arc::new(ScriptedProbe::new(ServiceHealth::ok()));
    let ctx = DevkitContext::with_probes(config_in(dir), postgres.clone(), minio)
        .expect("context");
    (ctx, postgres)
}

#[test]
fn register_run_and_fetch_result() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (ctx, _) = context(temp.path());

    ctx.registry()
        .register(draft("test-module", "1.0.0"))
        .expect("register");
    let run = ctx
        .runs()
        .start(
            ctx.registry(),
            RunRequest {
                module_id: "test-module".to_string(),
                parameters: Map::new(),
            },
        )
        .expect("start");

    assert_eq!(run.status, RunStatus::Completed);
    let result = ctx.runs().result(&run.run_id).expect("result");
    assert_eq!(
        result.summary.get("message"),
        Some(&json!("Devkit stub executed successfully"))
    );

    let on_disk: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&ctx.paths().run_state_path).expect("read"))
            .expect("parse");
    assert_eq!(on_disk[&run.run_id]["moduleId"], "test-module");
}

#[test]
fn leftover_temp_file_does_not_affect_state() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (ctx, _) = context(temp.path());
    ctx.registry()
        .register(draft("alpha", "1.0.0"))
        .expect("register");

    // A writer that died between writing its temp file and renaming it.
    fs::write(
        temp.path().join("modules.json.crashed.tmp"),
        r#"[{"id": "half"#,
    )
    .expect("write tmp");

    let modules = ctx.registry().list().expect("list");
    assert_eq!(modules.len(), 1);
    assert_eq!(modules[0].id, "alpha");
}

#[test]
fn concurrent_registrations_are_not_lost() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (ctx, _) = context(temp.path());
    let module_path = ctx.paths().module_state_path.clone();

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let path = module_path.clone();
            thread::spawn(move || {
                // Each thread uses its own store instance, like a separate process would.
                let registry = ModuleRegistry::new(AtomicJsonStore::new(path));
                for index in 0..5 {
                    registry
                        .register(draft(&format!("mod-{worker}-{index}"), "1.0.0"))
                        .expect("register");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("join");
    }

    assert_eq!(ctx.registry().list().expect("list").len(), 40);
}

#[test]
fn run_for_deleted_module_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (ctx, _) = context(temp.path());
    ctx.registry()
        .register(draft("gone", "1.0.0"))
        .expect("register");
    ctx.registry().delete("gone").expect("delete");

    let err = ctx
        .runs()
        .start(
            ctx.registry(),
            RunRequest {
                module_id: "gone".to_string(),
                parameters: Map::new(),
            },
        )
        .unwrap_err();
    assert!(matches!(err, DevkitError::NotFound(_)));
    assert_eq!(ctx.runs().count().expect("count"), 0);
}

#[tokio::test(start_paused = true)]
async fn readiness_follows_cached_health() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (ctx, postgres) = context(temp.path());

    assert_eq!(readiness(&ctx.health().await), Readiness::Ready);

    postgres.set(ServiceHealth::error("Database connection failed"));
    assert_eq!(readiness(&ctx.health().await), Readiness::Ready);

    tokio::time::advance(std::time::Duration::from_secs(5)).await;
    assert_eq!(readiness(&ctx.health().await), Readiness::Degraded);
    assert_eq!(postgres.calls(), 2);
}
