use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ltm_snapdiff::category::Category;
use ltm_snapdiff::compare::{CompareScope, SnapshotRef};
use ltm_snapdiff::engine::Engine;
use ltm_snapdiff::fetch::{ConfigFetcher, FetchError};
use ltm_snapdiff::restore::{
    ApplyAction, ApplyError, ApplyObject, ApplyResult, ConfigApplier, DirectoryApplier,
    RestoreRequest, RestoreState,
};
use ltm_snapdiff::snapshot::RawConfig;
use ltm_snapdiff::store::SqliteStore;
use pretty_assertions::assert_eq;

fn fixture(path: &str) -> String {
    let full = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("fixtures")
        .join(path);
    fs::read_to_string(&full).expect("fixture should be readable")
}

/// Serves fixed texts as the running configuration.
struct StaticFetcher {
    configs: HashMap<String, String>,
}

impl StaticFetcher {
    fn new(configs: &[(&str, String)]) -> Self {
        Self {
            configs: configs
                .iter()
                .map(|(id, text)| (id.to_string(), text.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl ConfigFetcher for StaticFetcher {
    async fn fetch(&self, device_id: &str, _version: Option<&str>) -> Result<String, FetchError> {
        self.configs
            .get(device_id)
            .cloned()
            .ok_or_else(|| FetchError::unreachable(format!("{device_id} not found")))
    }
}

/// Applies everything except objects of one category.
struct SelectiveApplier {
    reject: Category,
    partial: bool,
    calls: Mutex<Vec<(String, Vec<ApplyObject>)>>,
}

impl SelectiveApplier {
    fn new(reject: Category, partial: bool) -> Self {
        Self {
            reject,
            partial,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ConfigApplier for SelectiveApplier {
    async fn apply(&self, device_id: &str, objects: &[ApplyObject]) -> Result<ApplyResult, ApplyError> {
        self.calls
            .lock()
            .unwrap()
            .push((device_id.to_string(), objects.to_vec()));
        if !self.partial && objects.iter().any(|o| o.category == self.reject) {
            return Err(ApplyError::Rejected {
                device_id: device_id.to_string(),
                message: "transaction rolled back".to_string(),
            });
        }
        let (failed, applied): (Vec<_>, Vec<_>) = objects
            .iter()
            .map(ApplyObject::key)
            .partition(|key| key.category == self.reject);
        Ok(ApplyResult { applied, failed })
    }

    fn supports_partial(&self) -> bool {
        self.partial
    }
}

/// Records the highest number of overlapping applies per device.
#[derive(Default)]
struct SlowApplier {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl ConfigApplier for SlowApplier {
    async fn apply(&self, _device_id: &str, objects: &[ApplyObject]) -> Result<ApplyResult, ApplyError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(ApplyResult {
            applied: objects.iter().map(ApplyObject::key).collect(),
            failed: Vec::new(),
        })
    }
}

/// Engine whose stored snapshot holds v1 while the device runs v2.
fn drifted_engine() -> (Engine, String) {
    let engine = Engine::new(Arc::new(SqliteStore::open_in_memory().expect("store")))
        .with_fetcher(Arc::new(StaticFetcher::new(&[("edge-a", fixture("v2/edge-a.conf"))])));
    let snapshot = engine
        .create_backup(vec![RawConfig::new("edge-a", fixture("v1/edge-a.conf"))], "ops", None)
        .expect("backup");
    (engine, snapshot.id)
}

fn request(source_id: &str, dry_run: bool) -> RestoreRequest {
    RestoreRequest {
        source_id: source_id.to_string(),
        target: SnapshotRef::Live,
        scope: CompareScope::default(),
        dry_run,
    }
}

#[tokio::test]
async fn dry_run_previews_the_same_comparison() {
    let (engine, id) = drifted_engine();

    let job = engine.stage_restore(request(&id, true)).await;
    let direct = engine
        .compare(&SnapshotRef::Stored(id.clone()), &SnapshotRef::Live, &CompareScope::default())
        .await
        .expect("compare");

    assert_eq!(job.state, RestoreState::Previewed);
    assert_eq!(job.history, vec![RestoreState::Staged, RestoreState::Previewed]);
    assert_eq!(job.comparison.as_ref(), Some(&direct));
    assert!(job.device_reports.is_empty());
}

#[tokio::test]
async fn plan_deletes_first_then_recreates() {
    let (engine, id) = drifted_engine();
    let job = engine.stage_restore(request(&id, true)).await;

    assert_eq!(job.plan.len(), 1);
    let steps: Vec<(ApplyAction, &str)> = job.plan[0]
        .objects
        .iter()
        .map(|o| (o.action, o.name.as_str()))
        .collect();
    assert_eq!(
        steps,
        vec![
            (ApplyAction::Delete, "/Common/cert-api"),
            (ApplyAction::Replace, "net vlan /Common/external"),
            (ApplyAction::Create, "/Common/10.0.0.2"),
            (ApplyAction::Replace, "/Common/clientssl-web"),
            (ApplyAction::Replace, "/Common/web-pool"),
        ]
    );
    assert_eq!(job.plan[0].objects[0].header, "sys file ssl-cert /Common/cert-api");
    let node = &job.plan[0].objects[2];
    assert!(node.text.as_deref().is_some_and(|t| t.contains("address 10.0.0.2")));
}

#[tokio::test]
async fn apply_without_an_applier_fails() {
    let (engine, id) = drifted_engine();
    let job = engine.stage_restore(request(&id, false)).await;

    assert_eq!(job.state, RestoreState::Failed);
    assert!(job.failure.as_deref().is_some_and(|f| f.contains("no configuration applier")));
}

#[tokio::test]
async fn clean_apply_reaches_applied() {
    let (engine, id) = drifted_engine();
    let applier = Arc::new(SelectiveApplier::new(Category::Policies, false));
    let engine = engine.with_applier(applier.clone());

    let job = engine.stage_restore(request(&id, false)).await;
    assert_eq!(job.state, RestoreState::Applied);
    assert_eq!(
        job.history,
        vec![RestoreState::Staged, RestoreState::Previewed, RestoreState::Applied]
    );
    assert_eq!(job.device_reports.len(), 1);
    assert_eq!(job.device_reports[0].applied.len(), 5);
    assert_eq!(applier.calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn partial_apply_reports_categories() {
    let (engine, id) = drifted_engine();
    let engine = engine.with_applier(Arc::new(SelectiveApplier::new(Category::Certificates, true)));

    let job = engine.stage_restore(request(&id, false)).await;
    assert_eq!(job.state, RestoreState::Failed);
    let report = &job.device_reports[0];
    assert_eq!(
        job.history,
        vec![RestoreState::Staged, RestoreState::Previewed, RestoreState::Failed]
    );
    assert_eq!(report.failed_categories, vec![Category::Certificates]);
    assert_eq!(
        report.succeeded_categories,
        vec![Category::Pools, Category::Profiles, Category::Nodes, Category::Other]
    );
    assert!(job.failure.as_deref().is_some_and(|f| f.contains("edge-a")));
}

#[tokio::test]
async fn all_or_nothing_failure_keeps_no_reports() {
    let (engine, id) = drifted_engine();
    let engine = engine.with_applier(Arc::new(SelectiveApplier::new(Category::Certificates, false)));

    let job = engine.stage_restore(request(&id, false)).await;
    assert_eq!(job.state, RestoreState::Failed);
    assert!(job.device_reports.is_empty());
    assert!(job.failure.as_deref().is_some_and(|f| f.contains("rolled back")));
}

#[tokio::test]
async fn unreachable_device_fails_the_whole_restore() {
    let engine = Engine::new(Arc::new(SqliteStore::open_in_memory().expect("store")))
        .with_fetcher(Arc::new(StaticFetcher::new(&[("edge-a", fixture("v2/edge-a.conf"))])));
    let snapshot = engine
        .create_backup(
            vec![
                RawConfig::new("edge-a", fixture("v1/edge-a.conf")),
                RawConfig::new("edge-b", fixture("v1/edge-a.conf")),
            ],
            "ops",
            None,
        )
        .expect("backup");
    let applier = Arc::new(SelectiveApplier::new(Category::Policies, false));
    let engine = engine.with_applier(applier.clone());

    let job = engine.stage_restore(request(&snapshot.id, false)).await;
    assert_eq!(job.state, RestoreState::Failed);
    assert_eq!(job.history, vec![RestoreState::Staged, RestoreState::Failed]);
    assert!(job.failure.as_deref().is_some_and(|f| f.contains("edge-b")));
    assert!(job.device_reports.is_empty());
    assert!(applier.calls.lock().unwrap().is_empty());

    let preview = engine.stage_restore(request(&snapshot.id, true)).await;
    assert_eq!(preview.state, RestoreState::Previewed);
    let comparison = preview.comparison.expect("comparison");
    assert_eq!(comparison.device_errors[0].device_id, "edge-b");
}

#[tokio::test]
async fn compare_failure_fails_the_job() {
    let (engine, _) = drifted_engine();
    let job = engine.stage_restore(request("missing", true)).await;
    assert_eq!(job.state, RestoreState::Failed);
    assert!(job.comparison.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn applies_to_one_device_never_overlap() {
    let (engine, id) = drifted_engine();
    let applier = Arc::new(SlowApplier::default());
    let engine = engine.with_applier(applier.clone());

    let (first, second) = tokio::join!(
        engine.stage_restore(request(&id, false)),
        engine.stage_restore(request(&id, false)),
    );
    assert_eq!(first.state, RestoreState::Applied);
    assert_eq!(second.state, RestoreState::Applied);
    assert_eq!(applier.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn directory_applier_writes_merge_and_delete_files() {
    let (engine, id) = drifted_engine();
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine.with_applier(Arc::new(DirectoryApplier::new(dir.path())));

    let job = engine.stage_restore(request(&id, false)).await;
    assert_eq!(job.state, RestoreState::Applied);

    let merge = fs::read_to_string(dir.path().join("edge-a.merge.conf")).expect("merge file");
    assert!(merge.contains("ltm node /Common/10.0.0.2 {"));
    assert!(merge.contains("/Common/10.0.0.2:80"));
    let deletes = fs::read_to_string(dir.path().join("edge-a.delete.tmsh")).expect("delete file");
    assert_eq!(deletes, "delete sys file ssl-cert /Common/cert-api\n");
}
