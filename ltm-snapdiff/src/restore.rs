//! Staged restores: preview or apply the changes that bring a target back
//! to a stored snapshot.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::category::Category;
use crate::compare::{CompareScope, ComparisonResult, SnapshotRef};
use crate::diff::{ChangeType, DiffRecord};
use crate::engine::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyAction {
    Create,
    Replace,
    Delete,
}

/// Identity of an object on a device.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub category: Category,
    pub name: String,
}

/// One change to push to a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyObject {
    pub category: Category,
    pub name: String,
    pub action: ApplyAction,
    /// Declaration header, for example `ltm pool /Common/web-pool`.
    pub header: String,
    /// Desired declaration text; absent for deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ApplyObject {
    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            category: self.category,
            name: self.name.clone(),
        }
    }
}

/// Changes for one device, deletes first, then creates and replaces in
/// dependency order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePlan {
    pub device_id: String,
    pub objects: Vec<ApplyObject>,
}

/// Outcome reported by an applier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub applied: Vec<ObjectKey>,
    pub failed: Vec<ObjectKey>,
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("device {device_id} rejected the change: {message}")]
    Rejected { device_id: String, message: String },
    #[error("failed to write restore file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Pushes configuration objects to a device.
#[async_trait]
pub trait ConfigApplier: Send + Sync {
    async fn apply(&self, device_id: &str, objects: &[ApplyObject]) -> Result<ApplyResult, ApplyError>;

    /// Whether a failed apply can leave some objects applied. Appliers that
    /// are all-or-nothing return `false`.
    fn supports_partial(&self) -> bool {
        false
    }
}

/// Writes `<dir>/<device>.merge.conf` (creates and replaces, suitable for
/// `tmsh load sys config merge`) and `<dir>/<device>.delete.tmsh`.
#[derive(Debug, Clone)]
pub struct DirectoryApplier {
    dir: PathBuf,
}

impl DirectoryApplier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ConfigApplier for DirectoryApplier {
    async fn apply(&self, device_id: &str, objects: &[ApplyObject]) -> Result<ApplyResult, ApplyError> {
        let io = |path: &PathBuf, source: std::io::Error| ApplyError::Io {
            path: path.display().to_string(),
            source,
        };
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| io(&self.dir, source))?;

        let mut merge = String::new();
        let mut deletes = String::new();
        for object in objects {
            match (&object.action, &object.text) {
                (ApplyAction::Delete, _) => {
                    deletes.push_str(&format!("delete {}\n", object.header));
                }
                (_, Some(text)) => {
                    merge.push_str(text);
                    merge.push('\n');
                }
                (_, None) => {
                    return Err(ApplyError::Rejected {
                        device_id: device_id.to_string(),
                        message: format!("no desired text for {}", object.header),
                    })
                }
            }
        }

        let merge_path = self.dir.join(format!("{device_id}.merge.conf"));
        tokio::fs::write(&merge_path, merge)
            .await
            .map_err(|source| io(&merge_path, source))?;
        let delete_path = self.dir.join(format!("{device_id}.delete.tmsh"));
        tokio::fs::write(&delete_path, deletes)
            .await
            .map_err(|source| io(&delete_path, source))?;

        Ok(ApplyResult {
            applied: objects.iter().map(ApplyObject::key).collect(),
            failed: Vec::new(),
        })
    }
}

/// Build apply plans from `compare(source, target)` records, where the
/// source is the desired state and the target is what is on the device.
pub fn plan_restore(records: &[DiffRecord]) -> Vec<DevicePlan> {
    let mut by_device: BTreeMap<String, Vec<ApplyObject>> = BTreeMap::new();
    for record in records {
        let Some(device_id) = record.device.clone() else {
            continue;
        };
        let (action, text, header_source) = match record.change {
            ChangeType::Removed => (ApplyAction::Create, record.old_text.clone(), &record.old_text),
            ChangeType::Modified => (ApplyAction::Replace, record.old_text.clone(), &record.old_text),
            ChangeType::Added => (ApplyAction::Delete, None, &record.new_text),
        };
        let header = header_source
            .as_deref()
            .and_then(declaration_header)
            .unwrap_or(&record.name)
            .to_string();
        by_device.entry(device_id).or_default().push(ApplyObject {
            category: record.category,
            name: record.name.clone(),
            action,
            header,
            text,
        });
    }

    by_device
        .into_iter()
        .map(|(device_id, mut objects)| {
            objects.sort_by(|a, b| {
                let a_delete = a.action == ApplyAction::Delete;
                let b_delete = b.action == ApplyAction::Delete;
                let by_category = if a_delete {
                    a.category.cmp(&b.category)
                } else {
                    b.category.cmp(&a.category)
                };
                b_delete
                    .cmp(&a_delete)
                    .then(by_category)
                    .then_with(|| a.name.cmp(&b.name))
            });
            DevicePlan { device_id, objects }
        })
        .collect()
}

fn declaration_header(text: &str) -> Option<&str> {
    text.lines()
        .next()
        .and_then(|line| line.strip_suffix('{').or_else(|| line.split(" {").next()))
        .map(str::trim)
        .filter(|header| !header.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreState {
    Staged,
    Previewed,
    Applied,
    Failed,
}

/// Per-device outcome of an apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceReport {
    pub device_id: String,
    pub applied: Vec<ObjectKey>,
    pub failed: Vec<ObjectKey>,
    pub succeeded_categories: Vec<Category>,
    pub failed_categories: Vec<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeviceReport {
    fn from_result(device_id: &str, result: ApplyResult) -> Self {
        let failed_categories: BTreeSet<Category> =
            result.failed.iter().map(|key| key.category).collect();
        let succeeded_categories: BTreeSet<Category> = result
            .applied
            .iter()
            .map(|key| key.category)
            .filter(|category| !failed_categories.contains(category))
            .collect();
        Self {
            device_id: device_id.to_string(),
            applied: result.applied,
            failed: result.failed,
            succeeded_categories: succeeded_categories.into_iter().collect(),
            failed_categories: failed_categories.into_iter().collect(),
            error: None,
        }
    }

    fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.error.is_none()
    }
}

/// What to restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRequest {
    /// Stored snapshot holding the desired state.
    pub source_id: String,
    /// Current state to bring back, usually [`SnapshotRef::Live`].
    pub target: SnapshotRef,
    pub scope: CompareScope,
    pub dry_run: bool,
}

/// Audit record of one restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreJob {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub source_id: String,
    pub target: String,
    pub scope: CompareScope,
    pub dry_run: bool,
    pub state: RestoreState,
    /// Every state the job passed through, in order.
    pub history: Vec<RestoreState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<ComparisonResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plan: Vec<DevicePlan>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_reports: Vec<DeviceReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl RestoreJob {
    fn staged(request: &RestoreRequest) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            created_at: Utc::now(),
            source_id: request.source_id.clone(),
            target: request.target.label(),
            scope: request.scope.clone(),
            dry_run: request.dry_run,
            state: RestoreState::Staged,
            history: vec![RestoreState::Staged],
            comparison: None,
            plan: Vec::new(),
            device_reports: Vec::new(),
            failure: None,
        }
    }

    fn transition(&mut self, next: RestoreState) {
        debug!(job = %self.id, from = ?self.state, to = ?next, "restore state change");
        self.state = next;
        self.history.push(next);
    }

    fn fail(&mut self, reason: String) {
        warn!(job = %self.id, %reason, "restore failed");
        self.failure = Some(reason);
        self.transition(RestoreState::Failed);
    }
}

/// Per-device apply locks. Applies to one device never overlap.
#[derive(Debug, Default)]
pub struct DeviceLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl DeviceLocks {
    pub fn lock_for(&self, device_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(locks.entry(device_id.to_string()).or_default())
    }
}

/// Drives restore jobs through staging, preview and apply.
pub struct RestoreOrchestrator {
    applier: Option<Arc<dyn ConfigApplier>>,
    locks: Arc<DeviceLocks>,
}

impl RestoreOrchestrator {
    pub fn new(applier: Option<Arc<dyn ConfigApplier>>) -> Self {
        Self {
            applier,
            locks: Arc::new(DeviceLocks::default()),
        }
    }

    async fn run(&self, engine: &Engine, request: RestoreRequest) -> RestoreJob {
        let mut job = RestoreJob::staged(&request);
        info!(job = %job.id, source = %job.source_id, target = %job.target, dry_run = job.dry_run, "restore staged");

        let applier = match (&self.applier, request.dry_run) {
            (_, true) => None,
            (Some(applier), false) => Some(Arc::clone(applier)),
            (None, false) => {
                job.fail("no configuration applier is configured".to_string());
                return job;
            }
        };

        let source = SnapshotRef::Stored(request.source_id.clone());
        let comparison = match engine.compare(&source, &request.target, &request.scope).await {
            Ok(comparison) => comparison,
            Err(err) => {
                job.fail(err.to_string());
                return job;
            }
        };
        job.plan = plan_restore(&comparison.records);
        let unreachable = unrestorable_devices(&comparison);
        job.comparison = Some(comparison);

        let Some(applier) = applier else {
            job.transition(RestoreState::Previewed);
            return job;
        };
        if !unreachable.is_empty() {
            job.fail(format!("devices could not be loaded: {}", unreachable.join("; ")));
            return job;
        }
        job.transition(RestoreState::Previewed);

        let applies = job.plan.iter().map(|plan| {
            let applier = Arc::clone(&applier);
            let lock = self.locks.lock_for(&plan.device_id);
            async move {
                let _guard = lock.lock().await;
                debug!(device = %plan.device_id, objects = plan.objects.len(), "applying restore");
                match applier.apply(&plan.device_id, &plan.objects).await {
                    Ok(result) => DeviceReport::from_result(&plan.device_id, result),
                    Err(err) => DeviceReport {
                        device_id: plan.device_id.clone(),
                        applied: Vec::new(),
                        failed: plan.objects.iter().map(ApplyObject::key).collect(),
                        succeeded_categories: Vec::new(),
                        failed_categories: plan
                            .objects
                            .iter()
                            .map(|o| o.category)
                            .collect::<BTreeSet<_>>()
                            .into_iter()
                            .collect(),
                        error: Some(err.to_string()),
                    },
                }
            }
        });
        let reports = join_all(applies).await;

        let failed: Vec<&DeviceReport> = reports.iter().filter(|r| !r.is_clean()).collect();
        if failed.is_empty() {
            job.device_reports = reports;
            job.transition(RestoreState::Applied);
            info!(job = %job.id, "restore applied");
            return job;
        }

        let reason = failed
            .iter()
            .map(|report| match &report.error {
                Some(error) => format!("{}: {error}", report.device_id),
                None => format!("{}: {} objects failed", report.device_id, report.failed.len()),
            })
            .collect::<Vec<_>>()
            .join("; ");
        if applier.supports_partial() {
            job.device_reports = reports;
        }
        job.fail(reason);
        job
    }
}

/// Devices the comparison could not load on either side.
fn unrestorable_devices(comparison: &ComparisonResult) -> Vec<String> {
    comparison
        .device_errors
        .iter()
        .map(ToString::to_string)
        .chain(
            comparison
                .unpaired_devices
                .iter()
                .map(|id| format!("{id}: missing from one side")),
        )
        .collect()
}

impl Engine {
    /// Stage a restore of `request.source_id` onto `request.target`.
    ///
    /// A dry run stops after the preview; its comparison equals
    /// `compare(source, target)` for the same scope.
    pub async fn stage_restore(&self, request: RestoreRequest) -> RestoreJob {
        self.restore.run(self, request).await
    }
}
