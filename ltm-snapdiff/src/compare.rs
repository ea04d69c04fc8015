//! Snapshot-to-snapshot, snapshot-to-live and device-to-device comparison.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::category::Category;
use crate::classify::{AnalysisItem, Classification, ClassificationError, Recommendation};
use crate::diff::{ChangeType, DiffRecord, DiffScope};
use crate::engine::Engine;
use crate::fetch::{fetch_all, FetchError};
use crate::section::ObjectSection;
use crate::snapshot::Snapshot;
use crate::store::StorageError;

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotRef {
    /// A stored snapshot by id.
    Stored(String),
    /// Running configuration fetched now.
    Live,
    /// A saved on-device revision fetched now.
    Version(String),
    /// A snapshot built outside the store, for example from local files.
    Adhoc(Arc<Snapshot>),
}

impl SnapshotRef {
    pub fn label(&self) -> String {
        match self {
            SnapshotRef::Stored(id) => id.clone(),
            SnapshotRef::Live => "live".to_string(),
            SnapshotRef::Version(version) => format!("live@{version}"),
            SnapshotRef::Adhoc(snapshot) => snapshot
                .comment
                .clone()
                .unwrap_or_else(|| snapshot.id.clone()),
        }
    }

    fn is_fetched(&self) -> bool {
        matches!(self, SnapshotRef::Live | SnapshotRef::Version(_))
    }

    fn version(&self) -> Option<&str> {
        match self {
            SnapshotRef::Version(version) => Some(version),
            _ => None,
        }
    }
}

impl fmt::Display for SnapshotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Source device compared against target device.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DevicePair {
    pub source: String,
    pub target: String,
}

impl DevicePair {
    pub fn same(device_id: &str) -> Self {
        Self {
            source: device_id.to_string(),
            target: device_id.to_string(),
        }
    }
}

impl fmt::Display for DevicePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source == self.target {
            f.write_str(&self.source)
        } else {
            write!(f, "{} -> {}", self.source, self.target)
        }
    }
}

/// What to compare.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareScope {
    /// Devices compared against themselves. `None` means every device
    /// available on the sides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devices: Option<BTreeSet<String>>,
    /// Explicit cross-device pairs; when set, `devices` is ignored.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pairs: Vec<DevicePair>,
    #[serde(default)]
    pub objects: DiffScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Source,
    Target,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceErrorKind {
    Timeout,
    AuthFailure,
    Unreachable,
    Parse,
    /// The stored snapshot recorded a failed capture for the device.
    CaptureFailed,
}

/// A device left out of the comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceError {
    pub device_id: String,
    pub side: Side,
    pub kind: DeviceErrorKind,
    pub message: String,
}

impl DeviceError {
    fn from_fetch(device_id: &str, side: Side, err: &FetchError) -> Self {
        let kind = match err {
            FetchError::Timeout { .. } => DeviceErrorKind::Timeout,
            FetchError::AuthFailure { .. } => DeviceErrorKind::AuthFailure,
            FetchError::Unreachable { .. } => DeviceErrorKind::Unreachable,
        };
        Self {
            device_id: device_id.to_string(),
            side,
            kind,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.device_id, self.message)
    }
}

/// Change counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub by_category: BTreeMap<Category, usize>,
}

impl Summary {
    pub fn from_records(records: &[DiffRecord]) -> Self {
        let mut summary = Summary {
            total: records.len(),
            ..Summary::default()
        };
        for record in records {
            match record.change {
                ChangeType::Added => summary.added += 1,
                ChangeType::Removed => summary.removed += 1,
                ChangeType::Modified => summary.modified += 1,
            }
            *summary.by_category.entry(record.category).or_default() += 1;
        }
        summary
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} added={} removed={} modified={}",
            self.total, self.added, self.removed, self.modified
        )
    }
}

/// Complete, deterministic outcome of a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub source: String,
    pub target: String,
    pub scope: CompareScope,
    /// Pairs that were actually compared.
    pub pairs: Vec<DevicePair>,
    pub summary: Summary,
    pub security_impact: bool,
    pub service_impact: bool,
    pub records: Vec<DiffRecord>,
    pub analysis: Vec<AnalysisItem>,
    pub recommendations: Vec<Recommendation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classification_errors: Vec<ClassificationError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_errors: Vec<DeviceError>,
    /// Devices present on only one of two stored snapshots.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unpaired_devices: Vec<String>,
}

impl ComparisonResult {
    /// Some requested devices could not be compared.
    pub fn is_partial(&self) -> bool {
        !self.device_errors.is_empty() || !self.unpaired_devices.is_empty()
    }

    pub fn has_changes(&self) -> bool {
        !self.records.is_empty()
    }
}

/// Errors that prevent any comparison result.
#[derive(Debug, Error)]
pub enum CompareError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("no devices to compare")]
    NoDevices,
    #[error("no device pair could be compared: {}", describe(.errors))]
    NoComparableDevices { errors: Vec<DeviceError> },
}

fn describe(errors: &[DeviceError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Configurations of one side, per device.
#[derive(Debug, Default)]
struct Resolved {
    configs: BTreeMap<String, Vec<ObjectSection>>,
    errors: BTreeMap<String, DeviceError>,
}

impl Engine {
    /// Compare `source` (old side) with `target` (new side).
    ///
    /// Per-device fetch or parse failures are reported in the result; the
    /// call only fails when no pair could be compared at all.
    pub async fn compare(
        &self,
        source: &SnapshotRef,
        target: &SnapshotRef,
        scope: &CompareScope,
    ) -> Result<ComparisonResult, CompareError> {
        let source_stored = self.load_side(source)?;
        let target_stored = self.load_side(target)?;
        let pairs = self.plan_pairs(source_stored.as_deref(), target_stored.as_deref(), scope);
        if pairs.is_empty() {
            return Err(CompareError::NoDevices);
        }
        debug!(%source, %target, pairs = pairs.len(), "comparing");

        let source_ids: BTreeSet<String> = pairs.iter().map(|p| p.source.clone()).collect();
        let target_ids: BTreeSet<String> = pairs.iter().map(|p| p.target.clone()).collect();

        let (source_side, target_side) = if source.is_fetched() && source == target {
            let ids: BTreeSet<String> = source_ids.union(&target_ids).cloned().collect();
            let shared = self.resolve(source, None, &ids, Side::Source).await;
            let mirrored = Resolved {
                configs: shared.configs.clone(),
                errors: shared
                    .errors
                    .iter()
                    .map(|(id, err)| {
                        let mut err = err.clone();
                        err.side = Side::Target;
                        (id.clone(), err)
                    })
                    .collect(),
            };
            (shared, mirrored)
        } else {
            tokio::join!(
                self.resolve(source, source_stored.as_deref(), &source_ids, Side::Source),
                self.resolve(target, target_stored.as_deref(), &target_ids, Side::Target),
            )
        };

        let mut records = Vec::new();
        let mut classification = Classification::default();
        let mut compared = Vec::new();
        let mut unpaired = BTreeSet::new();

        for pair in &pairs {
            let (Some(old), Some(new)) = (
                source_side.configs.get(&pair.source),
                target_side.configs.get(&pair.target),
            ) else {
                for (side, id) in [(&source_side, &pair.source), (&target_side, &pair.target)] {
                    if !side.configs.contains_key(id) && !side.errors.contains_key(id) {
                        unpaired.insert(id.clone());
                    }
                }
                continue;
            };

            let mut pair_records = self.differ.diff_scoped(old, new, &scope.objects);
            for record in &mut pair_records {
                record.device = Some(pair.target.clone());
            }
            let mut pair_classification = self.classifier.classify(&pair_records);
            let display = self.registry.display_name(&pair.target);
            for item in &mut pair_classification.items {
                item.device = Some(pair.target.clone());
                item.device_name = Some(display.clone());
            }
            for recommendation in &mut pair_classification.recommendations {
                recommendation.device = Some(pair.target.clone());
            }

            records.extend(pair_records);
            classification.extend(pair_classification);
            compared.push(pair.clone());
        }

        let device_errors: Vec<DeviceError> = source_side
            .errors
            .into_values()
            .chain(target_side.errors.into_values())
            .collect();

        if compared.is_empty() && !device_errors.is_empty() {
            return Err(CompareError::NoComparableDevices {
                errors: device_errors,
            });
        }
        for err in &device_errors {
            warn!(device = %err.device_id, side = ?err.side, error = %err.message, "device left out of comparison");
        }

        let summary = Summary::from_records(&records);
        info!(%source, %target, %summary, "comparison complete");
        Ok(ComparisonResult {
            source: source.label(),
            target: target.label(),
            scope: scope.clone(),
            pairs: compared,
            security_impact: classification.security_impact(),
            service_impact: classification.service_impact(),
            summary,
            records,
            analysis: classification.items,
            recommendations: classification.recommendations,
            classification_errors: classification.errors,
            device_errors,
            unpaired_devices: unpaired.into_iter().collect(),
        })
    }

    fn load_side(&self, reference: &SnapshotRef) -> Result<Option<Arc<Snapshot>>, StorageError> {
        match reference {
            SnapshotRef::Stored(id) => Ok(Some(Arc::new(self.store.get(id)?))),
            SnapshotRef::Adhoc(snapshot) => Ok(Some(Arc::clone(snapshot))),
            SnapshotRef::Live | SnapshotRef::Version(_) => Ok(None),
        }
    }

    fn plan_pairs(
        &self,
        source: Option<&Snapshot>,
        target: Option<&Snapshot>,
        scope: &CompareScope,
    ) -> Vec<DevicePair> {
        if !scope.pairs.is_empty() {
            let mut pairs = scope.pairs.clone();
            pairs.sort();
            pairs.dedup();
            return pairs;
        }

        let ids: BTreeSet<String> = match &scope.devices {
            Some(devices) => devices.clone(),
            None if source.is_none() && target.is_none() => self
                .registry
                .list_devices()
                .into_iter()
                .map(|device| device.id)
                .collect(),
            None => [source, target]
                .into_iter()
                .flatten()
                .flat_map(|snapshot| snapshot.devices.iter().map(|d| d.device_id.clone()))
                .collect(),
        };
        ids.iter().map(|id| DevicePair::same(id)).collect()
    }

    async fn resolve(
        &self,
        reference: &SnapshotRef,
        stored: Option<&Snapshot>,
        devices: &BTreeSet<String>,
        side: Side,
    ) -> Resolved {
        let mut resolved = Resolved::default();

        if let Some(snapshot) = stored {
            for id in devices {
                if let Some(device) = snapshot.device(id) {
                    resolved.configs.insert(id.clone(), device.sections.clone());
                } else if let Some(failure) = snapshot.errors.iter().find(|e| &e.device_id == id) {
                    resolved.errors.insert(
                        id.clone(),
                        DeviceError {
                            device_id: id.clone(),
                            side,
                            kind: DeviceErrorKind::CaptureFailed,
                            message: failure.message.clone(),
                        },
                    );
                }
            }
            return resolved;
        }

        let ids: Vec<String> = devices.iter().cloned().collect();
        let outcomes = fetch_all(
            Arc::clone(&self.fetcher),
            &ids,
            reference.version(),
            self.fetch_timeout,
        )
        .await;

        for outcome in outcomes {
            match outcome.result {
                Ok(text) => match self.parser.parse(&text) {
                    Ok(sections) => {
                        resolved.configs.insert(outcome.device_id, sections);
                    }
                    Err(err) => {
                        resolved.errors.insert(
                            outcome.device_id.clone(),
                            DeviceError {
                                device_id: outcome.device_id,
                                side,
                                kind: DeviceErrorKind::Parse,
                                message: err.to_string(),
                            },
                        );
                    }
                },
                Err(err) => {
                    let error = DeviceError::from_fetch(&outcome.device_id, side, &err);
                    resolved.errors.insert(outcome.device_id, error);
                }
            }
        }
        resolved
    }
}
