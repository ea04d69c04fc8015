use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use crate::classify::ImpactClassifier;
use crate::compare::ComparisonResult;
use crate::config::AppConfig;
use crate::diff::DiffEngine;
use crate::export::{export, ExportError, ExportFormat};
use crate::fetch::{fetch_all, ConfigFetcher, NoFetcher};
use crate::registry::{DeviceRegistry, StaticRegistry};
use crate::restore::{ConfigApplier, RestoreOrchestrator};
use crate::section::SectionParser;
use crate::snapshot::{BackupError, BackupRequest, CaptureError, RawConfig, Snapshot};
use crate::store::{ListFilter, SnapshotStore, StorageError};

/// Default bound on a single device fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Entry point tying parsing, storage, comparison and restore together.
pub struct Engine {
    pub(crate) store: Arc<dyn SnapshotStore>,
    pub(crate) parser: SectionParser,
    pub(crate) differ: DiffEngine,
    pub(crate) classifier: ImpactClassifier,
    pub(crate) fetcher: Arc<dyn ConfigFetcher>,
    pub(crate) registry: Arc<dyn DeviceRegistry>,
    pub(crate) fetch_timeout: Duration,
    pub(crate) restore: RestoreOrchestrator,
}

impl Engine {
    /// Engine with default parsing and rules, no live fetcher and no applier.
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            store,
            parser: SectionParser::default(),
            differ: DiffEngine::default(),
            classifier: ImpactClassifier::default(),
            fetcher: Arc::new(NoFetcher),
            registry: Arc::new(StaticRegistry::default()),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            restore: RestoreOrchestrator::new(None),
        }
    }

    /// Engine configured from an [`AppConfig`].
    pub fn from_config(store: Arc<dyn SnapshotStore>, config: &AppConfig) -> Self {
        Self::new(store)
            .with_parser(SectionParser::new(config.dialect()))
            .with_differ(DiffEngine::with_ignored_fields(config.diff.ignore_fields.clone()))
            .with_classifier(ImpactClassifier::new(config.classifier.clone()))
            .with_registry(Arc::new(StaticRegistry::new(config.devices.clone())))
            .with_fetch_timeout(Duration::from_secs(config.fetch.timeout_secs))
    }

    pub fn with_parser(mut self, parser: SectionParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_differ(mut self, differ: DiffEngine) -> Self {
        self.differ = differ;
        self
    }

    pub fn with_classifier(mut self, classifier: ImpactClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ConfigFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn DeviceRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_applier(mut self, applier: Arc<dyn ConfigApplier>) -> Self {
        self.restore = RestoreOrchestrator::new(Some(applier));
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn parser(&self) -> &SectionParser {
        &self.parser
    }

    pub fn registry(&self) -> &dyn DeviceRegistry {
        self.registry.as_ref()
    }

    /// Parse and store the given texts as one snapshot.
    pub fn create_backup(
        &self,
        configs: Vec<RawConfig>,
        author: &str,
        comment: Option<String>,
    ) -> Result<Snapshot, BackupError> {
        let request = BackupRequest {
            author: author.to_string(),
            comment,
            configs,
            failures: Vec::new(),
        };
        let snapshot = self.store.create(&self.parser, request)?;
        info!(id = %snapshot.id, devices = snapshot.devices.len(), "backup created");
        Ok(snapshot)
    }

    /// Fetch devices live and store what could be captured.
    ///
    /// Devices that fail to fetch are recorded on the snapshot, which is then
    /// partial (or failed when nothing was captured). `None` captures every
    /// registered device.
    pub async fn backup_devices(
        &self,
        devices: Option<Vec<String>>,
        author: &str,
        comment: Option<String>,
    ) -> Result<Snapshot, BackupError> {
        let devices = devices.unwrap_or_else(|| {
            self.registry
                .list_devices()
                .into_iter()
                .map(|device| device.id)
                .collect()
        });
        let outcomes = fetch_all(Arc::clone(&self.fetcher), &devices, None, self.fetch_timeout).await;

        let mut request = BackupRequest {
            author: author.to_string(),
            comment,
            ..BackupRequest::default()
        };
        for outcome in outcomes {
            match outcome.result {
                Ok(text) => request.configs.push(RawConfig::new(outcome.device_id, text)),
                Err(err) => request.failures.push(CaptureError {
                    device_id: outcome.device_id,
                    message: err.to_string(),
                }),
            }
        }

        let snapshot = self.store.create(&self.parser, request)?;
        info!(
            id = %snapshot.id,
            status = snapshot.status.as_str(),
            captured = snapshot.devices.len(),
            failed = snapshot.errors.len(),
            "live backup created"
        );
        Ok(snapshot)
    }

    pub fn get_backup(&self, id: &str) -> Result<Snapshot, StorageError> {
        self.store.get(id)
    }

    pub fn list_backups(&self, filter: &ListFilter) -> Result<Vec<Snapshot>, StorageError> {
        self.store.list(filter)
    }

    pub fn delete_backup(&self, id: &str) -> Result<(), StorageError> {
        self.store.delete(id)?;
        info!(id, "backup deleted");
        Ok(())
    }

    /// Ids of snapshots older than `retention_days`, oldest first.
    pub fn expired_backups(&self, retention_days: u32) -> Result<Vec<String>, StorageError> {
        let horizon = Utc::now() - chrono::Duration::days(i64::from(retention_days));
        self.store.expired(horizon)
    }

    /// Render a comparison as text, JSON, HTML or CSV.
    pub fn export_comparison(
        &self,
        result: &ComparisonResult,
        format: ExportFormat,
    ) -> Result<String, ExportError> {
        export(result, format)
    }

    /// Build a snapshot from local texts without storing it.
    pub fn adhoc_snapshot(
        &self,
        configs: Vec<RawConfig>,
        label: &str,
    ) -> Result<Snapshot, BackupError> {
        Snapshot::capture(
            &self.parser,
            BackupRequest {
                author: String::new(),
                comment: Some(label.to_string()),
                configs,
                failures: Vec::new(),
            },
        )
    }
}
