//! Configuration snapshots, diffs and restores for F5 BIG-IP LTM devices.
//!
//! Device configurations in tmsh text form are split into per-category
//! object sections, stored as snapshots and compared object by object.
//! Every change is classified for security and service impact before it is
//! reported, and a stored snapshot can be restored onto a device by
//! reversing the changes between it and the device's current state.
//!
//! # Architecture
//!
//! ## Parsing
//!
//! - [`category`] - Object categories and header classification
//! - [`section`] - Split a configuration into categorized object sections
//!
//! ## Storage
//!
//! - [`snapshot`] - Point-in-time captures of one or more devices
//! - [`store`] - Snapshot persistence (SQLite)
//!
//! ## Comparison
//!
//! - [`diff`] - Object-level diff records
//! - [`classify`] - Impact rules and recommendations
//! - [`compare`] - Snapshot, live and cross-device comparison
//! - [`fetch`] - Live configuration retrieval
//! - [`registry`] - Known devices and their display names
//!
//! ## Restore
//!
//! - [`restore`] - Restore planning, preview and apply
//!
//! ## Reporting
//!
//! - [`export`] - Text, JSON, HTML and CSV renderings
//! - [`report`] - Colored terminal output
//!
//! # Examples
//!
//! ```ignore
//! use std::sync::Arc;
//! use ltm_snapdiff::{Engine, RawConfig, SnapshotRef, SqliteStore, CompareScope};
//!
//! let engine = Engine::new(Arc::new(SqliteStore::open_in_memory()?));
//! let before = engine.create_backup(vec![RawConfig::new("edge-a", v1)], "ops", None)?;
//! let after = engine.create_backup(vec![RawConfig::new("edge-a", v2)], "ops", None)?;
//! let result = engine
//!     .compare(
//!         &SnapshotRef::Stored(before.id),
//!         &SnapshotRef::Stored(after.id),
//!         &CompareScope::default(),
//!     )
//!     .await?;
//! println!("{}", result.summary);
//! ```
//!
//! # Built on tmsh-diff-core
//!
//! Stanza parsing, canonical writing and field-level diffs come from
//! `tmsh-diff-core`. Everything LTM-specific lives in this crate.

pub mod category;
pub mod classify;
pub mod compare;
pub mod config;
pub mod diff;
pub mod engine;
pub mod export;
pub mod fetch;
pub mod logging;
pub mod registry;
pub mod report;
pub mod restore;
pub mod section;
pub mod snapshot;
pub mod store;

pub use category::Category;
pub use classify::{ImpactClassifier, ImpactKind, Severity};
pub use compare::{CompareError, CompareScope, ComparisonResult, DevicePair, SnapshotRef};
pub use diff::{ChangeType, DiffEngine, DiffRecord, DiffScope};
pub use engine::Engine;
pub use restore::{RestoreJob, RestoreRequest, RestoreState};
pub use section::{ObjectSection, SectionParser};
pub use snapshot::{RawConfig, Snapshot, SnapshotStatus};
pub use store::{ListFilter, SnapshotStore, SqliteStore};
