use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use ltm_snapdiff::category::Category;
use ltm_snapdiff::classify::{ImpactKind, Severity};
use ltm_snapdiff::compare::{
    CompareError, CompareScope, ComparisonResult, DevicePair, SnapshotRef,
};
use ltm_snapdiff::diff::{ChangeType, DiffScope};
use ltm_snapdiff::engine::Engine;
use ltm_snapdiff::snapshot::RawConfig;
use ltm_snapdiff::store::{SqliteStore, StorageError};
use pretty_assertions::assert_eq;

fn fixture(path: &str) -> String {
    let full = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("fixtures")
        .join(path);
    fs::read_to_string(&full).expect("fixture should be readable")
}

fn engine() -> Engine {
    Engine::new(Arc::new(SqliteStore::open_in_memory().expect("store")))
}

fn stored(engine: &Engine, device: &str, version: &str) -> SnapshotRef {
    let text = fixture(&format!("{version}/edge-a.conf"));
    let snapshot = engine
        .create_backup(vec![RawConfig::new(device, text)], "ops", Some(version.to_string()))
        .expect("backup");
    SnapshotRef::Stored(snapshot.id)
}

#[tokio::test]
async fn each_changed_object_is_reported_once() {
    let engine = engine();
    let before = stored(&engine, "edge-a", "v1");
    let after = stored(&engine, "edge-a", "v2");

    let result = engine
        .compare(&before, &after, &CompareScope::default())
        .await
        .expect("compare");

    let listed: Vec<(Category, &str, ChangeType)> = result
        .records
        .iter()
        .map(|r| (r.category, r.name.as_str(), r.change))
        .collect();
    assert_eq!(
        listed,
        vec![
            (Category::Pools, "/Common/web-pool", ChangeType::Modified),
            (Category::Profiles, "/Common/clientssl-web", ChangeType::Modified),
            (Category::Certificates, "/Common/cert-api", ChangeType::Added),
            (Category::Nodes, "/Common/10.0.0.2", ChangeType::Removed),
            (Category::Other, "net vlan /Common/external", ChangeType::Modified),
        ]
    );
    assert_eq!(result.summary.to_string(), "total=5 added=1 removed=1 modified=3");
    assert!(result.records.iter().all(|r| r.device.as_deref() == Some("edge-a")));
    assert!(!result.is_partial());
}

#[tokio::test]
async fn removed_pool_member_is_a_service_warning() {
    let engine = engine();
    let before = stored(&engine, "edge-a", "v1");
    let after = stored(&engine, "edge-a", "v2");
    let result = engine
        .compare(&before, &after, &CompareScope::default())
        .await
        .expect("compare");

    let pool = result
        .records
        .iter()
        .find(|r| r.category == Category::Pools)
        .expect("pool record");
    assert_eq!(pool.changed_fields(), vec!["members"]);

    let item = result
        .analysis
        .iter()
        .find(|item| item.rule == "service-object-change")
        .expect("service finding");
    assert_eq!(item.kind, ImpactKind::Service);
    assert_eq!(item.severity, Severity::Warning);
    assert_eq!(item.affected_objects[0], "/Common/web-pool");
    assert!(result.service_impact);
}

#[tokio::test]
async fn added_certificate_is_a_security_change() {
    let engine = engine();
    let before = stored(&engine, "edge-a", "v1");
    let after = stored(&engine, "edge-a", "v2");
    let result = engine
        .compare(&before, &after, &CompareScope::default())
        .await
        .expect("compare");

    let cert = result
        .analysis
        .iter()
        .find(|item| item.rule == "certificate-change")
        .expect("certificate finding");
    assert_eq!(cert.kind, ImpactKind::Security);
    assert_eq!(cert.severity, Severity::Warning);
    assert!(cert.message.contains("/Common/cert-api"));
    assert!(result.security_impact);
}

#[tokio::test]
async fn weak_cipher_is_critical() {
    let engine = engine();
    let before = stored(&engine, "edge-a", "v1");
    let after = stored(&engine, "edge-a", "v2");
    let result = engine
        .compare(&before, &after, &CompareScope::default())
        .await
        .expect("compare");

    let ssl = result
        .analysis
        .iter()
        .find(|item| item.rule == "ssl-profile-change")
        .expect("ssl finding");
    assert_eq!(ssl.severity, Severity::Critical);
    assert_eq!(ssl.detail.as_deref(), Some("ciphers now enable RC4-SHA"));
    assert!(result
        .recommendations
        .iter()
        .any(|rec| rec.rule == "weakened-ssl"));
}

#[tokio::test]
async fn removed_node_points_at_pools_that_used_it() {
    let engine = engine();
    let before = stored(&engine, "edge-a", "v1");
    let after = stored(&engine, "edge-a", "v2");
    let result = engine
        .compare(&before, &after, &CompareScope::default())
        .await
        .expect("compare");

    let rec = result
        .recommendations
        .iter()
        .find(|rec| rec.rule == "node-removed")
        .expect("node recommendation");
    assert_eq!(rec.objects, vec!["/Common/10.0.0.2", "/Common/web-pool"]);
    assert_eq!(rec.device.as_deref(), Some("edge-a"));
}

#[tokio::test]
async fn category_scope_limits_records_and_impact() {
    let engine = engine();
    let before = stored(&engine, "edge-a", "v1");
    let after = stored(&engine, "edge-a", "v2");
    let scope = CompareScope {
        objects: DiffScope::categories([Category::Nodes]),
        ..CompareScope::default()
    };

    let result = engine.compare(&before, &after, &scope).await.expect("compare");
    assert_eq!(result.summary.total, 1);
    assert_eq!(result.records[0].category, Category::Nodes);
    assert!(!result.security_impact);
    assert!(!result.service_impact);
}

#[tokio::test]
async fn node_scope_on_identical_snapshots_is_empty() {
    let engine = engine();
    let only = stored(&engine, "edge-a", "v1");
    let scope = CompareScope {
        objects: DiffScope::categories([Category::Nodes]),
        ..CompareScope::default()
    };

    let result = engine.compare(&only, &only, &scope).await.expect("compare");
    assert!(result.records.is_empty());
    assert_eq!(result.summary.total, 0);
    assert_eq!(result.summary.added + result.summary.removed + result.summary.modified, 0);
}

#[tokio::test]
async fn object_scope_matches_bare_names() {
    let engine = engine();
    let before = stored(&engine, "edge-a", "v1");
    let after = stored(&engine, "edge-a", "v2");
    let scope = CompareScope {
        objects: DiffScope {
            categories: None,
            objects: Some(["web-pool".to_string()].into_iter().collect()),
        },
        ..CompareScope::default()
    };

    let result = engine.compare(&before, &after, &scope).await.expect("compare");
    assert_eq!(result.records.len(), 1);
    assert_eq!(result.records[0].name, "/Common/web-pool");
}

#[tokio::test]
async fn identical_snapshots_have_no_changes() {
    let engine = engine();
    let first = stored(&engine, "edge-a", "v1");
    let second = stored(&engine, "edge-a", "v1");

    let result = engine
        .compare(&first, &second, &CompareScope::default())
        .await
        .expect("compare");
    assert!(!result.has_changes());
    assert!(result.analysis.is_empty());
    assert!(!result.security_impact && !result.service_impact);
}

#[tokio::test]
async fn swapping_sides_inverts_every_change() {
    let engine = engine();
    let before = stored(&engine, "edge-a", "v1");
    let after = stored(&engine, "edge-a", "v2");

    let forward = engine
        .compare(&before, &after, &CompareScope::default())
        .await
        .expect("forward");
    let backward = engine
        .compare(&after, &before, &CompareScope::default())
        .await
        .expect("backward");

    let inverted: Vec<_> = forward.records.iter().map(|r| r.inverted()).collect();
    assert_eq!(backward.records, inverted);
}

#[tokio::test]
async fn devices_can_be_compared_across_a_snapshot() {
    let engine = engine();
    let snapshot = engine
        .create_backup(
            vec![
                RawConfig::new("edge-a", fixture("v1/edge-a.conf")),
                RawConfig::new("edge-b", fixture("v2/edge-a.conf")),
            ],
            "ops",
            None,
        )
        .expect("backup");
    let side = SnapshotRef::Stored(snapshot.id);
    let scope = CompareScope {
        pairs: vec![DevicePair {
            source: "edge-a".to_string(),
            target: "edge-b".to_string(),
        }],
        ..CompareScope::default()
    };

    let result = engine.compare(&side, &side, &scope).await.expect("compare");
    assert_eq!(result.pairs, scope.pairs);
    assert_eq!(result.summary.total, 5);
    assert!(result.records.iter().all(|r| r.device.as_deref() == Some("edge-b")));
}

#[tokio::test]
async fn devices_on_one_side_only_are_listed() {
    let engine = engine();
    let before = stored(&engine, "edge-a", "v1");
    let after = engine
        .create_backup(
            vec![
                RawConfig::new("edge-a", fixture("v1/edge-a.conf")),
                RawConfig::new("edge-c", fixture("v1/edge-a.conf")),
            ],
            "ops",
            None,
        )
        .expect("backup");

    let result = engine
        .compare(&before, &SnapshotRef::Stored(after.id), &CompareScope::default())
        .await
        .expect("compare");
    assert_eq!(result.unpaired_devices, vec!["edge-c"]);
    assert!(result.is_partial());
    assert!(!result.has_changes());
}

/// Every finding and recommendation cites at least one object, and only
/// objects that have a record on the same device.
fn assert_citations_come_from_records(result: &ComparisonResult) {
    let mut names: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for record in &result.records {
        let device = record.device.as_deref().expect("record device");
        names.entry(device).or_default().insert(record.name.as_str());
    }

    for item in &result.analysis {
        let known = &names[item.device.as_deref().expect("item device")];
        assert!(!item.affected_objects.is_empty(), "{} cites nothing", item.rule);
        for object in &item.affected_objects {
            assert!(known.contains(object.as_str()), "{} cites {object}", item.rule);
        }
    }
    for rec in &result.recommendations {
        let known = &names[rec.device.as_deref().expect("recommendation device")];
        assert!(!rec.objects.is_empty(), "{} cites nothing", rec.rule);
        for object in &rec.objects {
            assert!(known.contains(object.as_str()), "{} cites {object}", rec.rule);
        }
    }
}

/// v2 with the virtual server moved to another port and the health
/// monitor deleted.
fn reworked_v2() -> String {
    let mut text = fixture("v2/edge-a.conf").replace("10.1.1.10:443", "10.1.1.10:8443");
    let start = text
        .find("ltm monitor http /Common/http-health {")
        .expect("monitor stanza");
    let end = start + text[start..].find("\n}\n").expect("monitor end") + 3;
    text.replace_range(start..end, "");
    text
}

#[tokio::test]
async fn findings_only_cite_changed_objects() {
    let engine = engine();
    let before = stored(&engine, "edge-a", "v1");
    let after = stored(&engine, "edge-a", "v2");
    let reworked = engine
        .create_backup(vec![RawConfig::new("edge-a", reworked_v2())], "ops", None)
        .expect("backup");
    let reworked = SnapshotRef::Stored(reworked.id);

    let mut rules_seen = BTreeSet::new();
    for (source, target) in [
        (&before, &after),
        (&after, &before),
        (&before, &reworked),
        (&reworked, &before),
    ] {
        let result = engine
            .compare(source, target, &CompareScope::default())
            .await
            .expect("compare");
        assert!(!result.analysis.is_empty());
        assert_citations_come_from_records(&result);
        rules_seen.extend(result.analysis.iter().map(|item| item.rule.clone()));
        rules_seen.extend(result.recommendations.iter().map(|rec| rec.rule.clone()));
    }

    for rule in ["ssl-profile-reference", "monitor-coverage", "node-removed", "certificate-in-use"] {
        assert!(rules_seen.contains(rule), "{rule} never fired");
    }
}

#[tokio::test]
async fn unknown_snapshot_is_a_storage_error() {
    let engine = engine();
    let known = stored(&engine, "edge-a", "v1");
    let err = engine
        .compare(
            &known,
            &SnapshotRef::Stored("missing".to_string()),
            &CompareScope::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CompareError::Storage(StorageError::NotFound(id)) if id == "missing"
    ));
}
