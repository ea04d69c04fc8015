use tmsh_diff_core::FieldChange;

use super::inspect::{is_ssl_profile, mentions, ssl_weakening};
use super::{ClassifierSettings, Recommendation, Recommender, RuleError};
use crate::category::Category;
use crate::diff::{ChangeType, DiffRecord};

fn recommendation(rule: &str, device: Option<&String>, message: String, objects: Vec<String>) -> Recommendation {
    Recommendation {
        rule: rule.to_string(),
        message,
        objects,
        device: device.cloned(),
    }
}

fn of_change(records: &[DiffRecord], category: Category, change: ChangeType) -> impl Iterator<Item = &DiffRecord> {
    records
        .iter()
        .filter(move |r| r.category == category && r.change == change)
}

/// Monitors removed without any monitor being added in their place.
pub struct MonitorCoverage;

impl Recommender for MonitorCoverage {
    fn code(&self) -> &'static str {
        "monitor-coverage"
    }

    fn recommend(
        &self,
        records: &[DiffRecord],
        _settings: &ClassifierSettings,
    ) -> Result<Vec<Recommendation>, RuleError> {
        if of_change(records, Category::Monitors, ChangeType::Added).next().is_some() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for monitor in of_change(records, Category::Monitors, ChangeType::Removed) {
            let mut objects = vec![monitor.name.clone()];
            objects.extend(
                records
                    .iter()
                    .filter(|r| r.category == Category::Pools)
                    .filter(|r| r.old_fields.as_ref().is_some_and(|f| mentions(f, &monitor.name)))
                    .map(|r| r.name.clone()),
            );
            out.push(recommendation(
                self.code(),
                monitor.device.as_ref(),
                format!(
                    "monitor {} was removed with no replacement; confirm health checking still covers its pools",
                    monitor.name
                ),
                objects,
            ));
        }
        Ok(out)
    }
}

/// Pools that lost their monitor assignment.
pub struct PoolMonitorDropped;

impl Recommender for PoolMonitorDropped {
    fn code(&self) -> &'static str {
        "pool-monitor-dropped"
    }

    fn recommend(
        &self,
        records: &[DiffRecord],
        _settings: &ClassifierSettings,
    ) -> Result<Vec<Recommendation>, RuleError> {
        Ok(of_change(records, Category::Pools, ChangeType::Modified)
            .filter(|pool| {
                pool.field_changes
                    .iter()
                    .any(|c| matches!(c, FieldChange::Removed { name, .. } if name == "monitor"))
            })
            .map(|pool| {
                recommendation(
                    self.code(),
                    pool.device.as_ref(),
                    format!("pool {} no longer has a health monitor", pool.name),
                    vec![pool.name.clone()],
                )
            })
            .collect())
    }
}

/// Certificates removed while an SSL profile in the record set refers to
/// them.
pub struct CertificateInUse;

impl Recommender for CertificateInUse {
    fn code(&self) -> &'static str {
        "certificate-in-use"
    }

    fn recommend(
        &self,
        records: &[DiffRecord],
        _settings: &ClassifierSettings,
    ) -> Result<Vec<Recommendation>, RuleError> {
        let mut out = Vec::new();
        for cert in of_change(records, Category::Certificates, ChangeType::Removed) {
            let users: Vec<String> = records
                .iter()
                .filter(|r| is_ssl_profile(r))
                .filter(|r| r.new_fields.as_ref().is_some_and(|f| mentions(f, &cert.name)))
                .map(|r| r.name.clone())
                .collect();
            let message = if users.is_empty() {
                format!(
                    "certificate {} was removed; confirm no SSL profile still references it",
                    cert.name
                )
            } else {
                format!(
                    "certificate {} was removed but is still referenced by {}",
                    cert.name,
                    users.join(", ")
                )
            };
            let mut objects = vec![cert.name.clone()];
            objects.extend(users);
            out.push(recommendation(self.code(), cert.device.as_ref(), message, objects));
        }
        Ok(out)
    }
}

/// Removed nodes, listing pools that carried members on them.
pub struct NodeRemoved;

impl Recommender for NodeRemoved {
    fn code(&self) -> &'static str {
        "node-removed"
    }

    fn recommend(
        &self,
        records: &[DiffRecord],
        _settings: &ClassifierSettings,
    ) -> Result<Vec<Recommendation>, RuleError> {
        let mut out = Vec::new();
        for node in of_change(records, Category::Nodes, ChangeType::Removed) {
            let pools: Vec<String> = records
                .iter()
                .filter(|r| r.category == Category::Pools)
                .filter(|r| {
                    r.old_fields
                        .as_ref()
                        .and_then(|f| f.get("members"))
                        .and_then(|m| m.as_block())
                        .is_some_and(|members| members.names().any(|m| member_on_node(m, &node.name)))
                })
                .map(|r| r.name.clone())
                .collect();
            let mut objects = vec![node.name.clone()];
            objects.extend(pools);
            out.push(recommendation(
                self.code(),
                node.device.as_ref(),
                format!(
                    "node {} was removed; check that no pool still lists members on it",
                    node.name
                ),
                objects,
            ));
        }
        Ok(out)
    }
}

fn member_on_node(member: &str, node: &str) -> bool {
    member
        .strip_prefix(node)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(':') || rest.starts_with('.'))
}

/// SSL profiles whose protection was lowered.
pub struct WeakenedSsl;

impl Recommender for WeakenedSsl {
    fn code(&self) -> &'static str {
        "weakened-ssl"
    }

    fn recommend(
        &self,
        records: &[DiffRecord],
        settings: &ClassifierSettings,
    ) -> Result<Vec<Recommendation>, RuleError> {
        Ok(records
            .iter()
            .filter_map(|record| {
                let reasons = ssl_weakening(record, settings);
                if reasons.is_empty() {
                    return None;
                }
                Some(recommendation(
                    self.code(),
                    record.device.as_ref(),
                    format!(
                        "review SSL profile {} before applying: {}",
                        record.name,
                        reasons.join("; ")
                    ),
                    vec![record.name.clone()],
                ))
            })
            .collect())
    }
}

/// Virtual servers pointing at a pool removed in the same record set.
pub struct DanglingPoolReference;

impl Recommender for DanglingPoolReference {
    fn code(&self) -> &'static str {
        "dangling-pool-reference"
    }

    fn recommend(
        &self,
        records: &[DiffRecord],
        _settings: &ClassifierSettings,
    ) -> Result<Vec<Recommendation>, RuleError> {
        let mut out = Vec::new();
        for pool in of_change(records, Category::Pools, ChangeType::Removed) {
            for vs in records
                .iter()
                .filter(|r| r.category == Category::VirtualServers && r.change != ChangeType::Removed)
            {
                let points_at_pool = vs
                    .new_fields
                    .as_ref()
                    .and_then(|f| f.get("pool"))
                    .and_then(|p| p.as_scalar())
                    .is_some_and(|p| p == pool.name);
                if points_at_pool {
                    out.push(recommendation(
                        self.code(),
                        vs.device.as_ref(),
                        format!(
                            "virtual server {} still uses removed pool {}",
                            vs.name, pool.name
                        ),
                        vec![vs.name.clone(), pool.name.clone()],
                    ));
                }
            }
        }
        Ok(out)
    }
}
