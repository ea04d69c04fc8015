use std::collections::BTreeSet;

use super::inspect::{is_additive, is_ssl_profile, ssl_weakening};
use super::{AnalysisItem, ClassifierSettings, ImpactKind, ImpactRule, RuleError, Severity};
use crate::category::Category;
use crate::diff::{ChangeType, DiffRecord};

/// Any certificate or key change; removals are critical.
pub struct CertificateChange;

impl ImpactRule for CertificateChange {
    fn code(&self) -> &'static str {
        "certificate-change"
    }

    fn evaluate(
        &self,
        records: &[DiffRecord],
        _settings: &ClassifierSettings,
    ) -> Result<Vec<AnalysisItem>, RuleError> {
        Ok(records
            .iter()
            .filter(|r| r.category == Category::Certificates)
            .map(|record| {
                let (severity, verb) = match record.change {
                    ChangeType::Added => (Severity::Warning, "added"),
                    ChangeType::Removed => (Severity::Critical, "removed"),
                    ChangeType::Modified => (Severity::Warning, "replaced"),
                };
                let what = match record.kind.as_deref() {
                    Some("ssl-key" | "key") => "key",
                    _ => "certificate",
                };
                AnalysisItem::for_record(
                    record,
                    ImpactKind::Security,
                    severity,
                    self.code(),
                    format!("{what} {} {verb}", record.name),
                )
            })
            .collect())
    }
}

/// SSL profile changes, escalated when protection is lowered.
pub struct SslProfileChange;

impl ImpactRule for SslProfileChange {
    fn code(&self) -> &'static str {
        "ssl-profile-change"
    }

    fn evaluate(
        &self,
        records: &[DiffRecord],
        settings: &ClassifierSettings,
    ) -> Result<Vec<AnalysisItem>, RuleError> {
        let mut out = Vec::new();
        for record in records.iter().filter(|r| is_ssl_profile(r)) {
            let weakening = ssl_weakening(record, settings);
            let item = if weakening.is_empty() {
                AnalysisItem::for_record(
                    record,
                    ImpactKind::Security,
                    Severity::Warning,
                    self.code(),
                    format!("SSL profile {} {}", record.name, record.change.as_str()),
                )
            } else {
                AnalysisItem::for_record(
                    record,
                    ImpactKind::Security,
                    Severity::Critical,
                    self.code(),
                    format!("SSL profile {} weakened", record.name),
                )
                .with_detail(weakening.join("; "))
            };
            out.push(item);
        }
        Ok(out)
    }
}

/// Virtual servers whose profile list names an SSL profile changed in the
/// same record set.
pub struct SslProfileReference;

impl ImpactRule for SslProfileReference {
    fn code(&self) -> &'static str {
        "ssl-profile-reference"
    }

    fn evaluate(
        &self,
        records: &[DiffRecord],
        _settings: &ClassifierSettings,
    ) -> Result<Vec<AnalysisItem>, RuleError> {
        let changed_ssl: BTreeSet<&str> = records
            .iter()
            .filter(|r| is_ssl_profile(r))
            .map(|r| r.name.as_str())
            .collect();
        if changed_ssl.is_empty() {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        for record in records
            .iter()
            .filter(|r| r.category == Category::VirtualServers)
        {
            let referenced: Vec<&str> = [record.old_fields.as_ref(), record.new_fields.as_ref()]
                .into_iter()
                .flatten()
                .filter_map(|fields| fields.get("profiles"))
                .filter_map(|profiles| profiles.as_block())
                .flat_map(|block| block.names())
                .filter(|name| changed_ssl.contains(name))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            if referenced.is_empty() {
                continue;
            }
            let mut item = AnalysisItem::for_record(
                record,
                ImpactKind::Security,
                Severity::Warning,
                self.code(),
                format!(
                    "virtual server {} uses changed SSL profile {}",
                    record.name,
                    referenced.join(", ")
                ),
            );
            item.affected_objects
                .extend(referenced.iter().map(ToString::to_string));
            out.push(item);
        }
        Ok(out)
    }
}

/// Virtual servers, pools, monitors and profiles without TLS settings.
///
/// Purely additive changes are informational, anything else is a warning.
pub struct ServiceObjectChange;

impl ImpactRule for ServiceObjectChange {
    fn code(&self) -> &'static str {
        "service-object-change"
    }

    fn evaluate(
        &self,
        records: &[DiffRecord],
        _settings: &ClassifierSettings,
    ) -> Result<Vec<AnalysisItem>, RuleError> {
        let mut out = Vec::new();
        for record in records {
            let label = match record.category {
                Category::VirtualServers => "virtual server",
                Category::Pools => "pool",
                Category::Monitors => "monitor",
                Category::Profiles if !is_ssl_profile(record) => "profile",
                _ => continue,
            };
            let additive = is_additive(record);
            let severity = if additive {
                Severity::Info
            } else {
                Severity::Warning
            };
            let mut item = AnalysisItem::for_record(
                record,
                ImpactKind::Service,
                severity,
                self.code(),
                format!("{label} {} {}", record.name, record.change.as_str()),
            );
            if record.change == ChangeType::Modified {
                item = item.with_detail(format!(
                    "fields: {}{}",
                    record.changed_fields().join(", "),
                    if additive { " (additive)" } else { "" }
                ));
            }
            out.push(item);
        }
        Ok(out)
    }
}

/// iRules and local traffic policies alter request handling.
pub struct TrafficLogicChange;

impl ImpactRule for TrafficLogicChange {
    fn code(&self) -> &'static str {
        "traffic-logic-change"
    }

    fn evaluate(
        &self,
        records: &[DiffRecord],
        _settings: &ClassifierSettings,
    ) -> Result<Vec<AnalysisItem>, RuleError> {
        Ok(records
            .iter()
            .filter_map(|record| {
                let label = match record.category {
                    Category::IRules => "iRule",
                    Category::Policies => "policy",
                    _ => return None,
                };
                let severity = if record.change == ChangeType::Added {
                    Severity::Info
                } else {
                    Severity::Warning
                };
                Some(AnalysisItem::for_record(
                    record,
                    ImpactKind::Service,
                    severity,
                    self.code(),
                    format!("{label} {} {}", record.name, record.change.as_str()),
                ))
            })
            .collect())
    }
}

/// Data groups, nodes and everything uncategorized.
pub struct InformationalChange;

impl ImpactRule for InformationalChange {
    fn code(&self) -> &'static str {
        "informational-change"
    }

    fn evaluate(
        &self,
        records: &[DiffRecord],
        _settings: &ClassifierSettings,
    ) -> Result<Vec<AnalysisItem>, RuleError> {
        Ok(records
            .iter()
            .filter(|r| {
                matches!(
                    r.category,
                    Category::DataGroups | Category::Nodes | Category::Other
                )
            })
            .map(|record| {
                AnalysisItem::for_record(
                    record,
                    ImpactKind::Informational,
                    Severity::Info,
                    self.code(),
                    format!(
                        "{} {} {}",
                        record.category,
                        record.name,
                        record.change.as_str()
                    ),
                )
            })
            .collect())
    }
}
