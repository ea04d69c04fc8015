//! Impact analysis of object-level differences.
//!
//! Each [`ImpactRule`] looks at the whole record set and emits zero or more
//! [`AnalysisItem`]s; [`Recommender`]s emit follow-up advice. Rules run in a
//! fixed order and a failing rule is logged and skipped.

mod inspect;
mod recommend;
mod rules;

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::diff::DiffRecord;

pub use inspect::{enabled_weak_ciphers, is_additive, mentions, ssl_weakening};
pub use recommend::{
    CertificateInUse, DanglingPoolReference, MonitorCoverage, NodeRemoved, PoolMonitorDropped,
    WeakenedSsl,
};
pub use rules::{
    CertificateChange, InformationalChange, ServiceObjectChange, SslProfileChange,
    SslProfileReference, TrafficLogicChange,
};

/// Area an analysis item concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactKind {
    Security,
    Service,
    Informational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// A finding about one or more changed objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisItem {
    pub kind: ImpactKind,
    pub severity: Severity,
    /// Code of the rule that produced the item.
    pub rule: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub affected_objects: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
}

impl AnalysisItem {
    /// Item about a single record.
    pub fn for_record(
        record: &DiffRecord,
        kind: ImpactKind,
        severity: Severity,
        rule: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            rule: rule.to_string(),
            message: message.into(),
            detail: None,
            affected_objects: vec![record.name.clone()],
            device: record.device.clone(),
            device_name: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Follow-up advice tied to concrete objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub rule: String,
    pub message: String,
    pub objects: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

/// A rule that failed and whose output was left out.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("rule {rule} failed: {reason}")]
pub struct ClassificationError {
    pub rule: String,
    pub reason: String,
}

/// Reason a rule gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct RuleError(pub String);

/// Tunables shared by all rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Cipher name fragments considered weak when enabled.
    pub weak_ciphers: Vec<String>,
    /// SSL profile options whose removal weakens a profile.
    pub protective_options: Vec<String>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            weak_ciphers: [
                "RC4", "DES", "3DES", "EXP", "EXPORT", "NULL", "eNULL", "aNULL", "MD5", "SSLv3",
                "TLSv1",
            ]
            .into_iter()
            .map(ToString::to_string)
            .collect(),
            protective_options: ["no-ssl", "no-sslv3", "no-tlsv1", "no-tlsv1.1"]
                .into_iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

pub trait ImpactRule: Send + Sync {
    fn code(&self) -> &'static str;

    fn evaluate(
        &self,
        records: &[DiffRecord],
        settings: &ClassifierSettings,
    ) -> Result<Vec<AnalysisItem>, RuleError>;
}

pub trait Recommender: Send + Sync {
    fn code(&self) -> &'static str;

    fn recommend(
        &self,
        records: &[DiffRecord],
        settings: &ClassifierSettings,
    ) -> Result<Vec<Recommendation>, RuleError>;
}

/// Output of one classification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub items: Vec<AnalysisItem>,
    pub recommendations: Vec<Recommendation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ClassificationError>,
}

impl Classification {
    pub fn security_impact(&self) -> bool {
        self.items.iter().any(|item| item.kind == ImpactKind::Security)
    }

    pub fn service_impact(&self) -> bool {
        self.items.iter().any(|item| item.kind == ImpactKind::Service)
    }

    /// Fold another pass into this one, keeping order.
    pub fn extend(&mut self, other: Classification) {
        self.items.extend(other.items);
        self.recommendations.extend(other.recommendations);
        self.errors.extend(other.errors);
    }
}

/// Runs the rule list over a record set.
pub struct ImpactClassifier {
    settings: ClassifierSettings,
    rules: Vec<Box<dyn ImpactRule>>,
    recommenders: Vec<Box<dyn Recommender>>,
}

impl Default for ImpactClassifier {
    fn default() -> Self {
        Self::new(ClassifierSettings::default())
    }
}

impl ImpactClassifier {
    /// Classifier with the standard rule set.
    pub fn new(settings: ClassifierSettings) -> Self {
        Self::with_rules(settings, standard_rules(), standard_recommenders())
    }

    pub fn with_rules(
        settings: ClassifierSettings,
        rules: Vec<Box<dyn ImpactRule>>,
        recommenders: Vec<Box<dyn Recommender>>,
    ) -> Self {
        Self {
            settings,
            rules,
            recommenders,
        }
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    pub fn classify(&self, records: &[DiffRecord]) -> Classification {
        let mut out = Classification::default();

        for rule in &self.rules {
            match guarded(rule.code(), || rule.evaluate(records, &self.settings)) {
                Ok(items) => out.items.extend(items),
                Err(err) => out.errors.push(err),
            }
        }
        for recommender in &self.recommenders {
            match guarded(recommender.code(), || {
                recommender.recommend(records, &self.settings)
            }) {
                Ok(recommendations) => out.recommendations.extend(recommendations),
                Err(err) => out.errors.push(err),
            }
        }
        out
    }
}

fn guarded<T>(
    code: &str,
    run: impl FnOnce() -> Result<Vec<T>, RuleError>,
) -> Result<Vec<T>, ClassificationError> {
    let reason = match catch_unwind(AssertUnwindSafe(run)) {
        Ok(Ok(output)) => return Ok(output),
        Ok(Err(err)) => err.0,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "rule panicked".to_string()),
    };
    warn!(rule = code, %reason, "classification rule failed, output omitted");
    Err(ClassificationError {
        rule: code.to_string(),
        reason,
    })
}

pub fn standard_rules() -> Vec<Box<dyn ImpactRule>> {
    vec![
        Box::new(CertificateChange),
        Box::new(SslProfileChange),
        Box::new(SslProfileReference),
        Box::new(ServiceObjectChange),
        Box::new(TrafficLogicChange),
        Box::new(InformationalChange),
    ]
}

pub fn standard_recommenders() -> Vec<Box<dyn Recommender>> {
    vec![
        Box::new(MonitorCoverage),
        Box::new(PoolMonitorDropped),
        Box::new(CertificateInUse),
        Box::new(NodeRemoved),
        Box::new(WeakenedSsl),
        Box::new(DanglingPoolReference),
    ]
}

#[cfg(test)]
mod tests {
    use super::{
        standard_recommenders, standard_rules, AnalysisItem, ClassifierSettings, ImpactClassifier,
        ImpactKind, ImpactRule, RuleError, Severity,
    };
    use crate::diff::{diff, DiffRecord};
    use crate::section::SectionParser;

    struct Exploding;

    impl ImpactRule for Exploding {
        fn code(&self) -> &'static str {
            "exploding"
        }

        fn evaluate(
            &self,
            _records: &[DiffRecord],
            _settings: &ClassifierSettings,
        ) -> Result<Vec<AnalysisItem>, RuleError> {
            panic!("boom")
        }
    }

    struct Refusing;

    impl ImpactRule for Refusing {
        fn code(&self) -> &'static str {
            "refusing"
        }

        fn evaluate(
            &self,
            _records: &[DiffRecord],
            _settings: &ClassifierSettings,
        ) -> Result<Vec<AnalysisItem>, RuleError> {
            Err(RuleError("cannot decide".to_string()))
        }
    }

    fn records() -> Vec<DiffRecord> {
        let parser = SectionParser::default();
        let old = parser
            .parse("ltm pool /Common/p {\n    load-balancing-mode round-robin\n}\n")
            .unwrap();
        let new = parser
            .parse("ltm pool /Common/p {\n    load-balancing-mode ratio-member\n}\n")
            .unwrap();
        diff(&old, &new)
    }

    #[test]
    fn failing_rules_are_skipped() {
        let mut rules = standard_rules();
        rules.insert(0, Box::new(Exploding));
        rules.insert(1, Box::new(Refusing));
        let classifier =
            ImpactClassifier::with_rules(ClassifierSettings::default(), rules, standard_recommenders());

        let result = classifier.classify(&records());
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[0].rule, "exploding");
        assert_eq!(result.errors[0].reason, "boom");
        assert_eq!(result.errors[1].reason, "cannot decide");
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].kind, ImpactKind::Service);
        assert_eq!(result.items[0].severity, Severity::Warning);
    }

    #[test]
    fn empty_record_set_has_no_findings() {
        let result = ImpactClassifier::default().classify(&[]);
        assert!(result.items.is_empty());
        assert!(result.recommendations.is_empty());
        assert!(!result.security_impact());
        assert!(!result.service_impact());
    }
}
