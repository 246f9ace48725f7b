//! Telemetry governance and research-export anonymization
//!
//! The engine may only measure its own constitutional compliance and
//! operational health, never the user: the metric policy is a whitelist,
//! and everything outside it is forbidden by default. Research exports go
//! through timestamp coarsening, feature abstraction, and a k-anonymity
//! gate (k >= 10); a dataset that fails the gate is not exported at all.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use mirror_core::Timestamp;

/// Metrics the engine is permitted to record about itself
pub const ALLOWED_METRICS: &[&str] = &[
    "constitutional_compliance",
    "response_latency",
    "error_rate",
    "availability",
    "api_response_time",
    "database_query_time",
    "cache_hit_rate",
    "sync_success_rate",
    "export_count",
    "constitutional_violation_count",
    "l0_check_pass_rate",
    "l1_tier1_blocks",
    "l1_tier2_flags",
    "drift_alert_count",
];

/// Name fragments that mark a metric as tracking the user rather than the
/// system; any metric containing one is forbidden even before the
/// whitelist default applies
pub const FORBIDDEN_METRIC_PATTERNS: &[&str] = &[
    "mood",
    "emotion",
    "sentiment",
    "affect",
    "behavior",
    "habit",
    "routine",
    "pattern",
    "goal",
    "achievement",
    "progress",
    "milestone",
    "retention",
    "engagement",
    "stickiness",
    "churn",
    "frequency",
    "duration",
    "session_length",
    "theme_evolution",
    "identity_change",
    "growth",
    "user_satisfaction",
    "nps",
    "rating",
    "content_type",
    "topic_distribution",
];

/// Result of validating one metric name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricCheck {
    pub metric_name: String,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Whitelist policy over what the system may measure about itself
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryPolicy;

impl TelemetryPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Check a single metric name against the policy.
    pub fn check_metric(&self, metric_name: &str) -> MetricCheck {
        let lowered = metric_name.to_lowercase();
        if ALLOWED_METRICS.contains(&lowered.as_str()) {
            return MetricCheck {
                metric_name: metric_name.to_string(),
                allowed: true,
                reason: None,
            };
        }
        for forbidden in FORBIDDEN_METRIC_PATTERNS {
            if lowered.contains(forbidden) {
                return MetricCheck {
                    metric_name: metric_name.to_string(),
                    allowed: false,
                    reason: Some(format!("contains forbidden pattern {forbidden:?}")),
                };
            }
        }
        MetricCheck {
            metric_name: metric_name.to_string(),
            allowed: false,
            reason: Some("not in the allowed metrics whitelist".to_string()),
        }
    }

    /// Validate a whole batch, one check per metric name.
    pub fn validate_batch(
        &self,
        metrics: &BTreeMap<String, serde_json::Value>,
    ) -> BTreeMap<String, MetricCheck> {
        metrics
            .keys()
            .map(|name| (name.clone(), self.check_metric(name)))
            .collect()
    }

    /// Drop every metric the policy forbids.
    pub fn filter_allowed(
        &self,
        metrics: &BTreeMap<String, serde_json::Value>,
    ) -> BTreeMap<String, serde_json::Value> {
        metrics
            .iter()
            .filter(|(name, _)| {
                let check = self.check_metric(name);
                if !check.allowed {
                    tracing::warn!(metric = %name, reason = ?check.reason, "metric dropped by telemetry policy");
                }
                check.allowed
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

/// Granularity for timestamp coarsening
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeGranularity {
    Hour,
    Day,
    /// Start of the ISO week (Monday)
    Week,
}

/// How a record field is abstracted before export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureType {
    /// Integer ages become ranges (18-24, 25-34, ..., 65+)
    Age,
    /// "city, state, country" strings keep only the country
    Location,
    /// Numbers round to the nearest 10
    Numeric,
    /// Unix-millisecond timestamps coarsen to the hour
    Timestamp,
}

/// Result of a k-anonymity check over a candidate export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KAnonymityCheck {
    pub passed: bool,
    /// Smallest quasi-identifier group size observed
    pub k_value: usize,
    pub required_k: usize,
    pub violations: Vec<String>,
}

/// One export record: field name to JSON value
pub type ExportRecord = BTreeMap<String, serde_json::Value>;

const HOUR_MS: i64 = 3_600_000;
const DAY_MS: i64 = 86_400_000;

/// K-anonymity pipeline for research-data exports
#[derive(Debug, Clone, Copy)]
pub struct ResearchAnonymizer {
    min_k: usize,
}

impl Default for ResearchAnonymizer {
    fn default() -> Self {
        Self { min_k: 10 }
    }
}

impl ResearchAnonymizer {
    pub fn new(min_k: usize) -> Self {
        Self { min_k }
    }

    /// Reduce a timestamp's precision.
    pub fn coarsen_timestamp(&self, timestamp: Timestamp, granularity: TimeGranularity) -> Timestamp {
        let ms = timestamp.as_millis();
        let coarsened = match granularity {
            TimeGranularity::Hour => ms - ms.rem_euclid(HOUR_MS),
            TimeGranularity::Day => ms - ms.rem_euclid(DAY_MS),
            TimeGranularity::Week => {
                let days = ms.div_euclid(DAY_MS);
                // Day 0 of the epoch was a Thursday; Monday-based offset.
                let days_since_monday = (days + 3).rem_euclid(7);
                (days - days_since_monday) * DAY_MS
            }
        };
        Timestamp::from_unix_millis(coarsened)
    }

    /// Abstract one feature value to reduce specificity. Values that do
    /// not match the declared type pass through unchanged.
    pub fn abstract_feature(
        &self,
        value: &serde_json::Value,
        feature_type: FeatureType,
    ) -> serde_json::Value {
        match feature_type {
            FeatureType::Age => match value.as_i64() {
                Some(age) if age < 25 => serde_json::json!("18-24"),
                Some(age) if age < 35 => serde_json::json!("25-34"),
                Some(age) if age < 45 => serde_json::json!("35-44"),
                Some(age) if age < 55 => serde_json::json!("45-54"),
                Some(age) if age < 65 => serde_json::json!("55-64"),
                Some(_) => serde_json::json!("65+"),
                None => value.clone(),
            },
            FeatureType::Location => match value.as_str() {
                Some(location) => {
                    let country = location.rsplit(',').next().unwrap_or(location).trim();
                    serde_json::json!(country)
                }
                None => value.clone(),
            },
            FeatureType::Numeric => match value.as_f64() {
                Some(n) => serde_json::json!(((n / 10.0).round() * 10.0) as i64),
                None => value.clone(),
            },
            FeatureType::Timestamp => match value.as_i64() {
                Some(ms) => {
                    let coarse = self
                        .coarsen_timestamp(Timestamp::from_unix_millis(ms), TimeGranularity::Hour);
                    serde_json::json!(coarse.as_millis())
                }
                None => value.clone(),
            },
        }
    }

    /// Check that every quasi-identifier group holds at least `min_k`
    /// records.
    pub fn check_k_anonymity(
        &self,
        records: &[ExportRecord],
        quasi_identifiers: &[&str],
    ) -> KAnonymityCheck {
        if records.is_empty() {
            return KAnonymityCheck {
                passed: false,
                k_value: 0,
                required_k: self.min_k,
                violations: vec!["no records provided".to_string()],
            };
        }

        let mut groups: BTreeMap<Vec<String>, usize> = BTreeMap::new();
        for record in records {
            let key: Vec<String> = quasi_identifiers
                .iter()
                .map(|qi| {
                    record
                        .get(*qi)
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "null".to_string())
                })
                .collect();
            *groups.entry(key).or_insert(0) += 1;
        }

        let k_value = groups.values().copied().min().unwrap_or(0);
        let violations: Vec<String> = groups
            .iter()
            .filter(|(_, count)| **count < self.min_k)
            .map(|(key, count)| {
                let described: Vec<String> = quasi_identifiers
                    .iter()
                    .zip(key)
                    .map(|(qi, value)| format!("{qi}={value}"))
                    .collect();
                format!(
                    "group ({}) has only {count} records (need {})",
                    described.join(", "),
                    self.min_k
                )
            })
            .collect();

        KAnonymityCheck {
            passed: k_value >= self.min_k,
            k_value,
            required_k: self.min_k,
            violations,
        }
    }

    /// Prepare records for research export: abstract the declared
    /// features, then gate on k-anonymity. A failing dataset exports
    /// nothing, not a smaller dataset.
    pub fn prepare_research_export(
        &self,
        records: &[ExportRecord],
        quasi_identifiers: &[&str],
        feature_types: &BTreeMap<String, FeatureType>,
    ) -> (Vec<ExportRecord>, KAnonymityCheck) {
        let prepared: Vec<ExportRecord> = records
            .iter()
            .map(|record| {
                record
                    .iter()
                    .map(|(field, value)| {
                        let abstracted = match feature_types.get(field) {
                            Some(feature_type) => self.abstract_feature(value, *feature_type),
                            None => value.clone(),
                        };
                        (field.clone(), abstracted)
                    })
                    .collect()
            })
            .collect();

        let check = self.check_k_anonymity(&prepared, quasi_identifiers);
        if !check.passed {
            tracing::warn!(
                k_value = check.k_value,
                required_k = check.required_k,
                "research export withheld: k-anonymity not met"
            );
            return (Vec::new(), check);
        }
        (prepared, check)
    }
}
