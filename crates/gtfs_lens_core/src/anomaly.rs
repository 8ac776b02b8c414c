use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::csv_reader::{CsvParseError, RowIssue};

pub const ANOMALY_CODE_CSV_PARSE_ERROR: &str = "csv_parsing_failed";
pub const ANOMALY_CODE_INVALID_ROW: &str = "invalid_row";
pub const ANOMALY_CODE_MISSING_FILE: &str = "missing_required_file";
pub const ANOMALY_CODE_MISSING_RECOMMENDED_FILE: &str = "missing_recommended_file";

/// Upper bound on offending identifiers copied into `sampleValues`.
pub const MAX_SAMPLE_VALUES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    Critical,
    Error,
    Warning,
}

impl AnomalySeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            AnomalySeverity::Critical => "CRITICAL",
            AnomalySeverity::Error => "ERROR",
            AnomalySeverity::Warning => "WARNING",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub code: String,
    pub severity: AnomalySeverity,
    /// Logical relation name, e.g. `stop_times`.
    pub relation: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_order: Vec<String>,
}

impl Anomaly {
    pub fn new(
        code: impl Into<String>,
        severity: AnomalySeverity,
        relation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            severity,
            relation: relation.into(),
            message: message.into(),
            count: None,
            context: BTreeMap::new(),
            field_order: Vec::new(),
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    pub fn missing_required_file(relation: &str) -> Self {
        Anomaly::new(
            ANOMALY_CODE_MISSING_FILE,
            AnomalySeverity::Critical,
            relation,
            format!("required file {}.txt is missing or unreadable", relation),
        )
        .with_context_field("filename", format!("{}.txt", relation))
    }

    pub fn missing_recommended_file(relation: &str) -> Self {
        Anomaly::new(
            ANOMALY_CODE_MISSING_RECOMMENDED_FILE,
            AnomalySeverity::Warning,
            relation,
            format!("recommended file {}.txt is missing", relation),
        )
        .with_context_field("filename", format!("{}.txt", relation))
    }

    pub fn from_csv_error(relation: &str, error: &CsvParseError) -> Self {
        let mut anomaly = Anomaly::new(
            ANOMALY_CODE_CSV_PARSE_ERROR,
            AnomalySeverity::Error,
            relation,
            format!("{} could not be parsed: {}", error.file, error.message),
        );
        anomaly.insert_context_field("filename", error.file.clone());
        anomaly.insert_context_field("lineIndex", error.line_index.unwrap_or_default());
        anomaly.insert_context_field("message", error.message.clone());
        anomaly
    }

    /// One anomaly summarizing every skipped row of a file.
    pub fn from_row_issues(relation: &str, file: &str, issues: &[RowIssue]) -> Self {
        let mut anomaly = Anomaly::new(
            ANOMALY_CODE_INVALID_ROW,
            AnomalySeverity::Warning,
            relation,
            format!("{} row(s) of {} could not be read and were skipped", issues.len(), file),
        )
        .with_count(issues.len() as u64);
        anomaly.insert_context_field("filename", file);
        if let Some(first) = issues.first() {
            anomaly.insert_context_field("firstCsvRowNumber", first.line);
            anomaly.insert_context_field("firstMessage", first.message.clone());
        }
        anomaly
    }

    pub fn insert_context_field<V: Serialize>(&mut self, name: impl Into<String>, value: V) {
        let key = name.into();
        let serialized = serde_json::to_value(value).unwrap_or(Value::Null);
        if !self.field_order.iter().any(|item| item == &key) {
            self.field_order.push(key.clone());
        }
        self.context.insert(key, serialized);
    }

    pub fn with_context_field<V: Serialize>(mut self, name: impl Into<String>, value: V) -> Self {
        self.insert_context_field(name, value);
        self
    }

    /// Stores a sorted, truncated sample of the offending values.
    pub fn with_sample_values<'a, I>(self, values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut sample: Vec<&str> = values.into_iter().collect();
        sample.sort_unstable();
        sample.truncate(MAX_SAMPLE_VALUES);
        self.with_context_field("sampleValues", sample)
    }

    pub fn is_blocking(&self) -> bool {
        matches!(
            self.severity,
            AnomalySeverity::Critical | AnomalySeverity::Error
        )
    }
}

/// Accumulates anomalies in insertion order. Checks push into it and never
/// return early, so one run always yields the full list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AnomalyReport {
    anomalies: Vec<Anomaly>,
}

impl AnomalyReport {
    pub fn new() -> Self {
        Self {
            anomalies: Vec::new(),
        }
    }

    pub fn push(&mut self, anomaly: Anomaly) {
        self.anomalies.push(anomaly);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Anomaly> {
        self.anomalies.iter()
    }

    pub fn len(&self) -> usize {
        self.anomalies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anomalies.is_empty()
    }

    pub fn merge(&mut self, other: AnomalyReport) {
        self.anomalies.extend(other.anomalies);
    }

    pub fn count_by_severity(&self, severity: AnomalySeverity) -> usize {
        self.anomalies
            .iter()
            .filter(|anomaly| anomaly.severity == severity)
            .count()
    }

    pub fn has_blocking(&self) -> bool {
        self.anomalies.iter().any(Anomaly::is_blocking)
    }
}

impl IntoIterator for AnomalyReport {
    type Item = Anomaly;
    type IntoIter = std::vec::IntoIter<Anomaly>;

    fn into_iter(self) -> Self::IntoIter {
        self.anomalies.into_iter()
    }
}
