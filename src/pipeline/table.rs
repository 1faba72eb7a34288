//! Result table and batch statistics.

use crate::analysis::ResultFields;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Lifecycle of one (recording, method) task.
///
/// `Pending -> Running -> {Succeeded, Skipped, Failed}`. Tasks skipped on
/// capabilities or cancellation go straight from `Pending` to `Skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Skipped,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Skipped | TaskStatus::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_become(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Skipped)
                | (TaskStatus::Running, TaskStatus::Succeeded)
                | (TaskStatus::Running, TaskStatus::Skipped)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "⏳",
            TaskStatus::Running => "🔄",
            TaskStatus::Succeeded => "✅",
            TaskStatus::Skipped => "⏭️",
            TaskStatus::Failed => "❌",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Running => "Running",
            TaskStatus::Succeeded => "Succeeded",
            TaskStatus::Skipped => "Skipped",
            TaskStatus::Failed => "Failed",
        };
        write!(f, "{}", s)
    }
}

/// One row of the result table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    /// Recording identity.
    pub recording: String,
    /// Method name.
    pub method: String,
    pub status: TaskStatus,
    /// Structured output, empty unless `Succeeded`.
    #[serde(default)]
    pub fields: ResultFields,
    /// Failure message or skip reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure class: `load`, `unsupported_format`, `data_integrity`,
    /// `analysis`, `timeout` or `panic`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl ResultRow {
    pub fn succeeded(recording: &str, method: &str, fields: ResultFields) -> Self {
        Self {
            recording: recording.to_string(),
            method: method.to_string(),
            status: TaskStatus::Succeeded,
            fields,
            error: None,
            error_kind: None,
        }
    }

    pub fn skipped(recording: &str, method: &str, reason: impl Into<String>) -> Self {
        Self {
            recording: recording.to_string(),
            method: method.to_string(),
            status: TaskStatus::Skipped,
            fields: ResultFields::new(),
            error: Some(reason.into()),
            error_kind: None,
        }
    }

    pub fn failed(recording: &str, method: &str, kind: &str, message: impl Into<String>) -> Self {
        Self {
            recording: recording.to_string(),
            method: method.to_string(),
            status: TaskStatus::Failed,
            fields: ResultFields::new(),
            error: Some(message.into()),
            error_kind: Some(kind.to_string()),
        }
    }
}

/// Ordered output of a batch run.
///
/// Rows follow collection order, then method-request order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    pub methods: Vec<String>,
    pub rows: Vec<ResultRow>,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

impl ResultTable {
    pub fn new(methods: Vec<String>, rows: Vec<ResultRow>, started_at: DateTime<Utc>, duration_seconds: f64) -> Self {
        Self {
            methods,
            rows,
            started_at,
            duration_seconds,
        }
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names: identity and status, every result field seen, then `error`.
    pub fn columns(&self) -> Vec<String> {
        let fields: BTreeSet<&String> = self.rows.iter().flat_map(|r| r.fields.keys()).collect();
        let mut columns = vec!["recording".to_string(), "method".to_string(), "status".to_string()];
        columns.extend(fields.into_iter().cloned());
        columns.push("error".to_string());
        columns
    }

    /// Recording ids in row order, deduplicated.
    pub fn recordings(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.rows
            .iter()
            .map(|r| r.recording.as_str())
            .filter(|id| seen.insert(*id))
            .collect()
    }

    pub fn rows_for<'a>(&'a self, recording: &'a str) -> impl Iterator<Item = &'a ResultRow> + 'a {
        self.rows.iter().filter(move |r| r.recording == recording)
    }

    pub fn rows_for_method<'a>(&'a self, method: &'a str) -> impl Iterator<Item = &'a ResultRow> + 'a {
        self.rows.iter().filter(move |r| r.method == method)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ResultRow> {
        self.rows.iter().filter(|r| r.status == TaskStatus::Failed)
    }

    pub fn get(&self, recording: &str, method: &str) -> Option<&ResultRow> {
        self.rows
            .iter()
            .find(|r| r.recording == recording && r.method == method)
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary::from_rows(&self.rows)
    }
}

/// Counts per terminal status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl StatusCounts {
    fn add(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Succeeded => self.succeeded += 1,
            TaskStatus::Skipped => self.skipped += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Pending | TaskStatus::Running => {}
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

/// Summary statistics for a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Number of rows.
    pub total: usize,
    /// Number of recordings.
    pub recordings: usize,
    pub counts: StatusCounts,
    /// Counts grouped by method.
    pub by_method: BTreeMap<String, StatusCounts>,
    /// Failures grouped by error kind.
    pub by_error_kind: BTreeMap<String, usize>,
}

impl BatchSummary {
    /// Creates a summary from result rows.
    pub fn from_rows(rows: &[ResultRow]) -> Self {
        let mut summary = Self {
            total: rows.len(),
            ..Self::default()
        };
        let mut recordings = BTreeSet::new();

        for row in rows {
            recordings.insert(row.recording.as_str());
            summary.counts.add(row.status);
            summary.by_method.entry(row.method.clone()).or_default().add(row.status);
            if let Some(kind) = &row.error_kind {
                *summary.by_error_kind.entry(kind.clone()).or_default() += 1;
            }
        }

        summary.recordings = recordings.len();
        summary
    }

    /// True when every task succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.counts.succeeded == self.total
    }

    /// Plain-text rendering, one figure per line.
    pub fn to_text(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Total Tasks: {} over {} recording(s)", self.total, self.recordings));
        lines.push(format!("- {} Succeeded: {}", TaskStatus::Succeeded.emoji(), self.counts.succeeded));
        lines.push(format!("- {} Skipped: {}", TaskStatus::Skipped.emoji(), self.counts.skipped));
        lines.push(format!("- {} Failed: {}", TaskStatus::Failed.emoji(), self.counts.failed));

        if !self.by_error_kind.is_empty() {
            lines.push(String::new());
            lines.push("Failures by Kind:".to_string());

            let mut kinds: Vec<_> = self.by_error_kind.iter().collect();
            kinds.sort_by_key(|(_, count)| std::cmp::Reverse(*count));

            for (kind, count) in kinds {
                lines.push(format!("- {}: {}", kind, count));
            }
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn sample_table() -> ResultTable {
        let mut fields = ResultFields::new();
        fields.insert("coherence".to_string(), Value::from(0.5));
        let rows = vec![
            ResultRow::succeeded("E1", "coherence", fields),
            ResultRow::skipped("E1", "psd", "no signal in region `DG`"),
            ResultRow::failed("E2", "coherence", "load", "file not found"),
            ResultRow::failed("E2", "psd", "analysis", "boom"),
        ];
        ResultTable::new(vec!["coherence".to_string(), "psd".to_string()], rows, Utc::now(), 1.5)
    }

    #[test]
    fn test_transitions() {
        assert!(TaskStatus::Pending.can_become(TaskStatus::Running));
        assert!(TaskStatus::Pending.can_become(TaskStatus::Skipped));
        assert!(TaskStatus::Running.can_become(TaskStatus::Failed));
        assert!(!TaskStatus::Pending.can_become(TaskStatus::Succeeded));
        assert!(!TaskStatus::Succeeded.can_become(TaskStatus::Failed));
        assert!(TaskStatus::Skipped.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn test_columns() {
        let table = sample_table();
        assert_eq!(
            table.columns(),
            vec!["recording", "method", "status", "coherence", "error"]
        );
    }

    #[test]
    fn test_row_queries() {
        let table = sample_table();
        assert_eq!(table.recordings(), vec!["E1", "E2"]);
        assert_eq!(table.rows_for("E2").count(), 2);
        assert_eq!(table.rows_for_method("psd").count(), 2);
        assert_eq!(table.failed().count(), 2);
        assert_eq!(table.get("E1", "psd").map(|r| r.status), Some(TaskStatus::Skipped));
        assert!(table.get("E3", "psd").is_none());
    }

    #[test]
    fn test_summary() {
        let summary = sample_table().summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.recordings, 2);
        assert_eq!(summary.counts.succeeded, 1);
        assert_eq!(summary.counts.skipped, 1);
        assert_eq!(summary.counts.failed, 2);
        assert_eq!(summary.by_method["psd"].total(), 2);
        assert_eq!(summary.by_error_kind.get("load"), Some(&1));
        assert!(!summary.all_succeeded());

        let text = summary.to_text();
        assert!(text.contains("Total Tasks: 4 over 2 recording(s)"));
        assert!(text.contains("Failures by Kind:"));
    }

    #[test]
    fn test_row_serialization_skips_empty_error() {
        let row = ResultRow::succeeded("E1", "psd", ResultFields::new());
        let json = serde_json::to_string(&row).unwrap();
        assert!(json.contains("\"status\":\"succeeded\""));
        assert!(!json.contains("error"));
    }
}
