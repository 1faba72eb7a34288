//! Markdown and JSON report generation.
//!
//! Renders a result table into a human-readable batch report. Where the
//! output goes is up to the caller.

use crate::pipeline::{BatchSummary, ResultRow, ResultTable, TaskStatus};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Context printed at the top of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Batch root directory.
    pub batch_root: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Wall time of the run in seconds.
    pub duration_seconds: f64,
    /// Number of recordings in the batch.
    pub recordings: usize,
    /// Methods in request order.
    pub methods: Vec<String>,
}

impl RunMetadata {
    /// Metadata taken from a finished table.
    pub fn from_table(table: &ResultTable, batch_root: impl Into<String>) -> Self {
        Self {
            batch_root: batch_root.into(),
            started_at: table.started_at,
            duration_seconds: table.duration_seconds,
            recordings: table.recordings().len(),
            methods: table.methods.clone(),
        }
    }
}

/// JSON document produced by [`generate_json_report`].
#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    metadata: &'a RunMetadata,
    summary: BatchSummary,
    rows: &'a [ResultRow],
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(table: &ResultTable, metadata: &RunMetadata) -> String {
    let mut output = String::new();

    output.push_str("# Simuran Batch Report\n\n");
    output.push_str(&generate_metadata_section(metadata));
    output.push_str(&generate_table_of_contents(metadata));
    output.push_str(&generate_summary_section(&table.summary()));

    for method in &metadata.methods {
        output.push_str(&generate_method_section(table, method));
    }

    output.push_str(&generate_failures_section(table));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &RunMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Batch Root:** `{}`\n", metadata.batch_root));
    section.push_str(&format!(
        "- **Run Date:** {}\n",
        metadata.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Recordings:** {}\n", metadata.recordings));
    section.push_str(&format!("- **Methods:** {}\n", metadata.methods.join(", ")));
    section.push_str(&format!("- **Duration:** {:.1}s\n", metadata.duration_seconds));
    section.push('\n');

    section
}

fn anchor(text: &str) -> String {
    text.replace(['/', '.', ' '], "-").to_lowercase()
}

/// Generate the table of contents.
fn generate_table_of_contents(metadata: &RunMetadata) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");
    toc.push_str("- [Summary](#summary)\n");
    for method in &metadata.methods {
        toc.push_str(&format!("- [{}](#{})\n", method, anchor(method)));
    }
    toc.push_str("- [Failures](#failures)\n\n");

    toc
}

/// Generate the summary section.
fn generate_summary_section(summary: &BatchSummary) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str(&format!(
        "| {} Succeeded | {} Skipped | {} Failed | **Total** |\n",
        TaskStatus::Succeeded.emoji(),
        TaskStatus::Skipped.emoji(),
        TaskStatus::Failed.emoji(),
    ));
    section.push_str("|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | **{}** |\n\n",
        summary.counts.succeeded, summary.counts.skipped, summary.counts.failed, summary.total
    ));

    if !summary.by_method.is_empty() {
        section.push_str("### Tasks by Method\n\n");
        section.push_str("| Method | Succeeded | Skipped | Failed |\n");
        section.push_str("|:---|:---:|:---:|:---:|\n");
        for (method, counts) in &summary.by_method {
            section.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                method, counts.succeeded, counts.skipped, counts.failed
            ));
        }
        section.push('\n');
    }

    if !summary.by_error_kind.is_empty() {
        section.push_str("### Failures by Kind\n\n");
        section.push_str("| Kind | Count |\n");
        section.push_str("|:---|:---:|\n");

        let mut kinds: Vec<_> = summary.by_error_kind.iter().collect();
        kinds.sort_by_key(|(_, count)| std::cmp::Reverse(*count));

        for (kind, count) in kinds {
            section.push_str(&format!("| {} | {} |\n", kind, count));
        }
        section.push('\n');
    }

    section
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format!("{:.4}", f),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Generate the results table for one method.
fn generate_method_section(table: &ResultTable, method: &str) -> String {
    let mut section = String::new();

    section.push_str(&format!("## {}\n\n", method));

    let rows: Vec<&ResultRow> = table.rows_for_method(method).collect();
    if rows.is_empty() {
        section.push_str("No recordings were processed.\n\n");
        return section;
    }

    let fields: BTreeSet<&String> = rows.iter().flat_map(|r| r.fields.keys()).collect();

    section.push_str("| Recording | Status |");
    for field in &fields {
        section.push_str(&format!(" {} |", field));
    }
    section.push_str(" Note |\n");
    section.push_str("|:---|:---:|");
    section.push_str(&":---:|".repeat(fields.len()));
    section.push_str(":---|\n");

    for row in rows {
        section.push_str(&format!("| {} | {} {} |", row.recording, row.status.emoji(), row.status));
        for field in &fields {
            let cell = row.fields.get(*field).map(format_value).unwrap_or_default();
            section.push_str(&format!(" {} |", cell));
        }
        let note = row.error.as_deref().unwrap_or("").replace('|', "\\|");
        section.push_str(&format!(" {} |\n", note));
    }
    section.push('\n');

    section
}

/// Generate the failures section.
fn generate_failures_section(table: &ResultTable) -> String {
    let mut section = String::new();

    section.push_str("## Failures\n\n");

    let failed: Vec<&ResultRow> = table.failed().collect();
    if failed.is_empty() {
        section.push_str("No task failed. 🎉\n\n");
        return section;
    }

    for row in failed {
        section.push_str(&format!(
            "#### {} {} / {}\n\n",
            TaskStatus::Failed.emoji(),
            row.recording,
            row.method
        ));
        if let Some(kind) = &row.error_kind {
            section.push_str(&format!("**Kind:** `{}`\n\n", kind));
        }
        if let Some(error) = &row.error {
            section.push_str(&format!("**Error:** {}\n\n", error));
        }
        section.push_str("---\n\n");
    }

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    format!("---\n\n*Report generated by simuran v{}*\n", env!("CARGO_PKG_VERSION"))
}

/// Generate a JSON report.
pub fn generate_json_report(table: &ResultTable, metadata: &RunMetadata) -> Result<String> {
    let report = JsonReport {
        metadata,
        summary: table.summary(),
        rows: table.rows(),
    };
    serde_json::to_string_pretty(&report).context("Failed to serialize batch report")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ResultFields;

    fn create_test_table() -> ResultTable {
        let mut fields = ResultFields::new();
        fields.insert("coherence".to_string(), Value::from(0.81234));
        fields.insert("pairs".to_string(), Value::from(3));
        let rows = vec![
            ResultRow::succeeded("E1", "coherence", fields),
            ResultRow::skipped("E2", "coherence", "needs 2 distinct regions, found 1"),
            ResultRow::failed("E3", "coherence", "load", "failed to load data/e3.bin"),
        ];
        ResultTable::new(vec!["coherence".to_string()], rows, Utc::now(), 2.0)
    }

    #[test]
    fn test_generate_markdown_report() {
        let table = create_test_table();
        let metadata = RunMetadata::from_table(&table, "/data/batch");
        let markdown = generate_markdown_report(&table, &metadata);

        assert!(markdown.contains("# Simuran Batch Report"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("## Summary"));
        assert!(markdown.contains("## coherence"));
        assert!(markdown.contains("0.8123"));
        assert!(markdown.contains("| 3 |"));
        assert!(markdown.contains("needs 2 distinct regions"));
        assert!(markdown.contains("**Kind:** `load`"));
    }

    #[test]
    fn test_toc_anchor_keeps_underscores() {
        let rows = vec![ResultRow::succeeded("E1", "theta_power", ResultFields::new())];
        let table = ResultTable::new(vec!["theta_power".to_string()], rows, Utc::now(), 0.1);
        let metadata = RunMetadata::from_table(&table, "/data/batch");
        let toc = generate_table_of_contents(&metadata);

        assert_eq!(anchor("theta_power"), "theta_power");
        assert!(toc.contains("- [theta_power](#theta_power)"));
    }

    #[test]
    fn test_generate_metadata_section() {
        let table = create_test_table();
        let metadata = RunMetadata::from_table(&table, "/data/batch");
        let section = generate_metadata_section(&metadata);

        assert!(section.contains("/data/batch"));
        assert!(section.contains("**Recordings:** 3"));
        assert!(section.contains("**Methods:** coherence"));
    }

    #[test]
    fn test_failures_section_when_clean() {
        let rows = vec![ResultRow::succeeded("E1", "psd", ResultFields::new())];
        let table = ResultTable::new(vec!["psd".to_string()], rows, Utc::now(), 0.1);
        assert!(generate_failures_section(&table).contains("No task failed"));
    }

    #[test]
    fn test_generate_json_report() {
        let table = create_test_table();
        let metadata = RunMetadata::from_table(&table, "/data/batch");
        let json = generate_json_report(&table, &metadata).unwrap();

        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["metadata"]["batch_root"], "/data/batch");
        assert_eq!(parsed["summary"]["counts"]["failed"], 1);
        assert_eq!(parsed["rows"].as_array().map(|r| r.len()), Some(3));
    }
}
