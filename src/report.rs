//! Per-chunk progress reports and the sink they are written to.

use crate::error::{ErrorKind, StorageError};
use crate::store::WriteOutcome;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    /// `None` for row-level errors.
    pub field: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedRow {
    pub line: usize,
    pub errors: Vec<FieldError>,
}

/// Counts for one `(offset, limit)` window.
///
/// Reports of consecutive windows can be combined with [`ProgressReport::absorb`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub seen: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub inserted: usize,
    pub updated: usize,
    pub total_rows: usize,
    /// Data rows after the end of this window.
    pub remaining_rows: usize,
    pub offset: usize,
    pub limit: usize,
    pub test_mode: bool,
    pub rejected_rows: Vec<RejectedRow>,
}

impl ProgressReport {
    pub fn new(offset: usize, limit: usize, total_rows: usize, test_mode: bool) -> Self {
        Self {
            offset,
            limit,
            total_rows,
            remaining_rows: total_rows.saturating_sub(offset),
            test_mode,
            ..Default::default()
        }
    }

    pub fn record_accepted(&mut self, outcome: WriteOutcome) {
        self.seen += 1;
        self.accepted += 1;
        match outcome {
            WriteOutcome::Inserted => self.inserted += 1,
            WriteOutcome::Updated => self.updated += 1,
        }
        self.remaining_rows = self.remaining_rows.saturating_sub(1);
    }

    pub fn record_rejected(&mut self, line: usize, errors: Vec<FieldError>) {
        self.seen += 1;
        self.rejected += 1;
        self.rejected_rows.push(RejectedRow { line, errors });
        self.remaining_rows = self.remaining_rows.saturating_sub(1);
    }

    /// Folds the report of a later window into this one.
    pub fn absorb(&mut self, later: ProgressReport) {
        self.seen += later.seen;
        self.accepted += later.accepted;
        self.rejected += later.rejected;
        self.inserted += later.inserted;
        self.updated += later.updated;
        self.offset = self.offset.min(later.offset);
        self.limit += later.limit;
        self.total_rows = later.total_rows;
        self.remaining_rows = later.remaining_rows;
        self.test_mode |= later.test_mode;
        self.rejected_rows.extend(later.rejected_rows);
    }
}

/// Receives chunk reports, keyed by job id. The engine never reads it back.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn record(&self, job_id: &str, report: &ProgressReport) -> Result<(), StorageError>;
}

/// Aggregates every chunk report of a job in memory.
#[derive(Debug, Default)]
pub struct MemoryReportSink {
    reports: Mutex<HashMap<String, ProgressReport>>,
}

impl MemoryReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn report(&self, job_id: &str) -> Option<ProgressReport> {
        self.reports.lock().await.get(job_id).cloned()
    }
}

#[async_trait]
impl ReportSink for MemoryReportSink {
    async fn record(&self, job_id: &str, report: &ProgressReport) -> Result<(), StorageError> {
        let mut reports = self.reports.lock().await;
        match reports.get_mut(job_id) {
            Some(total) => total.absorb(report.clone()),
            None => {
                reports.insert(job_id.to_string(), report.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejection() -> Vec<FieldError> {
        vec![FieldError {
            field: Some("email".into()),
            kind: ErrorKind::MissingRequired,
            message: "Field 'email' is mandatory.".into(),
        }]
    }

    #[test]
    fn counts_and_remaining_rows() {
        let mut report = ProgressReport::new(2, 2, 5, false);
        assert_eq!(report.remaining_rows, 3);
        report.record_accepted(WriteOutcome::Inserted);
        report.record_rejected(4, rejection());
        assert_eq!((report.seen, report.accepted, report.rejected), (2, 1, 1));
        assert_eq!(report.remaining_rows, 1);
        assert_eq!(report.rejected_rows[0].line, 4);
    }

    #[tokio::test]
    async fn sink_merges_consecutive_chunks() {
        let sink = MemoryReportSink::new();
        let mut first = ProgressReport::new(0, 2, 3, false);
        first.record_accepted(WriteOutcome::Inserted);
        first.record_accepted(WriteOutcome::Updated);
        let mut second = ProgressReport::new(2, 1, 3, false);
        second.record_rejected(3, rejection());

        sink.record("members", &first).await.unwrap();
        sink.record("members", &second).await.unwrap();

        let total = sink.report("members").await.unwrap();
        assert_eq!((total.seen, total.accepted, total.rejected), (3, 2, 1));
        assert_eq!((total.inserted, total.updated), (1, 1));
        assert_eq!((total.offset, total.limit, total.remaining_rows), (0, 3, 0));
        assert_eq!(total.rejected_rows.len(), 1);
        assert!(sink.report("other").await.is_none());
    }

    #[test]
    fn serializes_camel_case() {
        let mut report = ProgressReport::new(0, 1, 1, true);
        report.record_rejected(1, rejection());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["totalRows"], 1);
        assert_eq!(json["testMode"], true);
        assert_eq!(json["rejectedRows"][0]["errors"][0]["kind"]["type"], "missingRequired");
    }
}
