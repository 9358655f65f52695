use crate::error::{ErrorKind, ImportError, ImportResult};
use crate::job::{ImportJob, SchemaProvider, TableSchema};
use crate::messages::{EnglishMessages, MessageCatalog};
use crate::planner::ChunkPlanner;
use crate::processor::{RowProcessor, RowResult};
use crate::reader::{CsvSliceReader, RowRead};
use crate::report::{FieldError, ProgressReport, ReportSink};
use crate::rules::{RuleRegistry, TemporalFormats};
use crate::store::Store;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Runs one `(offset, limit)` window of an import job.
///
/// Nothing is kept between runs except what was written to storage; callers must not run
/// overlapping windows of the same job concurrently.
pub struct ImportRunner {
    store: Arc<dyn Store>,
    schemas: Arc<dyn SchemaProvider>,
    rules: Arc<RuleRegistry>,
    messages: Arc<dyn MessageCatalog>,
    sink: Option<Arc<dyn ReportSink>>,
    project_dir: PathBuf,
}

impl ImportRunner {
    pub fn new(store: Arc<dyn Store>, schemas: Arc<dyn SchemaProvider>) -> Self {
        Self {
            store,
            schemas,
            rules: Arc::new(RuleRegistry::with_formats(&TemporalFormats::default())),
            messages: Arc::new(EnglishMessages),
            sink: None,
            project_dir: PathBuf::from("."),
        }
    }

    pub fn with_rules(mut self, rules: RuleRegistry) -> Self {
        self.rules = Arc::new(rules);
        self
    }

    pub fn with_messages(mut self, messages: Arc<dyn MessageCatalog>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_report_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = dir.into();
        self
    }

    pub fn source_path(&self, job: &ImportJob) -> PathBuf {
        self.project_dir.join(&job.file_src)
    }

    /// Opens the job's source file with the job's dialect.
    pub async fn open(&self, job: &ImportJob) -> ImportResult<CsvSliceReader> {
        CsvSliceReader::open(self.source_path(job), job.dialect()?).await
    }

    /// Data rows in the job's file.
    pub async fn count_rows(&self, job: &ImportJob) -> ImportResult<usize> {
        Ok(self.open(job).await?.total_row_count())
    }

    fn schema(&self, job: &ImportJob) -> ImportResult<TableSchema> {
        self.schemas
            .table_schema(&job.import_table)
            .ok_or_else(|| ImportError::UnknownTable(job.import_table.clone()))
    }

    /// Imports data rows `[offset, offset + limit)`; `limit == 0` means up to the end.
    ///
    /// Per-row failures end up in the report; only failures to open the file, resolve the
    /// mapping or reach the table are returned as errors. `test_mode` (or the job's own
    /// flag) validates without writing.
    pub async fn run(
        &self,
        job: &ImportJob,
        offset: usize,
        limit: usize,
        test_mode: bool,
    ) -> ImportResult<ProgressReport> {
        let mut processor = self.processor(test_mode || job.test_mode);
        self.run_window(&mut processor, job, offset, limit).await
    }

    fn processor(&self, test_mode: bool) -> RowProcessor {
        RowProcessor::new(
            Arc::clone(&self.store),
            Arc::clone(&self.rules),
            Arc::clone(&self.messages),
            test_mode,
        )
    }

    /// Imports one window through `processor`, whose staged values carry over to the next
    /// window when the same processor is reused.
    async fn run_window(
        &self,
        processor: &mut RowProcessor,
        job: &ImportJob,
        offset: usize,
        limit: usize,
    ) -> ImportResult<ProgressReport> {
        let test_mode = processor.test_mode();
        let schema = self.schema(job)?;
        let reader = self.open(job).await?;
        job.check_mapping(&schema, reader.width())?;
        self.store
            .check_table(&job.import_table)
            .await
            .map_err(ImportError::TableUnreachable)?;

        let total = reader.total_row_count();
        let available = total.saturating_sub(offset);
        let window = if limit == 0 { available } else { limit.min(available) };
        info!(
            job = %job.id,
            table = %job.import_table,
            offset,
            limit = window,
            total,
            test_mode,
            "importing chunk"
        );

        let mut report = ProgressReport::new(offset, window, total, test_mode);
        let mut rows = reader.rows_in_range(offset, window).await?;
        while let Some(item) = rows.next().await {
            match item? {
                RowRead::Row(row) => match processor.process(&row, job, &schema).await {
                    RowResult::Accepted { outcome, .. } => report.record_accepted(outcome),
                    RowResult::Rejected(errors) => {
                        warn!(job = %job.id, line = row.line, errors = ?errors, "row rejected");
                        report.record_rejected(row.line, errors);
                    }
                },
                RowRead::Unreadable { line, reason } => {
                    warn!(job = %job.id, line, %reason, "row unreadable");
                    let kind = ErrorKind::UnreadableRow { reason };
                    let error = FieldError {
                        field: None,
                        message: self.messages.render(None, &kind),
                        kind,
                    };
                    report.record_rejected(line, vec![error]);
                }
            }
        }

        info!(
            job = %job.id,
            seen = report.seen,
            accepted = report.accepted,
            rejected = report.rejected,
            remaining = report.remaining_rows,
            "chunk finished"
        );
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.record(&job.id, &report).await {
                warn!(job = %job.id, error = %e, "failed to store chunk report");
            }
        }
        Ok(report)
    }

    /// Runs every window of the job's plan in order and combines their reports.
    ///
    /// One processor serves all windows, so a dry run still sees the values it would have
    /// written in earlier windows.
    pub async fn run_all(
        &self,
        job: &ImportJob,
        planner: &ChunkPlanner,
        test_mode: bool,
    ) -> ImportResult<ProgressReport> {
        let total = self.count_rows(job).await?;
        let plan = planner.plan(total, job.offset, job.limit);
        let test_mode = test_mode || job.test_mode;
        let mut processor = self.processor(test_mode);
        let mut combined = ProgressReport::new(job.offset, 0, total, test_mode);
        for window in &plan.windows {
            let report = self
                .run_window(&mut processor, job, window.offset, window.limit)
                .await?;
            combined.absorb(report);
        }
        Ok(combined)
    }
}
