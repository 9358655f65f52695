//! Chunked, resumable CSV import into a relational table.
//!
//! - [`ChunkPlanner`] splits the rows still to import into `(offset, limit)` windows.
//! - [`ImportRunner::run`] imports one window: every row is mapped by position onto the
//!   job's selected fields, validated, checked for uniqueness and written in its own
//!   transaction, or rejected with all of its field errors.
//! - [`ProgressReport`]s of consecutive windows can be merged by the caller.
//!
//! Source files may be plain, `.gz` or `.zst` compressed CSV in any charset `encoding_rs`
//! knows.
#![cfg_attr(docsrs, feature(doc_cfg))]

mod codec;
pub mod config;
pub mod error;
mod io;
pub mod job;
pub mod messages;
pub mod planner;
pub mod processor;
pub mod reader;
pub mod report;
pub mod rules;
pub mod runner;
pub mod store;
pub mod unique;

pub use crate::config::EngineConfig;
pub use crate::error::{ErrorKind, ImportError, ImportResult, StorageError};
pub use crate::io::{build_csv_reader, reader_from_path, Compression, CsvMeta};
pub use crate::job::{
    Catalog, CsvDialect, FieldDescriptor, ImportJob, ImportMode, SchemaProvider, TableSchema,
};
pub use crate::messages::{EnglishMessages, MessageCatalog};
pub use crate::planner::{ChunkPlan, ChunkPlanner, MountResponse, UrlTemplate, Window};
pub use crate::processor::{RowProcessor, RowResult};
pub use crate::reader::{CsvRow, CsvSliceReader, RowRead};
pub use crate::report::{FieldError, MemoryReportSink, ProgressReport, RejectedRow, ReportSink};
pub use crate::rules::{FieldRule, RegexRule, RuleRegistry, TemporalFormats};
pub use crate::runner::ImportRunner;
#[cfg(feature = "sqlite")]
pub use crate::store::SqliteStore;
pub use crate::store::{MemoryStore, Store, TargetRecord, WriteOutcome};
pub use crate::unique::UniquenessChecker;
