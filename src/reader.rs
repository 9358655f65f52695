//! Windowed access to the data rows of a CSV file.
//!
//! The first row is the header. It only fixes the expected column count; target fields
//! are mapped by position. Ragged rows are passed through untouched so the row processor
//! can reject them individually.

use crate::error::{ImportError, ImportResult};
use crate::io::{reader_from_path, CsvByteSource};
use crate::job::CsvDialect;
use csv_async::{AsyncReader, AsyncReaderBuilder, ByteRecord};
use futures::stream::{self, BoxStream, StreamExt};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One data row. `line` is 1-based; the header is line 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow {
    pub line: usize,
    pub cells: Vec<String>,
}

/// An item produced by [`CsvSliceReader::rows_in_range`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowRead {
    Row(CsvRow),
    /// The record was read but could not be decoded as text.
    Unreadable { line: usize, reason: String },
}

impl RowRead {
    pub fn line(&self) -> usize {
        match self {
            RowRead::Row(row) => row.line,
            RowRead::Unreadable { line, .. } => *line,
        }
    }
}

pub type RowStream = BoxStream<'static, ImportResult<RowRead>>;

#[derive(Debug, Clone)]
pub struct CsvSliceReader {
    path: PathBuf,
    dialect: CsvDialect,
    headers: Vec<String>,
    total_rows: usize,
}

impl CsvSliceReader {
    /// Opens `path`, validates its header and counts the data rows.
    pub async fn open(path: impl Into<PathBuf>, dialect: CsvDialect) -> ImportResult<Self> {
        let path = path.into();
        let mut rdr = open_csv(&path, &dialect).await?;

        let raw_headers = rdr
            .byte_headers()
            .await
            .map_err(|e| ImportError::MalformedHeader(e.to_string()))?
            .clone();
        let headers = parse_header(&raw_headers)?;

        let mut record = ByteRecord::new();
        let mut total_rows = 0usize;
        while rdr.read_byte_record(&mut record).await? {
            total_rows += 1;
        }
        debug!(path = %path.display(), columns = headers.len(), total_rows, "opened csv");

        Ok(Self {
            path,
            dialect,
            headers,
            total_rows,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of columns declared by the header.
    pub fn width(&self) -> usize {
        self.headers.len()
    }

    /// Number of data rows, header excluded.
    pub fn total_row_count(&self) -> usize {
        self.total_rows
    }

    /// Lazily yields data rows `[offset, offset + limit)`, clipped to the end of the file.
    ///
    /// An offset at or past the end yields an empty stream.
    pub async fn rows_in_range(&self, offset: usize, limit: usize) -> ImportResult<RowStream> {
        let end = offset.saturating_add(limit).min(self.total_rows);
        if offset >= end {
            return Ok(stream::empty().boxed());
        }

        let mut rdr = open_csv(&self.path, &self.dialect).await?;
        let mut record = ByteRecord::new();
        let mut index = 0usize;
        while index < offset && rdr.read_byte_record(&mut record).await? {
            index += 1;
        }

        let rows = stream::unfold(
            (rdr, record, index),
            move |(mut rdr, mut record, index)| async move {
                if index >= end {
                    return None;
                }
                match rdr.read_byte_record(&mut record).await {
                    Ok(true) => {
                        let row = decode_row(index + 1, &record);
                        Some((Ok(row), (rdr, record, index + 1)))
                    }
                    Ok(false) => None,
                    // Stop after surfacing the failure.
                    Err(e) => Some((Err(ImportError::Csv(e)), (rdr, record, end))),
                }
            },
        );
        Ok(rows.boxed())
    }

    /// Reads the single data row at 0-based data index `index`.
    pub async fn row(&self, index: usize) -> ImportResult<Option<RowRead>> {
        let mut rows = self.rows_in_range(index, 1).await?;
        rows.next().await.transpose()
    }
}

async fn open_csv(path: &Path, dialect: &CsvDialect) -> ImportResult<AsyncReader<CsvByteSource>> {
    let (source, _meta) = reader_from_path(path, dialect.charset).await?;
    Ok(AsyncReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(dialect.delimiter)
        .quote(dialect.quote)
        .buffer_capacity(1 << 16)
        .create_reader(source))
}

fn parse_header(raw: &ByteRecord) -> ImportResult<Vec<String>> {
    if raw.is_empty() {
        return Err(ImportError::MalformedHeader("header has no columns".into()));
    }
    if raw.len() == 1 && raw.get(0).is_some_and(|cell| cell.trim_ascii().is_empty()) {
        return Err(ImportError::MalformedHeader("header row is empty".into()));
    }
    raw.iter()
        .enumerate()
        .map(|(i, cell)| {
            std::str::from_utf8(cell).map(str::to_string).map_err(|e| {
                ImportError::MalformedHeader(format!("column {} is not valid UTF-8: {e}", i + 1))
            })
        })
        .collect()
}

fn decode_row(line: usize, record: &ByteRecord) -> RowRead {
    let mut cells = Vec::with_capacity(record.len());
    for (i, cell) in record.iter().enumerate() {
        match std::str::from_utf8(cell) {
            Ok(s) => cells.push(s.to_string()),
            Err(e) => {
                return RowRead::Unreadable {
                    line,
                    reason: format!("column {} is not valid UTF-8: {e}", i + 1),
                }
            }
        }
    }
    RowRead::Row(CsvRow { line, cells })
}
