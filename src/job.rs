//! Import job descriptors and the destination schema they are validated against.
//!
//! Both are created outside the engine (admin UI, catalog file) and are read-only while a
//! chunk runs. The scheduler advances `offset`/`limit` between chunks, never the engine.

use crate::error::{ImportError, ImportResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// How accepted rows are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportMode {
    #[default]
    Insert,
    Update,
    InsertOrUpdate,
}

impl ImportMode {
    /// Whether rows are matched against an existing identity.
    pub fn matches_identity(self) -> bool {
        !matches!(self, ImportMode::Insert)
    }
}

fn default_separator() -> String {
    ",".into()
}

fn default_enclosure() -> String {
    "\"".into()
}

fn default_array_separator() -> String {
    "||".into()
}

fn default_identity() -> String {
    "id".into()
}

/// One import task as configured by an administrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    pub id: String,
    /// Source file, relative to the project directory.
    pub file_src: PathBuf,
    pub import_table: String,
    #[serde(default)]
    pub import_mode: ImportMode,
    #[serde(default = "default_separator")]
    pub field_separator: String,
    #[serde(default = "default_enclosure")]
    pub field_enclosure: String,
    #[serde(default = "default_array_separator")]
    pub array_separator: String,
    /// Target field per CSV column, by position.
    pub selected_fields: Vec<String>,
    #[serde(default)]
    pub skip_validation_fields: BTreeSet<String>,
    #[serde(default)]
    pub offset: usize,
    /// 0 means no cap.
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub test_mode: bool,
    /// Column identifying existing rows in update modes.
    #[serde(default = "default_identity")]
    pub identity_field: String,
    /// Encoding label of the source file (e.g. "windows-1252"). UTF-8 when absent.
    #[serde(default)]
    pub charset: Option<String>,
}

/// Parsing parameters derived from an [`ImportJob`].
#[derive(Debug, Clone)]
pub struct CsvDialect {
    pub delimiter: u8,
    pub quote: u8,
    pub array_separator: String,
    pub charset: &'static encoding_rs::Encoding,
}

impl Default for CsvDialect {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            array_separator: default_array_separator(),
            charset: encoding_rs::UTF_8,
        }
    }
}

fn single_ascii(what: &str, value: &str) -> ImportResult<u8> {
    match value.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(ImportError::InvalidJob(format!(
            "{what} must be a single ASCII character, got '{value}'"
        ))),
    }
}

impl ImportJob {
    pub fn dialect(&self) -> ImportResult<CsvDialect> {
        let charset = match &self.charset {
            Some(label) => encoding_rs::Encoding::for_label(label.as_bytes()).ok_or_else(|| {
                ImportError::InvalidJob(format!("unknown charset '{label}'"))
            })?,
            None => encoding_rs::UTF_8,
        };
        if self.array_separator.is_empty() {
            return Err(ImportError::InvalidJob("array separator is empty".into()));
        }
        Ok(CsvDialect {
            delimiter: single_ascii("field separator", &self.field_separator)?,
            quote: single_ascii("field enclosure", &self.field_enclosure)?,
            array_separator: self.array_separator.clone(),
            charset,
        })
    }

    pub fn skips_validation(&self, field: &str) -> bool {
        self.skip_validation_fields.contains(field)
    }

    /// Checks the field mapping against the destination schema and the file's header width.
    pub fn check_mapping(&self, schema: &TableSchema, header_width: usize) -> ImportResult<()> {
        if self.selected_fields.len() != header_width {
            return Err(ImportError::InvalidJob(format!(
                "{} selected fields for a file with {} columns",
                self.selected_fields.len(),
                header_width
            )));
        }
        if let Some(missing) = self
            .selected_fields
            .iter()
            .find(|name| schema.field(name).is_none())
        {
            return Err(ImportError::InvalidJob(format!(
                "field '{missing}' is not defined on table '{}'",
                schema.table
            )));
        }
        if self.import_mode.matches_identity()
            && !self.selected_fields.contains(&self.identity_field)
        {
            return Err(ImportError::InvalidJob(format!(
                "{:?} mode requires identity field '{}' to be selected",
                self.import_mode, self.identity_field
            )));
        }
        Ok(())
    }
}

/// Validation metadata for one destination column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub name: String,
    /// Owning table; filled in from the enclosing [`TableSchema`] when omitted.
    #[serde(default)]
    pub table: String,
    /// Validation class tag (`date`, `datim`, `time`, or any registered rule).
    #[serde(default, alias = "rgxp")]
    pub validation: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    /// Cell holds several values joined by the job's array separator.
    #[serde(default)]
    pub multiple: bool,
}

impl FieldDescriptor {
    pub fn new(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            validation: None,
            required: false,
            unique: false,
            multiple: false,
        }
    }

    pub fn with_validation(mut self, tag: impl Into<String>) -> Self {
        self.validation = Some(tag.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,
    pub fields: Vec<FieldDescriptor>,
}

impl TableSchema {
    pub fn new(table: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        let table = table.into();
        let fields = fields
            .into_iter()
            .map(|mut f| {
                if f.table.is_empty() {
                    f.table = table.clone();
                }
                f
            })
            .collect();
        Self { table, fields }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Supplies destination schemas to the runner.
pub trait SchemaProvider: Send + Sync {
    fn table_schema(&self, table: &str) -> Option<TableSchema>;
}

impl SchemaProvider for HashMap<String, TableSchema> {
    fn table_schema(&self, table: &str) -> Option<TableSchema> {
        self.get(table).cloned()
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    jobs: Vec<ImportJob>,
    #[serde(default)]
    tables: Vec<TableSchema>,
}

/// Jobs and table schemas loaded from a JSON catalog file.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    jobs: HashMap<String, ImportJob>,
    tables: HashMap<String, TableSchema>,
}

impl Catalog {
    pub fn from_json(raw: &str) -> ImportResult<Self> {
        let file: CatalogFile = serde_json::from_str(raw)?;
        let mut catalog = Catalog::default();
        for job in file.jobs {
            if catalog.jobs.contains_key(&job.id) {
                return Err(ImportError::Config(format!("duplicate job id '{}'", job.id)));
            }
            catalog.jobs.insert(job.id.clone(), job);
        }
        for schema in file.tables {
            let schema = TableSchema::new(schema.table, schema.fields);
            catalog.tables.insert(schema.table.clone(), schema);
        }
        Ok(catalog)
    }

    pub async fn load(path: &Path) -> ImportResult<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::from_json(&raw)
    }

    pub fn job(&self, id: &str) -> ImportResult<&ImportJob> {
        self.jobs
            .get(id)
            .ok_or_else(|| ImportError::UnknownJob(id.to_string()))
    }
}

impl SchemaProvider for Catalog {
    fn table_schema(&self, table: &str) -> Option<TableSchema> {
        self.tables.get(table).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "jobs": [{
            "id": "members",
            "fileSrc": "files/members.csv",
            "importTable": "tl_member",
            "importMode": "insertOrUpdate",
            "fieldSeparator": ";",
            "selectedFields": ["username", "dateOfBirth"],
            "skipValidationFields": ["dateOfBirth"],
            "identityField": "username"
        }],
        "tables": [{
            "table": "tl_member",
            "fields": [
                {"name": "username", "unique": true},
                {"name": "dateOfBirth", "rgxp": "date"}
            ]
        }]
    }"#;

    #[test]
    fn catalog_fills_defaults_and_owning_table() {
        let catalog = Catalog::from_json(CATALOG).unwrap();
        let job = catalog.job("members").unwrap();
        assert_eq!(job.import_mode, ImportMode::InsertOrUpdate);
        assert_eq!(job.array_separator, "||");
        assert_eq!(job.limit, 0);
        assert!(job.skips_validation("dateOfBirth"));

        let schema = catalog.table_schema("tl_member").unwrap();
        let dob = schema.field("dateOfBirth").unwrap();
        assert_eq!(dob.table, "tl_member");
        assert_eq!(dob.validation.as_deref(), Some("date"));

        let dialect = job.dialect().unwrap();
        assert_eq!(dialect.delimiter, b';');
        assert_eq!(dialect.quote, b'"');
    }

    #[test]
    fn unknown_job_is_reported() {
        let catalog = Catalog::from_json(CATALOG).unwrap();
        assert!(matches!(
            catalog.job("nope"),
            Err(ImportError::UnknownJob(id)) if id == "nope"
        ));
    }

    #[test]
    fn multi_byte_separator_is_rejected() {
        let catalog = Catalog::from_json(CATALOG).unwrap();
        let mut job = catalog.job("members").unwrap().clone();
        job.field_separator = "||".into();
        assert!(matches!(job.dialect(), Err(ImportError::InvalidJob(_))));
    }

    #[test]
    fn mapping_checks_width_fields_and_identity() {
        let catalog = Catalog::from_json(CATALOG).unwrap();
        let schema = catalog.table_schema("tl_member").unwrap();
        let mut job = catalog.job("members").unwrap().clone();

        assert!(job.check_mapping(&schema, 2).is_ok());
        assert!(job.check_mapping(&schema, 3).is_err());

        job.identity_field = "id".into();
        assert!(job.check_mapping(&schema, 2).is_err());

        job.import_mode = ImportMode::Insert;
        job.selected_fields = vec!["username".into(), "email".into()];
        assert!(job.check_mapping(&schema, 2).is_err());
    }
}
