//! Validation and persistence of a single CSV row.

use crate::error::ErrorKind;
use crate::job::{FieldDescriptor, ImportJob, ImportMode, TableSchema};
use crate::messages::MessageCatalog;
use crate::reader::CsvRow;
use crate::report::FieldError;
use crate::rules::RuleRegistry;
use crate::store::{Store, TargetRecord, WriteOutcome};
use crate::unique::UniquenessChecker;
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowResult {
    /// `outcome` is what was written, or what would have been written in test mode.
    Accepted {
        record: TargetRecord,
        outcome: WriteOutcome,
    },
    Rejected(Vec<FieldError>),
}

impl RowResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, RowResult::Accepted { .. })
    }
}

/// One cell bound to its descriptor while the row is being checked.
struct FieldValue<'a> {
    descriptor: &'a FieldDescriptor,
    /// Value as it will be stored.
    value: String,
    /// Individually validated parts; one part unless the field is multi-valued.
    parts: Vec<String>,
    errors: Vec<ErrorKind>,
}

impl<'a> FieldValue<'a> {
    fn bind(descriptor: &'a FieldDescriptor, cell: &str, array_separator: &str) -> Self {
        if descriptor.multiple && !cell.is_empty() {
            let parts: Vec<String> = cell
                .split(array_separator)
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            // A cell holding only separators carries no value at all.
            let value = if parts.is_empty() {
                String::new()
            } else {
                serde_json::Value::from(parts.clone()).to_string()
            };
            Self {
                descriptor,
                value,
                parts,
                errors: Vec::new(),
            }
        } else {
            Self {
                descriptor,
                value: cell.to_string(),
                parts: vec![cell.to_string()],
                errors: Vec::new(),
            }
        }
    }
}

/// Validates one row at a time and persists accepted rows.
///
/// Rows must be fed in file order: uniqueness lookups rely on earlier rows of the same
/// chunk having been written (or staged, in test mode).
pub struct RowProcessor {
    store: Arc<dyn Store>,
    rules: Arc<RuleRegistry>,
    messages: Arc<dyn MessageCatalog>,
    unique: UniquenessChecker,
    test_mode: bool,
    staged_identities: HashSet<String>,
}

impl RowProcessor {
    pub fn new(
        store: Arc<dyn Store>,
        rules: Arc<RuleRegistry>,
        messages: Arc<dyn MessageCatalog>,
        test_mode: bool,
    ) -> Self {
        Self {
            unique: UniquenessChecker::new(Arc::clone(&store)),
            store,
            rules,
            messages,
            test_mode,
            staged_identities: HashSet::new(),
        }
    }

    pub fn test_mode(&self) -> bool {
        self.test_mode
    }

    /// Checks every mapped field and, if all pass, writes the row.
    ///
    /// All fields are checked even after the first failure so the row is reported
    /// completely.
    pub async fn process(
        &mut self,
        row: &CsvRow,
        job: &ImportJob,
        schema: &TableSchema,
    ) -> RowResult {
        let expected = job.selected_fields.len();
        if row.cells.len() != expected {
            let kind = ErrorKind::ColumnCountMismatch {
                expected,
                found: row.cells.len(),
            };
            return RowResult::Rejected(vec![self.field_error(None, kind)]);
        }

        let descriptors: Vec<Cow<'_, FieldDescriptor>> = job
            .selected_fields
            .iter()
            .map(|name| match schema.field(name) {
                Some(descriptor) => Cow::Borrowed(descriptor),
                None => Cow::Owned(FieldDescriptor::new(&schema.table, name.as_str())),
            })
            .collect();

        let mut fields = Vec::with_capacity(expected);
        for ((name, cell), descriptor) in job
            .selected_fields
            .iter()
            .zip(&row.cells)
            .zip(descriptors.iter().map(|d| d.as_ref()))
        {
            let skip_format = job.skips_validation(name);
            let mut field = FieldValue::bind(descriptor, cell, &job.array_separator);

            if field.value.is_empty() && descriptor.required && !skip_format {
                field.errors.push(ErrorKind::MissingRequired);
            }
            for part in &field.parts {
                field
                    .errors
                    .extend(self.rules.validate(part, descriptor, skip_format));
            }
            if descriptor.unique {
                match self.unique.check_unique(&field.value, descriptor).await {
                    Ok(true) => field.errors.push(ErrorKind::DuplicateValue {
                        value: field.value.clone(),
                    }),
                    Ok(false) => {}
                    Err(e) => field.errors.push(e.into()),
                }
            }
            fields.push(field);
        }

        let errors: Vec<FieldError> = fields
            .iter()
            .flat_map(|f| {
                f.errors
                    .iter()
                    .map(|kind| self.field_error(Some(&f.descriptor.name), kind.clone()))
            })
            .collect();
        if !errors.is_empty() {
            debug!(line = row.line, errors = errors.len(), "row rejected");
            return RowResult::Rejected(errors);
        }

        let record: TargetRecord = fields
            .iter()
            .map(|f| (f.descriptor.name.as_str(), f.value.as_str()))
            .collect();
        let written = if self.test_mode {
            self.simulate_write(job, &record).await
        } else {
            self.store
                .write_row(&job.import_table, job.import_mode, &job.identity_field, &record)
                .await
                .map_err(ErrorKind::from)
        };

        match written {
            Ok(outcome) => {
                if self.test_mode {
                    for f in &fields {
                        self.unique.stage(f.descriptor, &f.value);
                    }
                }
                debug!(line = row.line, ?outcome, test_mode = self.test_mode, "row accepted");
                RowResult::Accepted { record, outcome }
            }
            Err(kind) => {
                let field = match kind {
                    ErrorKind::NoMatchingRow { .. } => Some(job.identity_field.as_str()),
                    _ => None,
                };
                RowResult::Rejected(vec![self.field_error(field, kind)])
            }
        }
    }

    /// Predicts the write outcome with read-only lookups.
    async fn simulate_write(
        &mut self,
        job: &ImportJob,
        record: &TargetRecord,
    ) -> Result<WriteOutcome, ErrorKind> {
        if job.import_mode == ImportMode::Insert {
            return Ok(WriteOutcome::Inserted);
        }
        let key = record.get(&job.identity_field).unwrap_or_default().to_string();
        let exists = self.staged_identities.contains(&key)
            || self
                .store
                .value_exists(&job.import_table, &job.identity_field, &key)
                .await?;
        match (exists, job.import_mode) {
            (true, _) => Ok(WriteOutcome::Updated),
            (false, ImportMode::Update) => Err(ErrorKind::NoMatchingRow { value: key }),
            (false, _) => {
                self.staged_identities.insert(key);
                Ok(WriteOutcome::Inserted)
            }
        }
    }

    fn field_error(&self, field: Option<&str>, kind: ErrorKind) -> FieldError {
        FieldError {
            field: field.map(str::to_string),
            message: self.messages.render(field, &kind),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::EnglishMessages;
    use crate::rules::TemporalFormats;
    use crate::store::MemoryStore;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn schema() -> TableSchema {
        TableSchema::new(
            "tl_member",
            vec![
                FieldDescriptor::new("", "username").unique().required(),
                FieldDescriptor::new("", "dateOfBirth").with_validation("date"),
                FieldDescriptor::new("", "groups").multiple().with_validation("digits"),
            ],
        )
    }

    fn job(mode: ImportMode) -> ImportJob {
        ImportJob {
            id: "members".into(),
            file_src: PathBuf::from("members.csv"),
            import_table: "tl_member".into(),
            import_mode: mode,
            field_separator: ",".into(),
            field_enclosure: "\"".into(),
            array_separator: "||".into(),
            selected_fields: vec!["username".into(), "dateOfBirth".into(), "groups".into()],
            skip_validation_fields: BTreeSet::new(),
            offset: 0,
            limit: 0,
            test_mode: false,
            identity_field: "username".into(),
            charset: None,
        }
    }

    fn processor(store: Arc<MemoryStore>, test_mode: bool) -> RowProcessor {
        let mut rules = RuleRegistry::with_formats(&TemporalFormats::default());
        rules.register_regex("digits", "[0-9]+").unwrap();
        RowProcessor::new(store, Arc::new(rules), Arc::new(EnglishMessages), test_mode)
    }

    fn row(line: usize, cells: &[&str]) -> CsvRow {
        CsvRow {
            line,
            cells: cells.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn kinds(result: &RowResult) -> Vec<(Option<String>, ErrorKind)> {
        match result {
            RowResult::Rejected(errors) => errors
                .iter()
                .map(|e| (e.field.clone(), e.kind.clone()))
                .collect(),
            RowResult::Accepted { .. } => Vec::new(),
        }
    }

    #[tokio::test]
    async fn accepted_row_is_persisted_with_multi_values_as_json() {
        let store = Arc::new(MemoryStore::with_table("tl_member"));
        let mut p = processor(store.clone(), false);
        let result = p
            .process(&row(1, &["ada", "1815-12-10", "1||2"]), &job(ImportMode::Insert), &schema())
            .await;
        assert!(result.is_accepted());
        let rows = store.rows("tl_member").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["groups"], "[\"1\",\"2\"]");
    }

    #[tokio::test]
    async fn separators_alone_leave_a_multi_value_field_empty() {
        let schema = TableSchema::new(
            "tl_member",
            vec![
                FieldDescriptor::new("", "username"),
                FieldDescriptor::new("", "dateOfBirth"),
                FieldDescriptor::new("", "groups").multiple().required(),
            ],
        );
        let store = Arc::new(MemoryStore::with_table("tl_member"));
        let mut p = processor(store.clone(), false);
        let job = job(ImportMode::Insert);

        let result = p.process(&row(1, &["ann", "", "||"]), &job, &schema).await;
        assert_eq!(
            kinds(&result),
            vec![(Some("groups".into()), ErrorKind::MissingRequired)]
        );
        let result = p.process(&row(2, &["bob", "", " || "]), &job, &schema).await;
        assert!(!result.is_accepted());
        assert!(store.rows("tl_member").await.is_empty());

        let optional = schema_with_optional_groups();
        let result = p.process(&row(3, &["cy", "", "||"]), &job, &optional).await;
        assert!(result.is_accepted());
        assert_eq!(store.rows("tl_member").await[0]["groups"], "");
    }

    fn schema_with_optional_groups() -> TableSchema {
        TableSchema::new(
            "tl_member",
            vec![
                FieldDescriptor::new("", "username"),
                FieldDescriptor::new("", "dateOfBirth"),
                FieldDescriptor::new("", "groups").multiple(),
            ],
        )
    }

    #[tokio::test]
    async fn every_invalid_field_is_reported() {
        let store = Arc::new(MemoryStore::with_table("tl_member"));
        let mut p = processor(store.clone(), false);
        let result = p
            .process(&row(1, &["", "10.12.1815", "1||x"]), &job(ImportMode::Insert), &schema())
            .await;
        assert_eq!(
            kinds(&result),
            vec![
                (Some("username".into()), ErrorKind::MissingRequired),
                (
                    Some("dateOfBirth".into()),
                    ErrorKind::InvalidFormat { value: "10.12.1815".into(), rule: "date".into() }
                ),
                (
                    Some("groups".into()),
                    ErrorKind::InvalidFormat { value: "x".into(), rule: "digits".into() }
                ),
            ]
        );
        assert!(store.rows("tl_member").await.is_empty());
    }

    #[tokio::test]
    async fn ragged_row_is_rejected() {
        let store = Arc::new(MemoryStore::with_table("tl_member"));
        let mut p = processor(store, false);
        let result = p
            .process(&row(7, &["ada", "1815-12-10"]), &job(ImportMode::Insert), &schema())
            .await;
        assert_eq!(
            kinds(&result),
            vec![(None, ErrorKind::ColumnCountMismatch { expected: 3, found: 2 })]
        );
    }

    #[tokio::test]
    async fn skip_list_bypasses_format_but_not_uniqueness() {
        let store = Arc::new(MemoryStore::with_table("tl_member"));
        let existing: TargetRecord = [("username", "ada")].into_iter().collect();
        store.insert("tl_member", &existing).await;

        let mut job = job(ImportMode::Insert);
        job.skip_validation_fields = ["username".to_string(), "dateOfBirth".to_string()].into();
        let mut p = processor(store, false);

        let result = p.process(&row(1, &["ada", "not a date", ""]), &job, &schema()).await;
        assert_eq!(
            kinds(&result),
            vec![(Some("username".into()), ErrorKind::DuplicateValue { value: "ada".into() })]
        );

        let result = p.process(&row(2, &["bob", "not a date", ""]), &job, &schema()).await;
        assert!(result.is_accepted());
    }

    #[tokio::test]
    async fn second_duplicate_in_same_chunk_is_rejected() {
        for test_mode in [false, true] {
            let store = Arc::new(MemoryStore::with_table("tl_member"));
            let mut p = processor(store.clone(), test_mode);
            let job = job(ImportMode::Insert);
            assert!(p.process(&row(1, &["dup", "", ""]), &job, &schema()).await.is_accepted());
            let second = p.process(&row(2, &["dup", "", ""]), &job, &schema()).await;
            assert_eq!(
                kinds(&second),
                vec![(Some("username".into()), ErrorKind::DuplicateValue { value: "dup".into() })]
            );
            let persisted = store.rows("tl_member").await.len();
            assert_eq!(persisted, if test_mode { 0 } else { 1 });
        }
    }

    #[tokio::test]
    async fn update_of_missing_identity_is_rejected_in_both_modes() {
        let schema = TableSchema::new(
            "tl_member",
            vec![
                FieldDescriptor::new("", "username"),
                FieldDescriptor::new("", "dateOfBirth"),
                FieldDescriptor::new("", "groups"),
            ],
        );
        for test_mode in [false, true] {
            let store = Arc::new(MemoryStore::with_table("tl_member"));
            let existing: TargetRecord = [("username", "ada")].into_iter().collect();
            store.insert("tl_member", &existing).await;
            let mut p = processor(store, test_mode);
            let job = job(ImportMode::Update);

            let updated = p.process(&row(1, &["ada", "1815-12-10", ""]), &job, &schema).await;
            assert!(matches!(
                updated,
                RowResult::Accepted { outcome: WriteOutcome::Updated, .. }
            ));
            let missing = p.process(&row(2, &["bob", "", ""]), &job, &schema).await;
            assert_eq!(
                kinds(&missing),
                vec![(Some("username".into()), ErrorKind::NoMatchingRow { value: "bob".into() })]
            );
        }
    }

    #[tokio::test]
    async fn update_onto_own_unique_value_reads_as_duplicate() {
        let store = Arc::new(MemoryStore::with_table("tl_member"));
        let existing: TargetRecord = [("username", "ada")].into_iter().collect();
        store.insert("tl_member", &existing).await;
        let mut p = processor(store, false);
        let result = p
            .process(&row(1, &["ada", "", ""]), &job(ImportMode::Update), &schema())
            .await;
        assert_eq!(
            kinds(&result),
            vec![(Some("username".into()), ErrorKind::DuplicateValue { value: "ada".into() })]
        );
    }
}
