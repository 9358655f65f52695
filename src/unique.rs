use crate::error::StorageError;
use crate::job::FieldDescriptor;
use crate::store::Store;
use std::collections::HashSet;
use std::sync::Arc;

/// Point lookups for fields declared unique.
///
/// Values are compared against live storage, so a row persisted earlier in the same chunk
/// is seen by later rows. Dry runs persist nothing; they [`stage`](Self::stage) accepted
/// values instead so in-chunk duplicates are still caught.
///
/// The row being updated is not excluded from the lookup: an update that keeps its own
/// unique value reads as a duplicate.
pub struct UniquenessChecker {
    store: Arc<dyn Store>,
    staged: HashSet<(String, String, String)>,
}

impl UniquenessChecker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            staged: HashSet::new(),
        }
    }

    /// `true` when a row with this value already exists. Only unique, non-empty fields are
    /// looked up.
    pub async fn check_unique(
        &self,
        value: &str,
        descriptor: &FieldDescriptor,
    ) -> Result<bool, StorageError> {
        if !descriptor.unique || value.is_empty() {
            return Ok(false);
        }
        if self.staged.contains(&key(descriptor, value)) {
            return Ok(true);
        }
        self.store
            .value_exists(&descriptor.table, &descriptor.name, value)
            .await
    }

    /// Records a value that a dry run would have written.
    pub fn stage(&mut self, descriptor: &FieldDescriptor, value: &str) {
        if descriptor.unique && !value.is_empty() {
            self.staged.insert(key(descriptor, value));
        }
    }
}

fn key(descriptor: &FieldDescriptor, value: &str) -> (String, String, String) {
    (
        descriptor.table.clone(),
        descriptor.name.clone(),
        value.to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ImportMode;
    use crate::store::{MemoryStore, TargetRecord};
    use async_trait::async_trait;

    struct Offline;

    #[async_trait]
    impl Store for Offline {
        async fn check_table(&self, _: &str) -> Result<(), StorageError> {
            Ok(())
        }
        async fn value_exists(&self, _: &str, _: &str, _: &str) -> Result<bool, StorageError> {
            Err(StorageError::Unavailable("connection reset".into()))
        }
        async fn write_row(
            &self,
            _: &str,
            _: ImportMode,
            _: &str,
            _: &TargetRecord,
        ) -> Result<crate::store::WriteOutcome, StorageError> {
            Err(StorageError::Unavailable("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn looks_up_only_unique_non_empty_values() {
        let store = Arc::new(MemoryStore::with_table("tl_member"));
        let existing: TargetRecord = [("email", "a@example.com")].into_iter().collect();
        store.insert("tl_member", &existing).await;

        let checker = UniquenessChecker::new(store);
        let email = FieldDescriptor::new("tl_member", "email").unique();
        assert!(checker.check_unique("a@example.com", &email).await.unwrap());
        assert!(!checker.check_unique("b@example.com", &email).await.unwrap());
        assert!(!checker.check_unique("", &email).await.unwrap());

        let plain = FieldDescriptor::new("tl_member", "email");
        assert!(!checker.check_unique("a@example.com", &plain).await.unwrap());
    }

    #[tokio::test]
    async fn staged_values_count_as_existing() {
        let mut checker = UniquenessChecker::new(Arc::new(MemoryStore::with_table("t")));
        let code = FieldDescriptor::new("t", "code").unique();
        assert!(!checker.check_unique("dup", &code).await.unwrap());
        checker.stage(&code, "dup");
        assert!(checker.check_unique("dup", &code).await.unwrap());
    }

    #[tokio::test]
    async fn storage_failures_are_not_swallowed() {
        let checker = UniquenessChecker::new(Arc::new(Offline));
        let code = FieldDescriptor::new("t", "code").unique();
        assert!(matches!(
            checker.check_unique("x", &code).await,
            Err(StorageError::Unavailable(_))
        ));
    }
}
