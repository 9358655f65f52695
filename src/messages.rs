use crate::error::ErrorKind;

/// Renders row errors for display.
pub trait MessageCatalog: Send + Sync {
    fn render(&self, field: Option<&str>, kind: &ErrorKind) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishMessages;

impl MessageCatalog for EnglishMessages {
    fn render(&self, field: Option<&str>, kind: &ErrorKind) -> String {
        let field = field.unwrap_or("row");
        match kind {
            ErrorKind::ColumnCountMismatch { expected, found } => {
                format!("Expected {expected} columns but found {found}.")
            }
            ErrorKind::InvalidFormat { value, rule } => {
                format!("Invalid {rule} value '{value}' in field '{field}'.")
            }
            ErrorKind::DuplicateValue { value } => {
                format!("Field '{field}' must be unique, '{value}' already exists.")
            }
            ErrorKind::MissingRequired => format!("Field '{field}' is mandatory."),
            ErrorKind::UnreadableRow { reason } => format!("Row could not be read: {reason}."),
            ErrorKind::NoMatchingRow { value } => {
                format!("No existing record with {field} '{value}' to update.")
            }
            ErrorKind::StorageUnavailable { reason } => {
                format!("Storage error while processing {field}: {reason}.")
            }
        }
    }
}
