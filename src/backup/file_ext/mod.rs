use std::sync::Arc;

/// Contributes a file extension (without the leading dot) to the backup file name.
pub trait FileExtProvider {
    fn file_ext(&self) -> Option<Arc<str>>;
}
