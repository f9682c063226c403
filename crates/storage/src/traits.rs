use techpack_core::DraftKey;

use crate::error::StorageError;

#[derive(Debug, Clone)]
pub struct StoredDraft {
    pub draft_key: String,
    pub payload: Vec<u8>,
    pub content_hash: [u8; 32],
    /// Milliseconds since the Unix epoch.
    pub saved_at: i64,
}

#[derive(Debug, Clone)]
pub struct StoredListCache {
    pub payload: Vec<u8>,
    pub fetched_at: i64,
}

/// Durable key/value slots for drafts and the list cache. Payloads are
/// opaque to the store; versioning of their shape is the caller's concern.
pub trait LocalStore {
    /// Returns `false` when the stored draft already carries `content_hash`
    /// and nothing was written.
    fn put_draft(
        &mut self,
        key: &DraftKey,
        payload: &[u8],
        content_hash: &[u8; 32],
    ) -> Result<bool, StorageError>;

    fn get_draft(&self, key: &DraftKey) -> Result<Option<StoredDraft>, StorageError>;

    fn delete_draft(&mut self, key: &DraftKey) -> Result<bool, StorageError>;

    fn draft_keys(&self) -> Result<Vec<String>, StorageError>;

    fn put_list_cache(&mut self, payload: &[u8]) -> Result<(), StorageError>;

    fn get_list_cache(&self) -> Result<Option<StoredListCache>, StorageError>;

    fn clear_list_cache(&mut self) -> Result<(), StorageError>;
}
