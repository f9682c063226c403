use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use techpack_core::DraftKey;

use crate::error::StorageError;
use crate::traits::{LocalStore, StoredDraft, StoredListCache};

/// The list cache holds a single entry.
const LIST_SLOT: &str = "records";

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        debug!(path = %path.display(), "opened local store");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl LocalStore for SqliteStore {
    fn put_draft(
        &mut self,
        key: &DraftKey,
        payload: &[u8],
        content_hash: &[u8; 32],
    ) -> Result<bool, StorageError> {
        let tx = self.conn.transaction()?;

        let existing: Option<Vec<u8>> = tx
            .query_row(
                "SELECT content_hash FROM drafts WHERE draft_key = ?1",
                rusqlite::params![key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if existing.as_deref() == Some(content_hash.as_slice()) {
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO drafts (draft_key, payload, content_hash) VALUES (?1, ?2, ?3)
             ON CONFLICT(draft_key) DO UPDATE SET payload = excluded.payload, content_hash = excluded.content_hash, saved_at = excluded.saved_at",
            rusqlite::params![key.as_str(), payload, content_hash.as_slice()],
        )?;
        tx.commit()?;
        Ok(true)
    }

    fn get_draft(&self, key: &DraftKey) -> Result<Option<StoredDraft>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT draft_key, payload, content_hash, saved_at FROM drafts WHERE draft_key = ?1",
                rusqlite::params![key.as_str()],
                |row| {
                    let draft_key: String = row.get(0)?;
                    let payload: Vec<u8> = row.get(1)?;
                    let hash: Vec<u8> = row.get(2)?;
                    let saved_at: i64 = row.get(3)?;
                    Ok((draft_key, payload, hash, saved_at))
                },
            )
            .optional()?;

        match row {
            Some((draft_key, payload, hash, saved_at)) => Ok(Some(StoredDraft {
                draft_key,
                payload,
                content_hash: to_array::<32>(hash, "content_hash")?,
                saved_at,
            })),
            None => Ok(None),
        }
    }

    fn delete_draft(&mut self, key: &DraftKey) -> Result<bool, StorageError> {
        let removed = self.conn.execute(
            "DELETE FROM drafts WHERE draft_key = ?1",
            rusqlite::params![key.as_str()],
        )?;
        Ok(removed > 0)
    }

    fn draft_keys(&self) -> Result<Vec<String>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT draft_key FROM drafts ORDER BY saved_at DESC, draft_key")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    fn put_list_cache(&mut self, payload: &[u8]) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO list_cache (slot, payload) VALUES (?1, ?2)
             ON CONFLICT(slot) DO UPDATE SET payload = excluded.payload, fetched_at = excluded.fetched_at",
            rusqlite::params![LIST_SLOT, payload],
        )?;
        Ok(())
    }

    fn get_list_cache(&self) -> Result<Option<StoredListCache>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT payload, fetched_at FROM list_cache WHERE slot = ?1",
                rusqlite::params![LIST_SLOT],
                |row| {
                    Ok(StoredListCache {
                        payload: row.get(0)?,
                        fetched_at: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn clear_list_cache(&mut self) -> Result<(), StorageError> {
        self.conn.execute(
            "DELETE FROM list_cache WHERE slot = ?1",
            rusqlite::params![LIST_SLOT],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use techpack_core::RecordId;

    fn hash(byte: u8) -> [u8; 32] {
        [byte; 32]
    }

    #[test]
    fn open_reports_unusable_parent_as_io() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory")?;

        let err = SqliteStore::open(blocker.join("nested").join("local.sqlite")).err();
        assert!(matches!(err, Some(StorageError::Io(_))));
        Ok(())
    }

    #[test]
    fn draft_put_get_delete() -> Result<(), StorageError> {
        let mut store = SqliteStore::open_in_memory()?;
        let key = DraftKey::Record(RecordId::new("rec-1"));

        assert!(store.get_draft(&key)?.is_none());
        assert!(store.put_draft(&key, b"first", &hash(1))?);

        let draft = store.get_draft(&key)?.unwrap();
        assert_eq!(draft.draft_key, "rec-1");
        assert_eq!(draft.payload, b"first");
        assert_eq!(draft.content_hash, hash(1));

        assert!(store.delete_draft(&key)?);
        assert!(!store.delete_draft(&key)?);
        assert!(store.get_draft(&key)?.is_none());
        Ok(())
    }

    #[test]
    fn identical_hash_skips_write() -> Result<(), StorageError> {
        let mut store = SqliteStore::open_in_memory()?;
        let key = DraftKey::New;

        assert!(store.put_draft(&key, b"a", &hash(7))?);
        assert!(!store.put_draft(&key, b"a", &hash(7))?);
        assert!(store.put_draft(&key, b"b", &hash(8))?);
        assert_eq!(store.get_draft(&key)?.unwrap().payload, b"b");
        Ok(())
    }

    #[test]
    fn drafts_are_keyed_independently() -> Result<(), StorageError> {
        let mut store = SqliteStore::open_in_memory()?;
        store.put_draft(&DraftKey::New, b"new", &hash(1))?;
        store.put_draft(&DraftKey::Record(RecordId::new("r2")), b"r2", &hash(2))?;

        let mut keys = store.draft_keys()?;
        keys.sort();
        assert_eq!(keys, vec!["new".to_string(), "r2".to_string()]);
        assert_eq!(store.get_draft(&DraftKey::New)?.unwrap().payload, b"new");
        Ok(())
    }

    #[test]
    fn list_cache_single_slot() -> Result<(), StorageError> {
        let mut store = SqliteStore::open_in_memory()?;
        assert!(store.get_list_cache()?.is_none());

        store.put_list_cache(b"page-1")?;
        store.put_list_cache(b"page-2")?;
        assert_eq!(store.get_list_cache()?.unwrap().payload, b"page-2");

        store.clear_list_cache()?;
        assert!(store.get_list_cache()?.is_none());
        Ok(())
    }

    #[test]
    fn survives_reopen() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("local.sqlite");
        {
            let mut store = SqliteStore::open(&path)?;
            store.put_draft(&DraftKey::New, b"keep", &hash(3))?;
            store.put_list_cache(b"list")?;
        }
        let store = SqliteStore::open(&path)?;
        assert_eq!(store.get_draft(&DraftKey::New)?.unwrap().payload, b"keep");
        assert_eq!(store.get_list_cache()?.unwrap().payload, b"list");
        Ok(())
    }
}
