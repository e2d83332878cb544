use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};

use factline_core::{
    cosine_similarity, Collection, FieldType, IndexEntry, IndexError, IndexHit, VectorIndex,
};

use crate::schema::open_fact_store_connection;

/// Stable key for a metadata entry: `collection:owner:field:sha256(text)`.
pub fn entry_key(entry: &IndexEntry) -> String {
    format!(
        "{}:{}:{}:{}",
        entry.collection.as_str(),
        entry.owner_id,
        entry.field_type.as_str(),
        sha256_hex(entry.text.as_bytes())
    )
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut output = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

#[derive(Debug, Clone)]
struct StoredVector {
    owner_id: i64,
    field_type: FieldType,
    text: String,
    embedding: Vec<f32>,
}

/// Brute-force nearest neighbors: `k` per query vector, merged ascending by distance.
fn rank_hits(candidates: &[StoredVector], vectors: &[Vec<f32>], k: usize) -> Vec<IndexHit> {
    if k == 0 || candidates.is_empty() {
        return Vec::new();
    }
    let mut merged = Vec::new();
    for vector in vectors {
        let mut hits = candidates
            .iter()
            .map(|candidate| IndexHit {
                owner_id: candidate.owner_id,
                field_type: candidate.field_type,
                text: candidate.text.clone(),
                distance: 1.0 - cosine_similarity(vector, &candidate.embedding),
            })
            .collect::<Vec<_>>();
        sort_hits(&mut hits);
        hits.truncate(k);
        merged.extend(hits);
    }
    sort_hits(&mut merged);
    merged
}

fn sort_hits(hits: &mut [IndexHit]) {
    hits.sort_by(|left, right| {
        left.distance
            .total_cmp(&right.distance)
            .then_with(|| left.owner_id.cmp(&right.owner_id))
            .then_with(|| left.text.cmp(&right.text))
    });
}

fn lock_poisoned(_: impl std::fmt::Display) -> IndexError {
    IndexError::Storage("vector index lock poisoned".to_string())
}

fn storage_error(error: rusqlite::Error) -> IndexError {
    IndexError::Storage(error.to_string())
}

/// Persistent vector index backed by its own SQLite file.
pub struct SqliteVectorIndex {
    connection: Mutex<Connection>,
}

impl SqliteVectorIndex {
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        let connection =
            open_fact_store_connection(path).map_err(|error| IndexError::Storage(error.to_string()))?;
        Self::from_connection(connection)
    }

    pub fn open_in_memory() -> Result<Self, IndexError> {
        let connection = Connection::open_in_memory().map_err(storage_error)?;
        Self::from_connection(connection)
    }

    fn from_connection(connection: Connection) -> Result<Self, IndexError> {
        connection
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS vector_entries (
                    entry_key TEXT PRIMARY KEY,
                    collection TEXT NOT NULL,
                    owner_id INTEGER NOT NULL,
                    field_type TEXT NOT NULL,
                    text TEXT NOT NULL,
                    embedding_json TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_vector_entries_collection_field
                    ON vector_entries(collection, field_type);
                "#,
            )
            .map_err(storage_error)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, IndexError> {
        self.connection.lock().map_err(lock_poisoned)
    }

    fn load_collection(
        connection: &Connection,
        collection: Collection,
        field_types: &[FieldType],
    ) -> Result<Vec<StoredVector>, IndexError> {
        let mut statement = connection
            .prepare(
                r#"
                SELECT owner_id, field_type, text, embedding_json
                FROM vector_entries
                WHERE collection = ?1
                ORDER BY entry_key ASC
                "#,
            )
            .map_err(storage_error)?;
        let mut rows = statement
            .query(params![collection.as_str()])
            .map_err(storage_error)?;
        let mut vectors = Vec::new();
        while let Some(row) = rows.next().map_err(storage_error)? {
            let raw_field: String = row.get(1).map_err(storage_error)?;
            let field_type = FieldType::parse(&raw_field)
                .ok_or_else(|| IndexError::Corrupt(format!("unknown field type '{raw_field}'")))?;
            if !field_types.contains(&field_type) {
                continue;
            }
            let encoded: String = row.get(3).map_err(storage_error)?;
            let embedding = serde_json::from_str::<Vec<f32>>(&encoded)
                .map_err(|error| IndexError::Corrupt(format!("embedding json: {error}")))?;
            vectors.push(StoredVector {
                owner_id: row.get(0).map_err(storage_error)?,
                field_type,
                text: row.get(2).map_err(storage_error)?,
                embedding,
            });
        }
        Ok(vectors)
    }
}

impl VectorIndex for SqliteVectorIndex {
    fn add(&self, entries: &[IndexEntry]) -> Result<usize, IndexError> {
        let mut connection = self.lock()?;
        let transaction = connection.transaction().map_err(storage_error)?;
        let mut written = 0usize;
        for entry in entries {
            let embedding_json = serde_json::to_string(&entry.embedding)
                .map_err(|error| IndexError::Corrupt(format!("embedding json: {error}")))?;
            written += transaction
                .execute(
                    r#"
                    INSERT OR IGNORE INTO vector_entries (
                        entry_key,
                        collection,
                        owner_id,
                        field_type,
                        text,
                        embedding_json
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                    params![
                        entry_key(entry),
                        entry.collection.as_str(),
                        entry.owner_id,
                        entry.field_type.as_str(),
                        entry.text,
                        embedding_json,
                    ],
                )
                .map_err(storage_error)?;
        }
        transaction.commit().map_err(storage_error)?;
        Ok(written)
    }

    fn query(
        &self,
        collection: Collection,
        vectors: &[Vec<f32>],
        field_types: &[FieldType],
        k: usize,
    ) -> Result<Vec<IndexHit>, IndexError> {
        let connection = self.lock()?;
        let candidates = Self::load_collection(&connection, collection, field_types)?;
        Ok(rank_hits(&candidates, vectors, k))
    }

    fn count(&self, collection: Collection) -> Result<usize, IndexError> {
        let connection = self.lock()?;
        let count: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM vector_entries WHERE collection = ?1",
                params![collection.as_str()],
                |row| row.get(0),
            )
            .map_err(storage_error)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn clear(&self) -> Result<(), IndexError> {
        let connection = self.lock()?;
        connection
            .execute("DELETE FROM vector_entries", [])
            .map_err(storage_error)?;
        Ok(())
    }
}

/// Ephemeral vector index keyed the same way as [`SqliteVectorIndex`].
#[derive(Default)]
pub struct InMemoryVectorIndex {
    entries: Mutex<BTreeMap<String, (Collection, StoredVector)>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorIndex for InMemoryVectorIndex {
    fn add(&self, entries: &[IndexEntry]) -> Result<usize, IndexError> {
        let mut stored = self.entries.lock().map_err(lock_poisoned)?;
        let mut written = 0usize;
        for entry in entries {
            let key = entry_key(entry);
            if stored.contains_key(&key) {
                continue;
            }
            stored.insert(
                key,
                (
                    entry.collection,
                    StoredVector {
                        owner_id: entry.owner_id,
                        field_type: entry.field_type,
                        text: entry.text.clone(),
                        embedding: entry.embedding.clone(),
                    },
                ),
            );
            written += 1;
        }
        Ok(written)
    }

    fn query(
        &self,
        collection: Collection,
        vectors: &[Vec<f32>],
        field_types: &[FieldType],
        k: usize,
    ) -> Result<Vec<IndexHit>, IndexError> {
        let stored = self.entries.lock().map_err(lock_poisoned)?;
        let candidates = stored
            .values()
            .filter(|(entry_collection, vector)| {
                *entry_collection == collection && field_types.contains(&vector.field_type)
            })
            .map(|(_, vector)| vector.clone())
            .collect::<Vec<_>>();
        Ok(rank_hits(&candidates, vectors, k))
    }

    fn count(&self, collection: Collection) -> Result<usize, IndexError> {
        let stored = self.entries.lock().map_err(lock_poisoned)?;
        Ok(stored
            .values()
            .filter(|(entry_collection, _)| *entry_collection == collection)
            .count())
    }

    fn clear(&self) -> Result<(), IndexError> {
        self.entries.lock().map_err(lock_poisoned)?.clear();
        Ok(())
    }
}
