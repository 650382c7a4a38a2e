#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::journal::{Journal, JournalEntry, JournalOp};
use crate::repo::DocumentBackend;

pub type DocumentFields = serde_json::Map<String, Value>;

/// Length of store-assigned document ids (hex chars).
pub const DOCUMENT_ID_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("document '{id}' not found in collection '{collection}'")]
    NotFound { collection: String, id: String },
    #[error("document backend unavailable: {0}")]
    Unavailable(String),
    #[error("journal '{path}': {reason}")]
    Journal { path: String, reason: String },
    #[error("document '{id}' already exists in collection '{collection}'")]
    DuplicateId { collection: String, id: String },
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(raw: impl Into<String>) -> Result<Self, StorageError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(StorageError::InvalidDocument(
                "document id must not be empty".to_string(),
            ));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: DocumentId,
    pub fields: DocumentFields,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentFilter {
    All,
    FieldEquals { field: String, value: Value },
}

impl DocumentFilter {
    pub fn field_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::FieldEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    fn matches(&self, fields: &DocumentFields) -> bool {
        match self {
            Self::All => true,
            Self::FieldEquals { field, value } => fields.get(field) == Some(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: OrderDirection,
}

impl OrderBy {
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Descending,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Ascending,
        }
    }
}

fn type_rank(v: Option<&Value>) -> u8 {
    match v {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Ids mix a fresh random salt into the digest, so separate handles on one
/// journal never mint the same id for the same sequence number.
fn derive_document_id(collection: &str, seq: u64) -> String {
    let mut salt = [0u8; 16];
    OsRng.fill_bytes(&mut salt);
    let mut hasher = Sha256::new();
    hasher.update(collection.as_bytes());
    hasher.update(b"/");
    hasher.update(seq.to_be_bytes());
    hasher.update(salt);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(DOCUMENT_ID_LEN);
    for b in digest.iter() {
        out.push_str(&format!("{b:02x}"));
        if out.len() >= DOCUMENT_ID_LEN {
            break;
        }
    }
    out.truncate(DOCUMENT_ID_LEN);
    out
}

#[derive(Debug, Clone)]
struct DocumentRow {
    insert_seq: u64,
    fields: DocumentFields,
}

#[derive(Debug, Clone, Default)]
struct Collection {
    rows: BTreeMap<DocumentId, DocumentRow>,
    next_seq: u64,
}

/// In-memory document store, optionally backed by an append-only journal that
/// is replayed on open.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    collections: BTreeMap<String, Collection>,
    journal: Option<Journal>,
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new_in_memory()
    }
}

impl DocumentStore {
    pub fn new_in_memory() -> Self {
        Self {
            collections: BTreeMap::new(),
            journal: None,
        }
    }

    pub fn open_with_journal(path: PathBuf) -> Result<Self, StorageError> {
        let journal = Journal::new(path);
        journal.ensure_ready()?;
        let entries = journal.read_entries()?;
        let mut store = Self::new_in_memory();
        let replayed = entries.len();
        for (idx, entry) in entries.into_iter().enumerate() {
            store.apply(entry.op).map_err(|err| StorageError::Journal {
                path: journal.path().display().to_string(),
                reason: format!("replay failed at entry {}: {}", idx + 1, err),
            })?;
        }
        info!(
            path = %journal.path().display(),
            replayed,
            "document store journal replayed"
        );
        store.journal = Some(journal);
        Ok(store)
    }

    pub fn journal_path(&self) -> Option<&Path> {
        self.journal.as_ref().map(Journal::path)
    }

    pub fn document_count(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map(|c| c.rows.len())
            .unwrap_or(0)
    }

    fn not_found(collection: &str, id: &str) -> StorageError {
        StorageError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    fn apply(&mut self, op: JournalOp) -> Result<(), StorageError> {
        match op {
            JournalOp::Insert {
                collection,
                id,
                seq,
                fields,
            } => {
                let id = DocumentId::new(id)?;
                let coll = self.collections.entry(collection.clone()).or_default();
                if coll.rows.contains_key(&id) {
                    return Err(StorageError::DuplicateId {
                        collection,
                        id: id.0,
                    });
                }
                coll.next_seq = coll.next_seq.max(seq.saturating_add(1));
                coll.rows.insert(
                    id,
                    DocumentRow {
                        insert_seq: seq,
                        fields,
                    },
                );
            }
            JournalOp::Replace {
                collection,
                id,
                fields,
            } => {
                let row = self
                    .collections
                    .get_mut(&collection)
                    .and_then(|c| c.rows.get_mut(&DocumentId(id.clone())))
                    .ok_or_else(|| Self::not_found(&collection, &id))?;
                row.fields = fields;
            }
            JournalOp::Remove { collection, id } => {
                self.collections
                    .get_mut(&collection)
                    .and_then(|c| c.rows.remove(&DocumentId(id.clone())))
                    .ok_or_else(|| Self::not_found(&collection, &id))?;
            }
        }
        Ok(())
    }

    fn commit(&mut self, op: JournalOp) -> Result<(), StorageError> {
        if let Some(journal) = &self.journal {
            journal.append(&JournalEntry::v1(op.clone()))?;
        }
        self.apply(op)
    }

    fn contains(&self, collection: &str, id: &DocumentId) -> bool {
        self.collections
            .get(collection)
            .map(|c| c.rows.contains_key(id))
            .unwrap_or(false)
    }
}

impl DocumentBackend for DocumentStore {
    fn list(
        &self,
        collection: &str,
        filter: &DocumentFilter,
        order_by: Option<&OrderBy>,
    ) -> Result<Vec<StoredDocument>, StorageError> {
        let Some(coll) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<(&DocumentId, &DocumentRow)> = coll
            .rows
            .iter()
            .filter(|(_, row)| filter.matches(&row.fields))
            .collect();
        rows.sort_by(|(_, a), (_, b)| {
            let ord = match order_by {
                Some(o) => compare_values(a.fields.get(&o.field), b.fields.get(&o.field))
                    .then(a.insert_seq.cmp(&b.insert_seq)),
                None => a.insert_seq.cmp(&b.insert_seq),
            };
            match order_by.map(|o| o.direction) {
                Some(OrderDirection::Descending) => ord.reverse(),
                _ => ord,
            }
        });
        Ok(rows
            .into_iter()
            .map(|(id, row)| StoredDocument {
                id: id.clone(),
                fields: row.fields.clone(),
            })
            .collect())
    }

    fn get(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<StoredDocument>, StorageError> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|c| c.rows.get(id))
            .map(|row| StoredDocument {
                id: id.clone(),
                fields: row.fields.clone(),
            }))
    }

    fn insert(
        &mut self,
        collection: &str,
        fields: DocumentFields,
    ) -> Result<DocumentId, StorageError> {
        let mut seq = self
            .collections
            .get(collection)
            .map(|c| c.next_seq)
            .unwrap_or(0);
        let mut id = DocumentId(derive_document_id(collection, seq));
        while self.contains(collection, &id) {
            seq = seq.saturating_add(1);
            id = DocumentId(derive_document_id(collection, seq));
        }
        self.commit(JournalOp::Insert {
            collection: collection.to_string(),
            id: id.0.clone(),
            seq,
            fields,
        })?;
        debug!(collection, id = id.as_str(), "document inserted");
        Ok(id)
    }

    fn replace(
        &mut self,
        collection: &str,
        id: &DocumentId,
        fields: DocumentFields,
    ) -> Result<(), StorageError> {
        if !self.contains(collection, id) {
            return Err(Self::not_found(collection, id.as_str()));
        }
        self.commit(JournalOp::Replace {
            collection: collection.to_string(),
            id: id.0.clone(),
            fields,
        })?;
        debug!(collection, id = id.as_str(), "document replaced");
        Ok(())
    }

    fn remove(&mut self, collection: &str, id: &DocumentId) -> Result<(), StorageError> {
        if !self.contains(collection, id) {
            return Err(Self::not_found(collection, id.as_str()));
        }
        self.commit(JournalOp::Remove {
            collection: collection.to_string(),
            id: id.0.clone(),
        })?;
        debug!(collection, id = id.as_str(), "document removed");
        Ok(())
    }
}
