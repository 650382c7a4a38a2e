#![forbid(unsafe_code)]

use crate::document_store::{
    DocumentFields, DocumentFilter, DocumentId, OrderBy, StorageError, StoredDocument,
};

/// Collection-scoped document persistence consumed by the subscription gateway.
///
/// Documents are opaque field maps keyed by a store-assigned id. Every
/// mutation is a full overwrite; there is no partial update and no
/// concurrency token.
pub trait DocumentBackend {
    fn list(
        &self,
        collection: &str,
        filter: &DocumentFilter,
        order_by: Option<&OrderBy>,
    ) -> Result<Vec<StoredDocument>, StorageError>;

    fn get(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<StoredDocument>, StorageError>;

    fn insert(
        &mut self,
        collection: &str,
        fields: DocumentFields,
    ) -> Result<DocumentId, StorageError>;

    fn replace(
        &mut self,
        collection: &str,
        id: &DocumentId,
        fields: DocumentFields,
    ) -> Result<(), StorageError>;

    fn remove(&mut self, collection: &str, id: &DocumentId) -> Result<(), StorageError>;
}
