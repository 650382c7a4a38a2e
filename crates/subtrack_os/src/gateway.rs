#![forbid(unsafe_code)]

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use subtrack_engines::calendar::{format_iso_date, parse_iso_date, resolve_renewal_date};
use subtrack_kernel_contracts::subscription::{
    Frequency, OwnerId, SubscriptionFormData, SubscriptionId, SubscriptionRecord,
    SubscriptionStatus,
};
use subtrack_kernel_contracts::{ContractViolation, Validate};
use subtrack_storage::document_store::{
    DocumentFields, DocumentFilter, DocumentId, OrderBy, StorageError, StoredDocument,
};
use subtrack_storage::repo::DocumentBackend;
use thiserror::Error;
use tracing::{error, info, warn};

pub const SUBSCRIPTIONS_COLLECTION: &str = "subscriptions";

mod fields {
    pub const OWNER_ID: &str = "owner_id";
    pub const NAME: &str = "name";
    pub const COST: &str = "cost";
    pub const FREQUENCY: &str = "frequency";
    pub const STATUS: &str = "status";
    pub const RENEWAL_DATE: &str = "renewal_date";
    pub const NOTES: &str = "notes";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error("invalid subscription: {0}")]
    Validation(#[from] ContractViolation),
    #[error("no authenticated principal")]
    Auth,
    #[error("subscription '{id}' not found")]
    NotFound { id: String },
    #[error("subscription store failure: {0}")]
    Backend(StorageError),
}

impl GatewayError {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::Auth => "AUTH",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Backend(_) => "BACKEND",
        }
    }
}

impl From<StorageError> for GatewayError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { id, .. } => GatewayError::NotFound { id },
            other => GatewayError::Backend(other),
        }
    }
}

/// Result of a list fetch that keeps "no subscriptions" apart from "fetch failed".
#[derive(Debug, Clone, PartialEq)]
pub enum ListOutcome {
    Loaded(Vec<SubscriptionRecord>),
    Failed { reason: String },
}

impl ListOutcome {
    pub fn into_result(self) -> Result<Vec<SubscriptionRecord>, String> {
        match self {
            Self::Loaded(rows) => Ok(rows),
            Self::Failed { reason } => Err(reason),
        }
    }
}

fn encode_timestamp(at: DateTime<Utc>) -> String {
    // Fixed-width nanosecond form keeps lexical and chronological order aligned.
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn malformed(id: &DocumentId, field: &str) -> GatewayError {
    GatewayError::Backend(StorageError::InvalidDocument(format!(
        "document '{}' has missing or malformed field '{}'",
        id.as_str(),
        field
    )))
}

fn text_field<'a>(doc: &'a StoredDocument, field: &str) -> Result<&'a str, GatewayError> {
    doc.fields
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(&doc.id, field))
}

fn encode_record(record: &SubscriptionRecord) -> DocumentFields {
    let mut f = DocumentFields::new();
    f.insert(fields::OWNER_ID.to_string(), Value::from(record.owner_id.as_str()));
    f.insert(fields::NAME.to_string(), Value::from(record.name.as_str()));
    f.insert(fields::COST.to_string(), Value::from(record.cost.to_string()));
    f.insert(fields::FREQUENCY.to_string(), Value::from(record.frequency.as_str()));
    f.insert(fields::STATUS.to_string(), Value::from(record.status.as_str()));
    f.insert(
        fields::RENEWAL_DATE.to_string(),
        Value::from(format_iso_date(record.renewal_date)),
    );
    f.insert(
        fields::NOTES.to_string(),
        record.notes.as_deref().map(Value::from).unwrap_or(Value::Null),
    );
    f.insert(
        fields::CREATED_AT.to_string(),
        Value::from(encode_timestamp(record.created_at)),
    );
    f.insert(
        fields::UPDATED_AT.to_string(),
        Value::from(encode_timestamp(record.updated_at)),
    );
    f
}

fn decode_record(doc: &StoredDocument) -> Result<SubscriptionRecord, GatewayError> {
    let timestamp = |field: &str| -> Result<DateTime<Utc>, GatewayError> {
        DateTime::parse_from_rfc3339(text_field(doc, field)?)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| malformed(&doc.id, field))
    };
    let id = SubscriptionId::new(doc.id.as_str()).map_err(|_| malformed(&doc.id, "id"))?;
    let owner_id = OwnerId::new(text_field(doc, fields::OWNER_ID)?)
        .map_err(|_| malformed(&doc.id, fields::OWNER_ID))?;
    let cost = Decimal::from_str(text_field(doc, fields::COST)?)
        .map_err(|_| malformed(&doc.id, fields::COST))?;
    let frequency = Frequency::parse(text_field(doc, fields::FREQUENCY)?)
        .ok_or_else(|| malformed(&doc.id, fields::FREQUENCY))?;
    let status = SubscriptionStatus::parse(text_field(doc, fields::STATUS)?)
        .ok_or_else(|| malformed(&doc.id, fields::STATUS))?;
    let renewal_date = parse_iso_date(text_field(doc, fields::RENEWAL_DATE)?, "renewal_date")
        .map_err(|_| malformed(&doc.id, fields::RENEWAL_DATE))?;
    let notes = match doc.fields.get(fields::NOTES) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(malformed(&doc.id, fields::NOTES)),
    };
    SubscriptionRecord::v1(
        id,
        owner_id,
        text_field(doc, fields::NAME)?.to_string(),
        cost,
        frequency,
        status,
        renewal_date,
        notes,
        timestamp(fields::CREATED_AT)?,
        timestamp(fields::UPDATED_AT)?,
    )
    .map_err(|v| {
        GatewayError::Backend(StorageError::InvalidDocument(format!(
            "document '{}' violates the record contract: {}",
            doc.id.as_str(),
            v
        )))
    })
}

fn log_failure(op: &'static str, owner: &OwnerId, err: &GatewayError) {
    match err {
        GatewayError::Backend(_) => {
            error!(op, owner = owner.as_str(), error = %err, "subscription operation failed")
        }
        _ => warn!(op, owner = owner.as_str(), error = %err, "subscription operation rejected"),
    }
}

/// Translates between subscription records and backend documents, scoped to one owner per call.
#[derive(Debug, Clone)]
pub struct SubscriptionGateway<B>
where
    B: DocumentBackend,
{
    backend: B,
}

impl<B> SubscriptionGateway<B>
where
    B: DocumentBackend,
{
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend_ref(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Turns an absent principal into `GatewayError::Auth`.
    pub fn resolve_owner(principal: Option<OwnerId>) -> Result<OwnerId, GatewayError> {
        principal.ok_or(GatewayError::Auth)
    }

    /// Owner's records, newest `created_at` first. Documents that do not
    /// decode into a valid record are skipped with a warning; only a backend
    /// failure fails the list.
    pub fn try_list_all(&self, owner: &OwnerId) -> Result<Vec<SubscriptionRecord>, GatewayError> {
        let docs = self.backend.list(
            SUBSCRIPTIONS_COLLECTION,
            &DocumentFilter::field_equals(fields::OWNER_ID, owner.as_str()),
            Some(&OrderBy::desc(fields::CREATED_AT)),
        )?;
        let mut rows = Vec::with_capacity(docs.len());
        for doc in &docs {
            match decode_record(doc) {
                Ok(record) => rows.push(record),
                Err(err) => warn!(
                    owner = owner.as_str(),
                    id = doc.id.as_str(),
                    error = %err,
                    "skipping malformed subscription document"
                ),
            }
        }
        Ok(rows)
    }

    /// Like [`Self::try_list_all`] but an unreachable backend yields an empty list.
    pub fn list_all(&self, owner: &OwnerId) -> Vec<SubscriptionRecord> {
        match self.try_list_all(owner) {
            Ok(rows) => rows,
            Err(err) => {
                warn!(owner = owner.as_str(), error = %err, "listing subscriptions failed; returning empty list");
                Vec::new()
            }
        }
    }

    pub fn fetch_all(&self, owner: &OwnerId) -> ListOutcome {
        match self.try_list_all(owner) {
            Ok(rows) => ListOutcome::Loaded(rows),
            Err(err) => {
                log_failure("list", owner, &err);
                ListOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    pub fn get(
        &self,
        owner: &OwnerId,
        id: &SubscriptionId,
    ) -> Result<SubscriptionRecord, GatewayError> {
        let not_found = || GatewayError::NotFound {
            id: id.as_str().to_string(),
        };
        let doc_id = DocumentId::new(id.as_str()).map_err(|_| not_found())?;
        let doc = self
            .backend
            .get(SUBSCRIPTIONS_COLLECTION, &doc_id)?
            .ok_or_else(not_found)?;
        // Foreign-owned records are reported exactly like missing ones.
        if doc.fields.get(fields::OWNER_ID).and_then(Value::as_str) != Some(owner.as_str()) {
            return Err(not_found());
        }
        decode_record(&doc)
    }

    pub fn create(
        &mut self,
        owner: &OwnerId,
        form: SubscriptionFormData,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionRecord, GatewayError> {
        let out = self.create_internal(owner, form, now);
        match &out {
            Ok(r) => info!(owner = owner.as_str(), id = r.id.as_str(), "subscription created"),
            Err(err) => log_failure("create", owner, err),
        }
        out
    }

    fn create_internal(
        &mut self,
        owner: &OwnerId,
        form: SubscriptionFormData,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionRecord, GatewayError> {
        owner.validate()?;
        form.validate()?;
        let renewal_date =
            resolve_renewal_date(form.purchase_date, form.renewal_date, form.frequency)?;
        // Validate the full record before the backend assigns an id.
        let pending = SubscriptionRecord::v1(
            SubscriptionId::new("pending")?,
            owner.clone(),
            form.name,
            form.cost,
            form.frequency,
            form.status,
            renewal_date,
            form.notes,
            now,
            now,
        )?;
        let doc_id = self
            .backend
            .insert(SUBSCRIPTIONS_COLLECTION, encode_record(&pending))?;
        Ok(SubscriptionRecord {
            id: SubscriptionId::new(doc_id.as_str())?,
            ..pending
        })
    }

    /// Full replace of every mutable field. Last writer wins.
    pub fn update(
        &mut self,
        owner: &OwnerId,
        id: &SubscriptionId,
        form: SubscriptionFormData,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionRecord, GatewayError> {
        let out = self.update_internal(owner, id, form, now);
        match &out {
            Ok(r) => info!(owner = owner.as_str(), id = r.id.as_str(), "subscription updated"),
            Err(err) => log_failure("update", owner, err),
        }
        out
    }

    fn update_internal(
        &mut self,
        owner: &OwnerId,
        id: &SubscriptionId,
        form: SubscriptionFormData,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionRecord, GatewayError> {
        let existing = self.get(owner, id)?;
        form.validate()?;
        let renewal_date =
            resolve_renewal_date(form.purchase_date, form.renewal_date, form.frequency)?;
        let updated = SubscriptionRecord::v1(
            existing.id,
            existing.owner_id,
            form.name,
            form.cost,
            form.frequency,
            form.status,
            renewal_date,
            form.notes,
            existing.created_at,
            now.max(existing.created_at),
        )?;
        let doc_id = DocumentId::new(updated.id.as_str())?;
        self.backend
            .replace(SUBSCRIPTIONS_COLLECTION, &doc_id, encode_record(&updated))?;
        Ok(updated)
    }

    pub fn delete(&mut self, owner: &OwnerId, id: &SubscriptionId) -> Result<(), GatewayError> {
        let out = self.delete_internal(owner, id);
        match &out {
            Ok(()) => info!(owner = owner.as_str(), id = id.as_str(), "subscription deleted"),
            Err(err) => log_failure("delete", owner, err),
        }
        out
    }

    fn delete_internal(&mut self, owner: &OwnerId, id: &SubscriptionId) -> Result<(), GatewayError> {
        let existing = self.get(owner, id)?;
        let doc_id = DocumentId::new(existing.id.as_str())?;
        self.backend.remove(SUBSCRIPTIONS_COLLECTION, &doc_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use subtrack_storage::document_store::DocumentStore;

    fn d(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
    }

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    fn owner(raw: &str) -> OwnerId {
        OwnerId::new(raw).unwrap()
    }

    fn form(name: &str, cost: &str, purchase: &str, frequency: Frequency) -> SubscriptionFormData {
        SubscriptionFormData::v1(
            name,
            Decimal::from_str(cost).unwrap(),
            frequency,
            SubscriptionStatus::Active,
            Some(d(purchase)),
            None,
            None,
        )
        .unwrap()
    }

    fn gateway() -> SubscriptionGateway<DocumentStore> {
        SubscriptionGateway::new(DocumentStore::new_in_memory())
    }

    /// Backend that fails every call.
    #[derive(Debug, Default)]
    struct UnreachableBackend;

    impl DocumentBackend for UnreachableBackend {
        fn list(
            &self,
            _: &str,
            _: &DocumentFilter,
            _: Option<&OrderBy>,
        ) -> Result<Vec<StoredDocument>, StorageError> {
            Err(StorageError::Unavailable("connection refused".to_string()))
        }
        fn get(&self, _: &str, _: &DocumentId) -> Result<Option<StoredDocument>, StorageError> {
            Err(StorageError::Unavailable("connection refused".to_string()))
        }
        fn insert(&mut self, _: &str, _: DocumentFields) -> Result<DocumentId, StorageError> {
            Err(StorageError::Unavailable("connection refused".to_string()))
        }
        fn replace(
            &mut self,
            _: &str,
            _: &DocumentId,
            _: DocumentFields,
        ) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("connection refused".to_string()))
        }
        fn remove(&mut self, _: &str, _: &DocumentId) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("connection refused".to_string()))
        }
    }

    #[test]
    fn at_gateway_01_create_derives_renewal_from_purchase() {
        let mut gw = gateway();
        let now = at("2024-01-15T09:30:00Z");
        let r = gw
            .create(&owner("o1"), form("Netflix", "15.49", "2024-01-15", Frequency::Monthly), now)
            .unwrap();
        assert_eq!(r.renewal_date, d("2024-02-15"));
        assert_eq!(r.owner_id, owner("o1"));
        assert_eq!(r.created_at, now);
        assert_eq!(r.updated_at, now);
        assert_eq!(gw.get(&owner("o1"), &r.id).unwrap(), r);
    }

    #[test]
    fn at_gateway_02_month_end_purchase_clamps_renewal() {
        let mut gw = gateway();
        let r = gw
            .create(
                &owner("o1"),
                form("Gym", "30", "2024-01-31", Frequency::Monthly),
                at("2024-01-31T00:00:00Z"),
            )
            .unwrap();
        assert_eq!(r.renewal_date, d("2024-02-29"));
    }

    #[test]
    fn at_gateway_03_inconsistent_dates_are_rejected_without_writes() {
        let mut gw = gateway();
        let mut f = form("Gym", "30", "2024-01-15", Frequency::Monthly);
        f.renewal_date = Some(d("2024-03-15"));
        let out = gw.create(&owner("o1"), f, at("2024-01-15T00:00:00Z"));
        assert!(matches!(out, Err(GatewayError::Validation(_))));
        assert_eq!(gw.backend_ref().document_count(SUBSCRIPTIONS_COLLECTION), 0);
    }

    #[test]
    fn at_gateway_04_list_is_owner_scoped_and_newest_first() {
        let mut gw = gateway();
        let t0 = at("2024-01-01T00:00:00Z");
        let a = gw
            .create(&owner("o1"), form("A", "1", "2024-01-01", Frequency::Weekly), t0)
            .unwrap();
        gw.create(
            &owner("o2"),
            form("B", "2", "2024-01-01", Frequency::Weekly),
            t0 + Duration::seconds(1),
        )
        .unwrap();
        let c = gw
            .create(
                &owner("o1"),
                form("C", "3", "2024-01-01", Frequency::Weekly),
                t0 + Duration::seconds(2),
            )
            .unwrap();
        let rows = gw.list_all(&owner("o1"));
        assert_eq!(rows, vec![c, a]);
        assert!(gw.list_all(&owner("nobody")).is_empty());
        assert_eq!(gw.fetch_all(&owner("nobody")), ListOutcome::Loaded(Vec::new()));
    }

    #[test]
    fn at_gateway_05_update_replaces_fields_and_bumps_updated_at() {
        let mut gw = gateway();
        let created = gw
            .create(
                &owner("o1"),
                form("Netflix", "15.49", "2024-01-15", Frequency::Monthly),
                at("2024-01-15T00:00:00Z"),
            )
            .unwrap();
        let mut f = form("Netflix 4K", "22.99", "2024-02-01", Frequency::Yearly);
        f.status = SubscriptionStatus::Paused;
        f.notes = Some("family plan".to_string());
        let updated = gw
            .update(&owner("o1"), &created.id, f, at("2024-02-01T12:00:00Z"))
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.updated_at, at("2024-02-01T12:00:00Z"));
        assert_eq!(updated.renewal_date, d("2025-02-01"));
        assert_eq!(updated.status, SubscriptionStatus::Paused);
        assert_eq!(gw.get(&owner("o1"), &created.id).unwrap(), updated);
    }

    #[test]
    fn at_gateway_06_update_never_moves_updated_at_before_created_at() {
        let mut gw = gateway();
        let created = gw
            .create(
                &owner("o1"),
                form("A", "1", "2024-01-15", Frequency::Monthly),
                at("2024-01-15T00:00:00Z"),
            )
            .unwrap();
        let updated = gw
            .update(
                &owner("o1"),
                &created.id,
                form("A", "2", "2024-01-15", Frequency::Monthly),
                at("2023-12-31T00:00:00Z"),
            )
            .unwrap();
        assert_eq!(updated.updated_at, created.created_at);
    }

    #[test]
    fn at_gateway_07_update_unknown_or_foreign_id_is_not_found_and_store_unchanged() {
        let mut gw = gateway();
        let created = gw
            .create(
                &owner("o1"),
                form("A", "1", "2024-01-15", Frequency::Monthly),
                at("2024-01-15T00:00:00Z"),
            )
            .unwrap();
        let before = gw.list_all(&owner("o1"));

        let missing = SubscriptionId::new("does_not_exist").unwrap();
        let out = gw.update(
            &owner("o1"),
            &missing,
            form("B", "2", "2024-01-15", Frequency::Monthly),
            at("2024-01-16T00:00:00Z"),
        );
        assert!(matches!(out, Err(GatewayError::NotFound { .. })));

        let foreign = gw.update(
            &owner("intruder"),
            &created.id,
            form("B", "2", "2024-01-15", Frequency::Monthly),
            at("2024-01-16T00:00:00Z"),
        );
        assert!(matches!(foreign, Err(GatewayError::NotFound { .. })));
        assert_eq!(gw.list_all(&owner("o1")), before);
    }

    #[test]
    fn at_gateway_08_delete_then_list_never_returns_record() {
        let mut gw = gateway();
        let r = gw
            .create(
                &owner("o1"),
                form("A", "1", "2024-01-15", Frequency::Monthly),
                at("2024-01-15T00:00:00Z"),
            )
            .unwrap();
        assert!(matches!(
            gw.delete(&owner("o2"), &r.id),
            Err(GatewayError::NotFound { .. })
        ));
        gw.delete(&owner("o1"), &r.id).unwrap();
        assert!(gw.list_all(&owner("o1")).iter().all(|x| x.id != r.id));
        assert!(matches!(
            gw.delete(&owner("o1"), &r.id),
            Err(GatewayError::NotFound { .. })
        ));
    }

    #[test]
    fn at_gateway_09_last_writer_wins() {
        let mut gw = gateway();
        let r = gw
            .create(
                &owner("o1"),
                form("A", "1", "2024-01-15", Frequency::Monthly),
                at("2024-01-15T00:00:00Z"),
            )
            .unwrap();
        // Two editors loaded the same record; both submit full overwrites.
        gw.update(
            &owner("o1"),
            &r.id,
            form("Editor one", "5", "2024-01-15", Frequency::Monthly),
            at("2024-01-16T00:00:00Z"),
        )
        .unwrap();
        gw.update(
            &owner("o1"),
            &r.id,
            form("Editor two", "7", "2024-01-15", Frequency::Quarterly),
            at("2024-01-16T00:00:01Z"),
        )
        .unwrap();
        let stored = gw.get(&owner("o1"), &r.id).unwrap();
        assert_eq!(stored.name, "Editor two");
        assert_eq!(stored.cost, Decimal::from(7));
        assert_eq!(stored.frequency, Frequency::Quarterly);
    }

    #[test]
    fn at_gateway_10_list_failure_is_empty_or_explicit() {
        let gw = SubscriptionGateway::new(UnreachableBackend);
        assert!(gw.list_all(&owner("o1")).is_empty());
        match gw.fetch_all(&owner("o1")) {
            ListOutcome::Failed { reason } => assert!(reason.contains("connection refused")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn at_gateway_11_mutation_backend_errors_propagate() {
        let mut gw = SubscriptionGateway::new(UnreachableBackend);
        let out = gw.create(
            &owner("o1"),
            form("A", "1", "2024-01-15", Frequency::Monthly),
            at("2024-01-15T00:00:00Z"),
        );
        assert!(matches!(out, Err(GatewayError::Backend(StorageError::Unavailable(_)))));
        let id = SubscriptionId::new("x").unwrap();
        assert!(matches!(
            gw.delete(&owner("o1"), &id),
            Err(GatewayError::Backend(_))
        ));
    }

    #[test]
    fn at_gateway_12_resolve_owner_requires_principal() {
        assert_eq!(
            SubscriptionGateway::<DocumentStore>::resolve_owner(None),
            Err(GatewayError::Auth)
        );
        assert_eq!(
            SubscriptionGateway::<DocumentStore>::resolve_owner(Some(owner("o1"))).unwrap(),
            owner("o1")
        );
    }

    #[test]
    fn at_gateway_13_malformed_document_is_skipped_in_lists_and_rejected_by_get() {
        let mut gw = gateway();
        let valid = gw
            .create(
                &owner("o1"),
                form("Netflix", "15.49", "2024-01-15", Frequency::Monthly),
                at("2024-01-15T00:00:00Z"),
            )
            .unwrap();
        let mut fields = DocumentFields::new();
        fields.insert("owner_id".to_string(), Value::from("o1"));
        fields.insert("created_at".to_string(), Value::from("2024-01-01T00:00:00Z"));
        let broken = gw
            .backend_mut()
            .insert(SUBSCRIPTIONS_COLLECTION, fields)
            .unwrap();

        assert_eq!(gw.try_list_all(&owner("o1")).unwrap(), vec![valid.clone()]);
        assert_eq!(gw.list_all(&owner("o1")), vec![valid.clone()]);
        assert_eq!(gw.fetch_all(&owner("o1")), ListOutcome::Loaded(vec![valid]));

        let broken_id = SubscriptionId::new(broken.as_str()).unwrap();
        assert!(matches!(
            gw.get(&owner("o1"), &broken_id),
            Err(GatewayError::Backend(StorageError::InvalidDocument(_)))
        ));
    }
}
