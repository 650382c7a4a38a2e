#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use subtrack_engines::calendar::{
    days_until, derive_purchase_date, format_cost, format_display_date, format_relative,
};
use subtrack_engines::ordering::{sort_subscriptions, SortField, SortState};
use subtrack_kernel_contracts::subscription::{
    OwnerId, SubscriptionFormData, SubscriptionId, SubscriptionRecord,
};
use subtrack_storage::repo::DocumentBackend;

use crate::auth::{AuthContext, ListenerId};
use crate::gateway::{GatewayError, ListOutcome, SubscriptionGateway};

pub mod banners {
    pub const LOAD_FAILED: &str = "Failed to load subscriptions";
    pub const CREATE_FAILED: &str = "Failed to create subscription";
    pub const UPDATE_FAILED: &str = "Failed to update subscription";
    pub const DELETE_FAILED: &str = "Failed to delete subscription";
    pub const SIGN_IN_REQUIRED: &str = "Sign in to manage subscriptions";
}

/// One display row of the subscription table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRow {
    pub id: String,
    pub name: String,
    pub notes: Option<String>,
    pub purchase_date: String,
    pub renewal_label: String,
    pub days_until_renewal: i64,
    pub cost: String,
    pub frequency: &'static str,
    pub status: &'static str,
}

impl SubscriptionRow {
    pub fn from_record(record: &SubscriptionRecord, today: NaiveDate) -> Self {
        let days = days_until(record.renewal_date, today);
        Self {
            id: record.id.as_str().to_string(),
            name: record.name.clone(),
            notes: record.notes.clone(),
            purchase_date: derive_purchase_date(record)
                .map(format_display_date)
                .unwrap_or_else(|_| "-".to_string()),
            renewal_label: format_relative(days),
            days_until_renewal: days,
            cost: format_cost(record.cost),
            frequency: record.frequency.as_str(),
            status: record.status.as_str(),
        }
    }
}

/// Presentation state for one signed-in surface: the loaded list, the loading
/// flag, a single dismissible error banner and the active sort.
///
/// Every mutation is followed by a full reload; the list is replaced, never
/// patched. Mutating methods take `&mut self`, so one board never has two
/// operations in flight.
///
/// The board listens to its [`AuthContext`] for as long as it lives. Records
/// are only visible while the principal they were loaded for is still the
/// current one; [`SubscriptionBoard::sync_principal`] reloads after a change.
#[derive(Debug)]
pub struct SubscriptionBoard<B>
where
    B: DocumentBackend,
{
    gateway: SubscriptionGateway<B>,
    auth: AuthContext,
    subscriptions: Vec<SubscriptionRecord>,
    is_loading: bool,
    error: Option<String>,
    sort: Option<SortState>,
    loaded_for: Option<OwnerId>,
    principal_changed: Arc<AtomicBool>,
    listener: ListenerId,
}

impl<B> SubscriptionBoard<B>
where
    B: DocumentBackend,
{
    pub fn new(gateway: SubscriptionGateway<B>, auth: AuthContext) -> Self {
        let principal_changed = Arc::new(AtomicBool::new(false));
        let flag = principal_changed.clone();
        let listener = auth.on_principal_changed(move |_| flag.store(true, Ordering::SeqCst));
        Self {
            gateway,
            auth,
            subscriptions: Vec::new(),
            is_loading: true,
            error: None,
            sort: None,
            loaded_for: None,
            principal_changed,
            listener,
        }
    }

    /// Records loaded for the current principal; empty once that principal
    /// signs out or another one signs in.
    pub fn subscriptions(&self) -> &[SubscriptionRecord] {
        if self.loaded_for.is_some() && self.loaded_for == self.auth.current_principal() {
            &self.subscriptions
        } else {
            &[]
        }
    }

    /// True when the auth context reported a change not yet applied.
    pub fn needs_reload(&self) -> bool {
        self.principal_changed.load(Ordering::SeqCst)
    }

    /// Applies a pending principal change: the list is dropped and, for a
    /// signed-in principal, fetched again. Returns whether a change was pending.
    pub fn sync_principal(&mut self) -> bool {
        if !self.principal_changed.load(Ordering::SeqCst) {
            return false;
        }
        if self.auth.current_principal() != self.loaded_for {
            self.subscriptions = Vec::new();
            self.loaded_for = None;
        }
        self.reload();
        true
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    pub fn sort_state(&self) -> Option<SortState> {
        self.sort
    }

    pub fn gateway_ref(&self) -> &SubscriptionGateway<B> {
        &self.gateway
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    fn principal(&mut self) -> Result<OwnerId, GatewayError> {
        SubscriptionGateway::<B>::resolve_owner(self.auth.current_principal()).inspect_err(|_| {
            self.error = Some(banners::SIGN_IN_REQUIRED.to_string());
        })
    }

    /// Replaces the in-memory list with a fresh fetch. Returns whether the fetch succeeded.
    pub fn reload(&mut self) -> bool {
        self.is_loading = true;
        self.principal_changed.store(false, Ordering::SeqCst);
        let owner = match self.principal() {
            Ok(owner) => owner,
            Err(_) => {
                self.subscriptions = Vec::new();
                self.loaded_for = None;
                self.is_loading = false;
                return false;
            }
        };
        let ok = match self.gateway.fetch_all(&owner) {
            ListOutcome::Loaded(rows) => {
                self.subscriptions = rows;
                self.loaded_for = Some(owner);
                self.error = None;
                true
            }
            ListOutcome::Failed { .. } => {
                if self.loaded_for.as_ref() != Some(&owner) {
                    self.subscriptions = Vec::new();
                    self.loaded_for = None;
                }
                self.error = Some(banners::LOAD_FAILED.to_string());
                false
            }
        };
        self.is_loading = false;
        ok
    }

    fn after_mutation<T>(
        &mut self,
        out: Result<T, GatewayError>,
        failure_banner: &'static str,
    ) -> Result<T, GatewayError> {
        match out {
            Ok(value) => {
                self.reload();
                if self.error.as_deref() != Some(banners::LOAD_FAILED) {
                    self.error = None;
                }
                Ok(value)
            }
            Err(err) => {
                self.error = Some(match &err {
                    GatewayError::Validation(v) => v.to_string(),
                    GatewayError::Auth => banners::SIGN_IN_REQUIRED.to_string(),
                    GatewayError::NotFound { .. } | GatewayError::Backend(_) => {
                        failure_banner.to_string()
                    }
                });
                self.is_loading = false;
                Err(err)
            }
        }
    }

    pub fn create(
        &mut self,
        form: SubscriptionFormData,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionRecord, GatewayError> {
        self.is_loading = true;
        let out = self
            .principal()
            .and_then(|owner| self.gateway.create(&owner, form, now));
        self.after_mutation(out, banners::CREATE_FAILED)
    }

    pub fn update(
        &mut self,
        id: &SubscriptionId,
        form: SubscriptionFormData,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionRecord, GatewayError> {
        self.is_loading = true;
        let out = self
            .principal()
            .and_then(|owner| self.gateway.update(&owner, id, form, now));
        self.after_mutation(out, banners::UPDATE_FAILED)
    }

    pub fn delete(&mut self, id: &SubscriptionId) -> Result<(), GatewayError> {
        self.is_loading = true;
        let out = self
            .principal()
            .and_then(|owner| self.gateway.delete(&owner, id));
        self.after_mutation(out, banners::DELETE_FAILED)
    }

    pub fn toggle_sort(&mut self, field: SortField) -> SortState {
        let next = SortState::toggled(self.sort, field);
        self.sort = Some(next);
        next
    }

    pub fn clear_sort(&mut self) {
        self.sort = None;
    }

    pub fn sorted(&self, today: NaiveDate) -> Vec<SubscriptionRecord> {
        let mut rows = self.subscriptions().to_vec();
        sort_subscriptions(&mut rows, self.sort, today);
        rows
    }

    pub fn rows(&self, today: NaiveDate) -> Vec<SubscriptionRow> {
        self.sorted(today)
            .iter()
            .map(|r| SubscriptionRow::from_record(r, today))
            .collect()
    }
}

impl<B> Drop for SubscriptionBoard<B>
where
    B: DocumentBackend,
{
    fn drop(&mut self) {
        self.auth.unsubscribe(self.listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::SUBSCRIPTIONS_COLLECTION;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use subtrack_engines::ordering::SortDirection;
    use subtrack_kernel_contracts::subscription::{Frequency, SubscriptionStatus};
    use subtrack_storage::document_store::{
        DocumentFields, DocumentFilter, DocumentId, DocumentStore, OrderBy, StorageError,
        StoredDocument,
    };

    fn d(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
    }

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    fn form(name: &str, cost: &str, renewal: &str) -> SubscriptionFormData {
        SubscriptionFormData::v1(
            name,
            Decimal::from_str(cost).unwrap(),
            Frequency::Monthly,
            SubscriptionStatus::Active,
            None,
            Some(d(renewal)),
            Some(format!("{name} notes")),
        )
        .unwrap()
    }

    fn signed_in_board() -> SubscriptionBoard<DocumentStore> {
        SubscriptionBoard::new(
            SubscriptionGateway::new(DocumentStore::new_in_memory()),
            AuthContext::with_principal(OwnerId::new("board_user").unwrap()),
        )
    }

    /// In-memory store whose list calls can be switched off.
    #[derive(Debug, Default)]
    struct FlakyStore {
        inner: DocumentStore,
        list_down: bool,
    }

    impl DocumentBackend for FlakyStore {
        fn list(
            &self,
            c: &str,
            f: &DocumentFilter,
            o: Option<&OrderBy>,
        ) -> Result<Vec<StoredDocument>, StorageError> {
            if self.list_down {
                return Err(StorageError::Unavailable("timeout".to_string()));
            }
            self.inner.list(c, f, o)
        }
        fn get(&self, c: &str, id: &DocumentId) -> Result<Option<StoredDocument>, StorageError> {
            self.inner.get(c, id)
        }
        fn insert(&mut self, c: &str, f: DocumentFields) -> Result<DocumentId, StorageError> {
            self.inner.insert(c, f)
        }
        fn replace(
            &mut self,
            c: &str,
            id: &DocumentId,
            f: DocumentFields,
        ) -> Result<(), StorageError> {
            self.inner.replace(c, id, f)
        }
        fn remove(&mut self, c: &str, id: &DocumentId) -> Result<(), StorageError> {
            self.inner.remove(c, id)
        }
    }

    #[test]
    fn at_board_01_starts_loading_and_reload_clears_flag() {
        let mut board = signed_in_board();
        assert!(board.is_loading());
        assert!(board.reload());
        assert!(!board.is_loading());
        assert!(board.subscriptions().is_empty());
        assert_eq!(board.error(), None);
    }

    #[test]
    fn at_board_02_mutations_reload_full_list() {
        let mut board = signed_in_board();
        let a = board
            .create(form("A", "5", "2024-06-20"), at("2024-06-01T00:00:00Z"))
            .unwrap();
        board
            .create(form("B", "3", "2024-06-12"), at("2024-06-02T00:00:00Z"))
            .unwrap();
        assert_eq!(board.subscriptions().len(), 2);
        assert_eq!(board.subscriptions()[0].name, "B");

        board
            .update(&a.id, form("A+", "6", "2024-06-20"), at("2024-06-03T00:00:00Z"))
            .unwrap();
        assert_eq!(board.subscriptions()[1].name, "A+");

        board.delete(&a.id).unwrap();
        assert_eq!(board.subscriptions().len(), 1);
        assert!(board.subscriptions().iter().all(|r| r.id != a.id));
        assert!(!board.is_loading());
    }

    #[test]
    fn at_board_03_signed_out_surfaces_sign_in_prompt() {
        let mut board = SubscriptionBoard::new(
            SubscriptionGateway::new(DocumentStore::new_in_memory()),
            AuthContext::new(),
        );
        assert!(!board.reload());
        assert_eq!(board.error(), Some(banners::SIGN_IN_REQUIRED));
        let out = board.create(form("A", "5", "2024-06-20"), at("2024-06-01T00:00:00Z"));
        assert_eq!(out, Err(GatewayError::Auth));
        assert_eq!(
            board
                .gateway_ref()
                .backend_ref()
                .document_count(SUBSCRIPTIONS_COLLECTION),
            0
        );
        board.dismiss_error();
        assert_eq!(board.error(), None);
    }

    #[test]
    fn at_board_04_failures_set_generic_banners() {
        let mut board = signed_in_board();
        let missing = SubscriptionId::new("missing").unwrap();
        assert!(board.delete(&missing).is_err());
        assert_eq!(board.error(), Some(banners::DELETE_FAILED));
        assert!(board
            .update(&missing, form("A", "1", "2024-06-20"), at("2024-06-01T00:00:00Z"))
            .is_err());
        assert_eq!(board.error(), Some(banners::UPDATE_FAILED));

        // a successful mutation clears the banner
        board
            .create(form("A", "1", "2024-06-20"), at("2024-06-01T00:00:00Z"))
            .unwrap();
        assert_eq!(board.error(), None);
    }

    #[test]
    fn at_board_05_validation_error_shows_its_message() {
        let mut board = signed_in_board();
        let mut bad = form("A", "1", "2024-06-20");
        bad.name = String::new();
        assert!(matches!(
            board.create(bad, at("2024-06-01T00:00:00Z")),
            Err(GatewayError::Validation(_))
        ));
        assert_eq!(board.error(), Some("subscription_form.name must not be empty"));
    }

    #[test]
    fn at_board_06_list_failure_is_distinguishable_from_empty() {
        let mut board = SubscriptionBoard::new(
            SubscriptionGateway::new(FlakyStore {
                list_down: true,
                ..FlakyStore::default()
            }),
            AuthContext::with_principal(OwnerId::new("board_user").unwrap()),
        );
        assert!(!board.reload());
        assert_eq!(board.error(), Some(banners::LOAD_FAILED));
    }

    #[test]
    fn at_board_07_rows_follow_sort_toggles() {
        let mut board = signed_in_board();
        board
            .create(form("A", "5", "2024-06-20"), at("2024-06-01T00:00:00Z"))
            .unwrap();
        board
            .create(form("B", "3", "2024-06-08"), at("2024-06-02T00:00:00Z"))
            .unwrap();
        board
            .create(form("C", "9", "2024-06-10"), at("2024-06-03T00:00:00Z"))
            .unwrap();
        let today = d("2024-06-10");
        let names = |b: &SubscriptionBoard<DocumentStore>| -> Vec<String> {
            b.rows(today).into_iter().map(|r| r.name).collect()
        };
        assert_eq!(names(&board), vec!["C", "B", "A"]);

        assert_eq!(
            board.toggle_sort(SortField::Cost),
            SortState::new(SortField::Cost, SortDirection::Asc)
        );
        assert_eq!(names(&board), vec!["B", "A", "C"]);
        board.toggle_sort(SortField::Cost);
        assert_eq!(names(&board), vec!["C", "A", "B"]);
        board.toggle_sort(SortField::RenewalDate);
        assert_eq!(names(&board), vec!["B", "C", "A"]);
        board.clear_sort();
        assert_eq!(board.sort_state(), None);
    }

    #[test]
    fn at_board_08_row_formats_display_fields() {
        let mut board = signed_in_board();
        board
            .create(form("Netflix", "15.5", "2024-02-15"), at("2024-01-15T00:00:00Z"))
            .unwrap();
        let rows = board.rows(d("2024-02-14"));
        let row = &rows[0];
        assert_eq!(row.purchase_date, "15/01/2024");
        assert_eq!(row.renewal_label, "Tomorrow");
        assert_eq!(row.days_until_renewal, 1);
        assert_eq!(row.cost, "$15.50");
        assert_eq!(row.frequency, "Monthly");
        assert_eq!(row.status, "Active");
        assert_eq!(row.notes.as_deref(), Some("Netflix notes"));
    }

    #[test]
    fn at_board_09_principal_changes_hide_and_reload_records() {
        let auth = AuthContext::with_principal(OwnerId::new("owner_a").unwrap());
        let mut board = SubscriptionBoard::new(
            SubscriptionGateway::new(DocumentStore::new_in_memory()),
            auth.clone(),
        );
        board
            .create(form("Private", "5", "2024-06-20"), at("2024-06-01T00:00:00Z"))
            .unwrap();
        assert_eq!(board.rows(d("2024-06-10")).len(), 1);
        assert!(!board.needs_reload());

        auth.sign_out();
        assert!(board.needs_reload());
        assert!(board.subscriptions().is_empty());
        assert!(board.rows(d("2024-06-10")).is_empty());
        assert!(board.sync_principal());
        assert!(!board.needs_reload());
        assert_eq!(board.error(), Some(banners::SIGN_IN_REQUIRED));

        auth.sign_in(OwnerId::new("owner_b").unwrap());
        assert!(board.needs_reload());
        assert!(board.subscriptions().is_empty());
        assert!(board.sync_principal());
        assert!(board.subscriptions().is_empty());
        assert_eq!(board.error(), None);

        auth.sign_in(OwnerId::new("owner_a").unwrap());
        assert!(board.subscriptions().is_empty());
        assert!(board.sync_principal());
        assert_eq!(board.subscriptions()[0].name, "Private");
        assert!(!board.sync_principal());
    }

    #[test]
    fn at_board_10_dropping_board_unsubscribes_from_auth() {
        let auth = AuthContext::new();
        let board = SubscriptionBoard::new(
            SubscriptionGateway::new(DocumentStore::new_in_memory()),
            auth.clone(),
        );
        assert_eq!(auth.listener_count(), 1);
        drop(board);
        assert_eq!(auth.listener_count(), 0);
    }
}
