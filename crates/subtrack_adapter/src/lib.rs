#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use axum::http::StatusCode;
use chrono::{DateTime, Local, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use subtrack_engines::calendar::{
    days_until, derive_purchase_date, format_cost, format_display_date, format_iso_date,
    format_relative, parse_iso_date,
};
use subtrack_engines::ordering::{sort_subscriptions, SortDirection, SortField, SortState};
use subtrack_kernel_contracts::subscription::{
    Frequency, OwnerId, SubscriptionFormData, SubscriptionId, SubscriptionRecord,
    SubscriptionStatus,
};
use subtrack_kernel_contracts::ContractViolation;
use subtrack_os::auth::{mint_anonymous_principal, ANONYMOUS_PRINCIPAL_PREFIX};
use subtrack_os::gateway::{GatewayError, ListOutcome, SubscriptionGateway, SUBSCRIPTIONS_COLLECTION};
use subtrack_storage::document_store::DocumentStore;
use tracing::{info, warn};

pub mod observability;

pub const PRINCIPAL_HEADER: &str = "x-subtrack-principal";
pub const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_STORE_PATH: &str = ".subtrack/subscriptions.jsonl";

pub mod outcomes {
    pub const HEALTHY: &str = "HEALTHY";
    pub const SIGNED_IN: &str = "SIGNED_IN";
    pub const SIGNED_OUT: &str = "SIGNED_OUT";
    pub const LISTED: &str = "LISTED";
    pub const LIST_FAILED: &str = "LIST_FAILED";
    pub const FOUND: &str = "FOUND";
    pub const CREATED: &str = "CREATED";
    pub const UPDATED: &str = "UPDATED";
    pub const DELETED: &str = "DELETED";
    pub const REJECTED: &str = "REJECTED";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    pub bind: String,
    /// `None` keeps the store in memory only.
    pub store_path: Option<PathBuf>,
}

impl AdapterConfig {
    pub fn from_env() -> Self {
        Self::from_env_var_map(|key| env::var(key).ok())
    }

    pub fn from_env_var_map<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind = lookup("SUBTRACK_HTTP_BIND")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_HTTP_BIND.to_string());
        let store_path = parse_store_persist(lookup("SUBTRACK_STORE_PERSIST").as_deref()).then(|| {
            lookup("SUBTRACK_STORE_PATH")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH))
        });
        Self { bind, store_path }
    }
}

fn parse_store_persist(raw: Option<&str>) -> bool {
    match raw {
        Some(v) => !matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "0" | "false" | "off" | "no"
        ),
        None => true,
    }
}

/// Wall-clock instant and local calendar date for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestClock {
    pub now: DateTime<Utc>,
    pub today: NaiveDate,
}

impl RequestClock {
    pub fn system() -> Self {
        let now = Utc::now();
        Self {
            now,
            today: now.with_timezone(&Local).date_naive(),
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct AuthAdapterRequest {
    pub principal_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AuthAdapterResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub principal_id: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SubscriptionAdapterRequest {
    pub name: String,
    /// JSON number or decimal string.
    pub cost: Value,
    pub frequency: String,
    pub status: Option<String>,
    pub purchase_date: Option<String>,
    pub renewal_date: Option<String>,
    pub notes: Option<String>,
}

impl SubscriptionAdapterRequest {
    pub fn into_form(self) -> Result<SubscriptionFormData, ContractViolation> {
        let cost = parse_cost(&self.cost)?;
        let frequency = Frequency::parse_field(&self.frequency, "subscription_form.frequency")?;
        let status = match self.status.as_deref() {
            Some(raw) => SubscriptionStatus::parse_field(raw, "subscription_form.status")?,
            None => SubscriptionStatus::Active,
        };
        let purchase_date = optional_date(self.purchase_date, "subscription_form.purchase_date")?;
        let renewal_date = optional_date(self.renewal_date, "subscription_form.renewal_date")?;
        SubscriptionFormData::v1(
            self.name,
            cost,
            frequency,
            status,
            purchase_date,
            renewal_date,
            self.notes,
        )
    }
}

fn optional_date(
    raw: Option<String>,
    field: &'static str,
) -> Result<Option<NaiveDate>, ContractViolation> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => parse_iso_date(v, field).map(Some),
    }
}

fn parse_cost(raw: &Value) -> Result<Decimal, ContractViolation> {
    let invalid = ContractViolation::InvalidValue {
        field: "subscription_form.cost",
        reason: "must be a decimal number",
    };
    let text = match raw {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return Err(invalid),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| invalid)
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SubscriptionView {
    pub id: String,
    pub name: String,
    pub cost: String,
    pub cost_display: String,
    pub frequency: String,
    pub status: String,
    pub purchase_date: Option<String>,
    pub purchase_date_display: Option<String>,
    pub renewal_date: String,
    pub renewal_date_display: String,
    pub days_until_renewal: i64,
    pub renewal_label: String,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl SubscriptionView {
    pub fn from_record(record: &SubscriptionRecord, today: NaiveDate) -> Self {
        let purchase = derive_purchase_date(record).ok();
        let days = days_until(record.renewal_date, today);
        Self {
            id: record.id.as_str().to_string(),
            name: record.name.clone(),
            cost: record.cost.to_string(),
            cost_display: format_cost(record.cost),
            frequency: record.frequency.as_str().to_string(),
            status: record.status.as_str().to_string(),
            purchase_date: purchase.map(format_iso_date),
            purchase_date_display: purchase.map(format_display_date),
            renewal_date: format_iso_date(record.renewal_date),
            renewal_date_display: format_display_date(record.renewal_date),
            days_until_renewal: days,
            renewal_label: format_relative(days),
            notes: record.notes.clone(),
            created_at: record.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            updated_at: record.updated_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SubscriptionAdapterResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub subscription: Option<SubscriptionView>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SubscriptionListQuery {
    pub sort: Option<String>,
    pub direction: Option<String>,
}

impl SubscriptionListQuery {
    pub fn sort_state(&self) -> Result<Option<SortState>, String> {
        let Some(raw_field) = self.sort.as_deref() else {
            return Ok(None);
        };
        let field = SortField::parse(raw_field)
            .ok_or_else(|| format!("unknown sort field '{raw_field}'. allowed: cost, renewal_date"))?;
        let direction = match self.direction.as_deref() {
            None => SortDirection::Asc,
            Some(raw) => SortDirection::parse(raw)
                .ok_or_else(|| format!("unknown sort direction '{raw}'. allowed: asc, desc"))?,
        };
        Ok(Some(SortState::new(field, direction)))
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SubscriptionListResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub sort: Option<String>,
    pub direction: Option<String>,
    pub subscriptions: Vec<SubscriptionView>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdapterHealthResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub journal_path: Option<String>,
    pub active_principals: usize,
    pub stored_subscriptions: usize,
}

pub fn gateway_error_status(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
        GatewayError::Auth => StatusCode::UNAUTHORIZED,
        GatewayError::NotFound { .. } => StatusCode::NOT_FOUND,
        GatewayError::Backend(_) => StatusCode::BAD_GATEWAY,
    }
}

fn rejected_subscription(err: &GatewayError) -> (StatusCode, SubscriptionAdapterResponse) {
    (
        gateway_error_status(err),
        SubscriptionAdapterResponse {
            status: "error".to_string(),
            outcome: outcomes::REJECTED.to_string(),
            reason: Some(format!("{}: {}", err.kind(), err)),
            subscription: None,
        },
    )
}

/// Envelope for a request body the HTTP layer could not decode, so a bad
/// body gets the same `status/outcome/reason` shape as any other rejection.
pub fn malformed_request_subscription(reason: impl Into<String>) -> (StatusCode, SubscriptionAdapterResponse) {
    (
        StatusCode::BAD_REQUEST,
        SubscriptionAdapterResponse {
            status: "error".to_string(),
            outcome: outcomes::REJECTED.to_string(),
            reason: Some(format!("malformed request body: {}", reason.into())),
            subscription: None,
        },
    )
}

/// Auth counterpart of [`malformed_request_subscription`].
pub fn malformed_request_auth(reason: impl Into<String>) -> (StatusCode, AuthAdapterResponse) {
    (
        StatusCode::BAD_REQUEST,
        AuthAdapterResponse {
            status: "error".to_string(),
            outcome: outcomes::REJECTED.to_string(),
            reason: Some(format!("malformed request body: {}", reason.into())),
            principal_id: None,
        },
    )
}

fn rejected_list(status: StatusCode, outcome: &str, reason: String) -> (StatusCode, SubscriptionListResponse) {
    (
        status,
        SubscriptionListResponse {
            status: "error".to_string(),
            outcome: outcome.to_string(),
            reason: Some(reason),
            sort: None,
            direction: None,
            subscriptions: Vec::new(),
        },
    )
}

/// Principals issued by this adapter. A request is only served for a
/// principal that is currently signed in.
#[derive(Debug, Clone, Default)]
pub struct PrincipalRegistry {
    active: BTreeSet<OwnerId>,
}

impl PrincipalRegistry {
    /// Resumes `resume` when given, otherwise mints a fresh anonymous principal.
    pub fn sign_in_anonymously(&mut self, resume: Option<&str>) -> Result<OwnerId, ContractViolation> {
        let principal = match resume.map(str::trim).filter(|v| !v.is_empty()) {
            Some(raw) => {
                if !raw.starts_with(ANONYMOUS_PRINCIPAL_PREFIX) {
                    return Err(ContractViolation::InvalidValue {
                        field: "auth.principal_id",
                        reason: "must be an anonymous principal id",
                    });
                }
                OwnerId::new(raw)?
            }
            None => mint_anonymous_principal()?,
        };
        self.active.insert(principal.clone());
        Ok(principal)
    }

    pub fn sign_out(&mut self, principal: &OwnerId) -> bool {
        self.active.remove(principal)
    }

    pub fn resolve(&self, header: Option<&str>) -> Option<OwnerId> {
        let raw = header?.trim();
        let principal = OwnerId::new(raw).ok()?;
        self.active.contains(&principal).then_some(principal)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

#[derive(Debug)]
pub struct AdapterRuntime {
    gateway: SubscriptionGateway<DocumentStore>,
    principals: PrincipalRegistry,
}

impl Default for AdapterRuntime {
    fn default() -> Self {
        Self::new_in_memory()
    }
}

impl AdapterRuntime {
    pub fn new_in_memory() -> Self {
        Self::new_with_store(DocumentStore::new_in_memory())
    }

    pub fn new_with_store(store: DocumentStore) -> Self {
        Self {
            gateway: SubscriptionGateway::new(store),
            principals: PrincipalRegistry::default(),
        }
    }

    pub fn from_config(config: &AdapterConfig) -> Result<Self, String> {
        let store = match config.store_path.as_ref() {
            Some(path) => DocumentStore::open_with_journal(path.clone())
                .map_err(|err| format!("failed to open subscription store: {err}"))?,
            None => DocumentStore::new_in_memory(),
        };
        info!(
            journal = ?store.journal_path(),
            documents = store.document_count(SUBSCRIPTIONS_COLLECTION),
            "subscription store ready"
        );
        Ok(Self::new_with_store(store))
    }

    pub fn default_from_env() -> Result<Self, String> {
        Self::from_config(&AdapterConfig::from_env())
    }

    pub fn health_report(&self) -> AdapterHealthResponse {
        let store = self.gateway.backend_ref();
        AdapterHealthResponse {
            status: "ok".to_string(),
            outcome: outcomes::HEALTHY.to_string(),
            reason: None,
            journal_path: store.journal_path().map(|p| p.display().to_string()),
            active_principals: self.principals.len(),
            stored_subscriptions: store.document_count(SUBSCRIPTIONS_COLLECTION),
        }
    }

    pub fn sign_in_anonymously(
        &mut self,
        request: AuthAdapterRequest,
    ) -> (StatusCode, AuthAdapterResponse) {
        match self
            .principals
            .sign_in_anonymously(request.principal_id.as_deref())
        {
            Ok(principal) => {
                info!(principal = principal.as_str(), "principal signed in");
                (
                    StatusCode::OK,
                    AuthAdapterResponse {
                        status: "ok".to_string(),
                        outcome: outcomes::SIGNED_IN.to_string(),
                        reason: None,
                        principal_id: Some(principal.as_str().to_string()),
                    },
                )
            }
            Err(violation) => (
                StatusCode::BAD_REQUEST,
                AuthAdapterResponse {
                    status: "error".to_string(),
                    outcome: outcomes::REJECTED.to_string(),
                    reason: Some(violation.to_string()),
                    principal_id: None,
                },
            ),
        }
    }

    pub fn sign_out(&mut self, principal_header: Option<&str>) -> (StatusCode, AuthAdapterResponse) {
        let Some(principal) = self.principals.resolve(principal_header) else {
            return (
                StatusCode::UNAUTHORIZED,
                AuthAdapterResponse {
                    status: "error".to_string(),
                    outcome: outcomes::REJECTED.to_string(),
                    reason: Some(GatewayError::Auth.to_string()),
                    principal_id: None,
                },
            );
        };
        self.principals.sign_out(&principal);
        info!(principal = principal.as_str(), "principal signed out");
        (
            StatusCode::OK,
            AuthAdapterResponse {
                status: "ok".to_string(),
                outcome: outcomes::SIGNED_OUT.to_string(),
                reason: None,
                principal_id: Some(principal.as_str().to_string()),
            },
        )
    }

    fn resolve_owner(&self, principal_header: Option<&str>) -> Result<OwnerId, GatewayError> {
        let resolved = self.principals.resolve(principal_header);
        if resolved.is_none() {
            warn!(has_header = principal_header.is_some(), "request without an active principal");
        }
        SubscriptionGateway::<DocumentStore>::resolve_owner(resolved)
    }

    pub fn list_subscriptions(
        &self,
        principal_header: Option<&str>,
        query: &SubscriptionListQuery,
        clock: RequestClock,
    ) -> (StatusCode, SubscriptionListResponse) {
        let owner = match self.resolve_owner(principal_header) {
            Ok(owner) => owner,
            Err(err) => {
                return rejected_list(gateway_error_status(&err), outcomes::REJECTED, err.to_string())
            }
        };
        let sort = match query.sort_state() {
            Ok(sort) => sort,
            Err(reason) => return rejected_list(StatusCode::BAD_REQUEST, outcomes::REJECTED, reason),
        };
        let mut rows = match self.gateway.fetch_all(&owner) {
            ListOutcome::Loaded(rows) => rows,
            ListOutcome::Failed { reason } => {
                return rejected_list(StatusCode::BAD_GATEWAY, outcomes::LIST_FAILED, reason)
            }
        };
        sort_subscriptions(&mut rows, sort, clock.today);
        (
            StatusCode::OK,
            SubscriptionListResponse {
                status: "ok".to_string(),
                outcome: outcomes::LISTED.to_string(),
                reason: None,
                sort: sort.map(|s| s.field.as_str().to_string()),
                direction: sort.map(|s| s.direction.as_str().to_string()),
                subscriptions: rows
                    .iter()
                    .map(|r| SubscriptionView::from_record(r, clock.today))
                    .collect(),
            },
        )
    }

    pub fn get_subscription(
        &self,
        principal_header: Option<&str>,
        id: &str,
        clock: RequestClock,
    ) -> (StatusCode, SubscriptionAdapterResponse) {
        let out = self
            .resolve_owner(principal_header)
            .and_then(|owner| self.gateway.get(&owner, &path_id(id)?));
        respond(out, outcomes::FOUND, StatusCode::OK, clock)
    }

    pub fn create_subscription(
        &mut self,
        principal_header: Option<&str>,
        request: SubscriptionAdapterRequest,
        clock: RequestClock,
    ) -> (StatusCode, SubscriptionAdapterResponse) {
        let out = self.resolve_owner(principal_header).and_then(|owner| {
            let form = request.into_form()?;
            self.gateway.create(&owner, form, clock.now)
        });
        respond(out, outcomes::CREATED, StatusCode::CREATED, clock)
    }

    pub fn update_subscription(
        &mut self,
        principal_header: Option<&str>,
        id: &str,
        request: SubscriptionAdapterRequest,
        clock: RequestClock,
    ) -> (StatusCode, SubscriptionAdapterResponse) {
        let out = self.resolve_owner(principal_header).and_then(|owner| {
            let id = path_id(id)?;
            let form = request.into_form()?;
            self.gateway.update(&owner, &id, form, clock.now)
        });
        respond(out, outcomes::UPDATED, StatusCode::OK, clock)
    }

    pub fn delete_subscription(
        &mut self,
        principal_header: Option<&str>,
        id: &str,
    ) -> (StatusCode, SubscriptionAdapterResponse) {
        let out = self
            .resolve_owner(principal_header)
            .and_then(|owner| self.gateway.delete(&owner, &path_id(id)?));
        match out {
            Ok(()) => (
                StatusCode::OK,
                SubscriptionAdapterResponse {
                    status: "ok".to_string(),
                    outcome: outcomes::DELETED.to_string(),
                    reason: None,
                    subscription: None,
                },
            ),
            Err(err) => rejected_subscription(&err),
        }
    }
}

fn path_id(raw: &str) -> Result<SubscriptionId, GatewayError> {
    SubscriptionId::new(raw).map_err(|_| GatewayError::NotFound {
        id: raw.to_string(),
    })
}

fn respond(
    out: Result<SubscriptionRecord, GatewayError>,
    outcome: &str,
    status: StatusCode,
    clock: RequestClock,
) -> (StatusCode, SubscriptionAdapterResponse) {
    match out {
        Ok(record) => (
            status,
            SubscriptionAdapterResponse {
                status: "ok".to_string(),
                outcome: outcome.to_string(),
                reason: None,
                subscription: Some(SubscriptionView::from_record(&record, clock.today)),
            },
        ),
        Err(err) => rejected_subscription(&err),
    }
}
