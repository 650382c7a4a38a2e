#![forbid(unsafe_code)]

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::{ContractViolation, SchemaVersion, Validate};

pub const SUBSCRIPTION_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const NAME_MAX_CHARS: usize = 200;
pub const NOTES_MAX_CHARS: usize = 4096;
pub const ID_MAX_CHARS: usize = 128;

fn validate_token(
    raw: &str,
    field: &'static str,
) -> Result<(), ContractViolation> {
    if raw.trim().is_empty() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not be empty",
        });
    }
    if raw.len() > ID_MAX_CHARS {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must be <= 128 chars",
        });
    }
    if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not contain whitespace or control characters",
        });
    }
    Ok(())
}

/// Identifier of the authenticated principal that owns a set of records.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(raw: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = Self(raw.into());
        id.validate()?;
        Ok(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for OwnerId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_token(&self.0, "owner_id")
    }
}

/// Store-assigned opaque record identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn new(raw: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = Self(raw.into());
        id.validate()?;
        Ok(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for SubscriptionId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_token(&self.0, "subscription_id")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Frequency {
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "Weekly",
            Self::Monthly => "Monthly",
            Self::Quarterly => "Quarterly",
            Self::Yearly => "Yearly",
        }
    }

    pub const fn all() -> &'static [Self] {
        &[Self::Weekly, Self::Monthly, Self::Quarterly, Self::Yearly]
    }

    pub const fn allowed_names() -> &'static [&'static str] {
        &["Weekly", "Monthly", "Quarterly", "Yearly"]
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            "quarterly" => Some(Self::Quarterly),
            "yearly" => Some(Self::Yearly),
            _ => None,
        }
    }

    pub fn parse_field(raw: &str, field: &'static str) -> Result<Self, ContractViolation> {
        Self::parse(raw).ok_or_else(|| ContractViolation::UnknownVariant {
            field,
            got: raw.to_string(),
            allowed: Self::allowed_names(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Paused,
}

impl SubscriptionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Cancelled => "Cancelled",
            Self::Paused => "Paused",
        }
    }

    pub const fn all() -> &'static [Self] {
        &[Self::Active, Self::Cancelled, Self::Paused]
    }

    pub const fn allowed_names() -> &'static [&'static str] {
        &["Active", "Cancelled", "Paused"]
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "active" => Some(Self::Active),
            "cancelled" => Some(Self::Cancelled),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }

    pub fn parse_field(raw: &str, field: &'static str) -> Result<Self, ContractViolation> {
        Self::parse(raw).ok_or_else(|| ContractViolation::UnknownVariant {
            field,
            got: raw.to_string(),
            allowed: Self::allowed_names(),
        })
    }
}

fn validate_name(name: &str, field: &'static str) -> Result<(), ContractViolation> {
    if name.trim().is_empty() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not be empty",
        });
    }
    if name.chars().count() > NAME_MAX_CHARS {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must be <= 200 chars",
        });
    }
    Ok(())
}

fn validate_cost(cost: Decimal, field: &'static str) -> Result<(), ContractViolation> {
    if cost < Decimal::ZERO {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must be >= 0",
        });
    }
    Ok(())
}

fn validate_notes(notes: Option<&str>, field: &'static str) -> Result<(), ContractViolation> {
    if let Some(n) = notes {
        if n.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field,
                reason: "must not be blank when provided",
            });
        }
        if n.chars().count() > NOTES_MAX_CHARS {
            return Err(ContractViolation::InvalidValue {
                field,
                reason: "must be <= 4096 chars",
            });
        }
    }
    Ok(())
}

/// User-entered subscription fields. At least one of `purchase_date` and
/// `renewal_date` is present; the other is resolved by the calendar engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionFormData {
    pub name: String,
    pub cost: Decimal,
    pub frequency: Frequency,
    pub status: SubscriptionStatus,
    pub purchase_date: Option<NaiveDate>,
    pub renewal_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl SubscriptionFormData {
    /// Builds a normalized form: the name is trimmed and blank notes collapse to `None`.
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        name: impl Into<String>,
        cost: Decimal,
        frequency: Frequency,
        status: SubscriptionStatus,
        purchase_date: Option<NaiveDate>,
        renewal_date: Option<NaiveDate>,
        notes: Option<String>,
    ) -> Result<Self, ContractViolation> {
        let form = Self {
            name: name.into().trim().to_string(),
            cost,
            frequency,
            status,
            purchase_date,
            renewal_date,
            notes: notes
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        };
        form.validate()?;
        Ok(form)
    }
}

impl Validate for SubscriptionFormData {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_name(&self.name, "subscription_form.name")?;
        validate_cost(self.cost, "subscription_form.cost")?;
        validate_notes(self.notes.as_deref(), "subscription_form.notes")?;
        if self.purchase_date.is_none() && self.renewal_date.is_none() {
            return Err(ContractViolation::InvalidValue {
                field: "subscription_form.purchase_date",
                reason: "purchase_date or renewal_date is required",
            });
        }
        Ok(())
    }
}

/// Persisted subscription. `renewal_date` is authoritative; the purchase date
/// is always derived from it and the frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionRecord {
    pub schema_version: SchemaVersion,
    pub id: SubscriptionId,
    pub owner_id: OwnerId,
    pub name: String,
    pub cost: Decimal,
    pub frequency: Frequency,
    pub status: SubscriptionStatus,
    pub renewal_date: NaiveDate,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        id: SubscriptionId,
        owner_id: OwnerId,
        name: String,
        cost: Decimal,
        frequency: Frequency,
        status: SubscriptionStatus,
        renewal_date: NaiveDate,
        notes: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: SUBSCRIPTION_CONTRACT_VERSION,
            id,
            owner_id,
            name,
            cost,
            frequency,
            status,
            renewal_date,
            notes,
            created_at,
            updated_at,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for SubscriptionRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != SUBSCRIPTION_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "subscription_record.schema_version",
                reason: "must match SUBSCRIPTION_CONTRACT_VERSION",
            });
        }
        self.id.validate()?;
        self.owner_id.validate()?;
        validate_name(&self.name, "subscription_record.name")?;
        validate_cost(self.cost, "subscription_record.cost")?;
        validate_notes(self.notes.as_deref(), "subscription_record.notes")?;
        if self.updated_at < self.created_at {
            return Err(ContractViolation::InvalidValue {
                field: "subscription_record.updated_at",
                reason: "must be >= created_at",
            });
        }
        Ok(())
    }
}
