#![forbid(unsafe_code)]

use std::cmp::Ordering;

use chrono::NaiveDate;
use subtrack_kernel_contracts::subscription::SubscriptionRecord;

use crate::calendar::days_until;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortField {
    Cost,
    RenewalDate,
}

impl SortField {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cost => "cost",
            Self::RenewalDate => "renewal_date",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cost" => Some(Self::Cost),
            "renewal_date" | "renewaldate" | "renewal" => Some(Self::RenewalDate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    pub const fn flipped(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SortState {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortState {
    pub const fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// Header-click semantics: the active field flips direction, a new field starts ascending.
    pub fn toggled(current: Option<SortState>, field: SortField) -> SortState {
        match current {
            Some(state) if state.field == field => SortState::new(field, state.direction.flipped()),
            _ => SortState::new(field, SortDirection::Asc),
        }
    }
}

fn compare(a: &SubscriptionRecord, b: &SubscriptionRecord, field: SortField, today: NaiveDate) -> Ordering {
    match field {
        SortField::Cost => a.cost.cmp(&b.cost),
        SortField::RenewalDate => {
            days_until(a.renewal_date, today).cmp(&days_until(b.renewal_date, today))
        }
    }
}

/// Stable sort; `None` keeps the incoming (created_at descending) order.
pub fn sort_subscriptions(
    records: &mut [SubscriptionRecord],
    sort: Option<SortState>,
    today: NaiveDate,
) {
    let Some(state) = sort else {
        return;
    };
    records.sort_by(|a, b| {
        let ord = compare(a, b, state.field, today);
        match state.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });
}
