#![forbid(unsafe_code)]

//! Calendar math for subscription renewals.
//!
//! Month and year steps clamp to the last day of the target month
//! (`2024-01-31 + Monthly = 2024-02-29`). Subtracting an interval from a
//! clamped date therefore does not recover the original day; every day of
//! month <= 28 round-trips exactly.

use chrono::{Days, Local, Months, NaiveDate};
use rust_decimal::Decimal;
use subtrack_kernel_contracts::subscription::{Frequency, SubscriptionRecord};
use subtrack_kernel_contracts::ContractViolation;

pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";
pub const DISPLAY_DATE_FORMAT: &str = "%d/%m/%Y";

enum Step {
    Days(u64),
    Months(u32),
}

fn step_for(frequency: Frequency) -> Step {
    match frequency {
        Frequency::Weekly => Step::Days(7),
        Frequency::Monthly => Step::Months(1),
        Frequency::Quarterly => Step::Months(3),
        Frequency::Yearly => Step::Months(12),
    }
}

fn out_of_range() -> ContractViolation {
    ContractViolation::InvalidValue {
        field: "calendar.date",
        reason: "interval arithmetic left the supported date range",
    }
}

pub fn add_interval(date: NaiveDate, frequency: Frequency) -> Result<NaiveDate, ContractViolation> {
    let out = match step_for(frequency) {
        Step::Days(d) => date.checked_add_days(Days::new(d)),
        Step::Months(m) => date.checked_add_months(Months::new(m)),
    };
    out.ok_or_else(out_of_range)
}

pub fn subtract_interval(
    date: NaiveDate,
    frequency: Frequency,
) -> Result<NaiveDate, ContractViolation> {
    let out = match step_for(frequency) {
        Step::Days(d) => date.checked_sub_days(Days::new(d)),
        Step::Months(m) => date.checked_sub_months(Months::new(m)),
    };
    out.ok_or_else(out_of_range)
}

/// Signed whole days from `reference` to `date`: positive in the future, 0 today.
pub fn days_until(date: NaiveDate, reference: NaiveDate) -> i64 {
    date.signed_duration_since(reference).num_days()
}

pub fn today_local() -> NaiveDate {
    Local::now().date_naive()
}

pub fn days_until_today(date: NaiveDate) -> i64 {
    days_until(date, today_local())
}

pub fn format_relative(days: i64) -> String {
    match days {
        d if d < 0 => format!("{} days ago", d.unsigned_abs()),
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        d => format!("{d} days"),
    }
}

pub fn format_display_date(date: NaiveDate) -> String {
    date.format(DISPLAY_DATE_FORMAT).to_string()
}

pub fn format_iso_date(date: NaiveDate) -> String {
    date.format(ISO_DATE_FORMAT).to_string()
}

pub fn parse_iso_date(raw: &str, field: &'static str) -> Result<NaiveDate, ContractViolation> {
    let trimmed = raw.trim();
    // chrono accepts unpadded fields; the stored form is always zero-padded.
    if trimmed.len() != 10 {
        return Err(ContractViolation::InvalidDate {
            field,
            got: raw.to_string(),
        });
    }
    NaiveDate::parse_from_str(trimmed, ISO_DATE_FORMAT).map_err(|_| {
        ContractViolation::InvalidDate {
            field,
            got: raw.to_string(),
        }
    })
}

/// Resolves the renewal date from whichever of the two dates was entered.
/// When both are present they must agree.
pub fn resolve_renewal_date(
    purchase_date: Option<NaiveDate>,
    renewal_date: Option<NaiveDate>,
    frequency: Frequency,
) -> Result<NaiveDate, ContractViolation> {
    match (purchase_date, renewal_date) {
        (Some(p), None) => add_interval(p, frequency),
        (None, Some(r)) => Ok(r),
        (Some(p), Some(r)) => {
            if add_interval(p, frequency)? != r {
                return Err(ContractViolation::InvalidValue {
                    field: "subscription_form.renewal_date",
                    reason: "must equal purchase_date plus one frequency interval",
                });
            }
            Ok(r)
        }
        (None, None) => Err(ContractViolation::InvalidValue {
            field: "subscription_form.purchase_date",
            reason: "purchase_date or renewal_date is required",
        }),
    }
}

pub fn derive_purchase_date(record: &SubscriptionRecord) -> Result<NaiveDate, ContractViolation> {
    subtract_interval(record.renewal_date, record.frequency)
}

pub fn format_cost(cost: Decimal) -> String {
    format!("${:.2}", cost.round_dp(2))
}
