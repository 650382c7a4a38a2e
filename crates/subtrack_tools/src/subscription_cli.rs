#![forbid(unsafe_code)]

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use subtrack_engines::calendar::{
    add_interval, days_until, format_cost, format_iso_date, format_relative, parse_iso_date,
    subtract_interval,
};
use subtrack_engines::ordering::{sort_subscriptions, SortDirection, SortField, SortState};
use subtrack_kernel_contracts::subscription::{
    Frequency, OwnerId, SubscriptionFormData, SubscriptionId, SubscriptionStatus,
};
use subtrack_os::gateway::{ListOutcome, SubscriptionGateway};
use subtrack_storage::repo::DocumentBackend;

pub const CALENDAR_USAGE: &str =
    "usage: subtrack calendar <renewal <purchase-date> <frequency>|purchase <renewal-date> <frequency>|until <date>>";
pub const SUBSCRIPTION_USAGE: &str = "usage: subtrack sub <ls [--sort cost|renewal_date] [--desc]|add <name> <cost> <frequency> (--purchase <date>|--renewal <date>) [--status <status>] [--notes <text>]|rm <id>>";

pub fn execute_calendar_command(
    subcommand: &str,
    args: &[&str],
    today: NaiveDate,
) -> Result<String, String> {
    match subcommand {
        "renewal" => {
            let (date, frequency) = date_and_frequency(args)?;
            let renewal = add_interval(date, frequency).map_err(|e| e.to_string())?;
            Ok(format_iso_date(renewal))
        }
        "purchase" => {
            let (date, frequency) = date_and_frequency(args)?;
            let purchase = subtract_interval(date, frequency).map_err(|e| e.to_string())?;
            Ok(format_iso_date(purchase))
        }
        "until" => {
            let raw = args.first().ok_or_else(|| CALENDAR_USAGE.to_string())?;
            let date = parse_iso_date(raw, "date").map_err(|e| e.to_string())?;
            let days = days_until(date, today);
            Ok(format!("{days}\t{}", format_relative(days)))
        }
        _ => Err(format!(
            "unknown calendar subcommand: {subcommand}. expected one of: renewal, purchase, until"
        )),
    }
}

fn date_and_frequency(args: &[&str]) -> Result<(NaiveDate, Frequency), String> {
    let [raw_date, raw_frequency] = args else {
        return Err(CALENDAR_USAGE.to_string());
    };
    let date = parse_iso_date(raw_date, "date").map_err(|e| e.to_string())?;
    let frequency = Frequency::parse_field(raw_frequency, "frequency").map_err(|e| e.to_string())?;
    Ok((date, frequency))
}

pub fn execute_subscription_command<B>(
    gateway: &mut SubscriptionGateway<B>,
    owner: &OwnerId,
    subcommand: &str,
    args: &[&str],
    now: DateTime<Utc>,
    today: NaiveDate,
) -> Result<String, String>
where
    B: DocumentBackend,
{
    match subcommand {
        "ls" => {
            let sort = parse_ls_flags(args)?;
            let mut rows = match gateway.fetch_all(owner) {
                ListOutcome::Loaded(rows) => rows,
                ListOutcome::Failed { reason } => {
                    return Err(format!("failed to load subscriptions: {reason}"))
                }
            };
            sort_subscriptions(&mut rows, sort, today);
            let lines: Vec<String> = rows
                .iter()
                .map(|r| {
                    format!(
                        "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                        r.id.as_str(),
                        r.name,
                        format_cost(r.cost),
                        r.frequency.as_str(),
                        r.status.as_str(),
                        format_iso_date(r.renewal_date),
                        format_relative(days_until(r.renewal_date, today)),
                    )
                })
                .collect();
            Ok(lines.join("\n"))
        }
        "add" => {
            let form = parse_add_args(args)?;
            let record = gateway
                .create(owner, form, now)
                .map_err(|e| format!("failed to create subscription: {e}"))?;
            Ok(record.id.as_str().to_string())
        }
        "rm" => {
            let [raw_id] = args else {
                return Err(SUBSCRIPTION_USAGE.to_string());
            };
            let id = SubscriptionId::new(*raw_id).map_err(|e| e.to_string())?;
            gateway
                .delete(owner, &id)
                .map_err(|e| format!("failed to delete subscription: {e}"))?;
            Ok("OK".to_string())
        }
        _ => Err(format!(
            "unknown sub subcommand: {subcommand}. expected one of: ls, add, rm"
        )),
    }
}

fn parse_ls_flags(args: &[&str]) -> Result<Option<SortState>, String> {
    let mut field = None;
    let mut direction = SortDirection::Asc;
    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        match *flag {
            "--sort" => {
                let raw = iter.next().ok_or_else(|| SUBSCRIPTION_USAGE.to_string())?;
                field = Some(SortField::parse(raw).ok_or_else(|| {
                    format!("unknown sort field '{raw}'. allowed: cost, renewal_date")
                })?);
            }
            "--desc" => direction = SortDirection::Desc,
            other => return Err(format!("unknown ls flag '{other}'. {SUBSCRIPTION_USAGE}")),
        }
    }
    Ok(field.map(|f| SortState::new(f, direction)))
}

fn parse_add_args(args: &[&str]) -> Result<SubscriptionFormData, String> {
    let [name, raw_cost, raw_frequency, flags @ ..] = args else {
        return Err(SUBSCRIPTION_USAGE.to_string());
    };
    let cost = Decimal::from_str(raw_cost.trim())
        .map_err(|_| format!("invalid cost '{raw_cost}': must be a decimal number"))?;
    let frequency = Frequency::parse_field(raw_frequency, "subscription_form.frequency")
        .map_err(|e| e.to_string())?;

    let mut purchase_date = None;
    let mut renewal_date = None;
    let mut status = SubscriptionStatus::Active;
    let mut notes = None;
    let mut iter = flags.iter();
    while let Some(flag) = iter.next() {
        let value = iter
            .next()
            .ok_or_else(|| format!("missing value for {flag}"))?;
        match *flag {
            "--purchase" => {
                purchase_date = Some(
                    parse_iso_date(value, "subscription_form.purchase_date")
                        .map_err(|e| e.to_string())?,
                )
            }
            "--renewal" => {
                renewal_date = Some(
                    parse_iso_date(value, "subscription_form.renewal_date")
                        .map_err(|e| e.to_string())?,
                )
            }
            "--status" => {
                status = SubscriptionStatus::parse_field(value, "subscription_form.status")
                    .map_err(|e| e.to_string())?
            }
            "--notes" => notes = Some(value.to_string()),
            other => return Err(format!("unknown add flag '{other}'. {SUBSCRIPTION_USAGE}")),
        }
    }
    SubscriptionFormData::v1(
        *name,
        cost,
        frequency,
        status,
        purchase_date,
        renewal_date,
        notes,
    )
    .map_err(|e| e.to_string())
}
