#![forbid(unsafe_code)]

use std::env;
use std::path::PathBuf;

use chrono::Utc;
use subtrack_engines::calendar::today_local;
use subtrack_kernel_contracts::subscription::OwnerId;
use subtrack_os::gateway::SubscriptionGateway;
use subtrack_storage::document_store::DocumentStore;
use subtrack_tools::subscription_cli::{
    execute_calendar_command, execute_subscription_command, CALENDAR_USAGE, SUBSCRIPTION_USAGE,
};

const USAGE: &str = "usage: subtrack <calendar|sub> <subcommand> [args...]";
const DEFAULT_STORE_PATH: &str = ".subtrack/subscriptions.jsonl";

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().skip(1).collect();
    let group = args.first().ok_or_else(|| USAGE.to_string())?.as_str();
    let rest: Vec<&str> = args.iter().skip(2).map(String::as_str).collect();

    let output = match group {
        "calendar" => {
            let subcommand = args.get(1).ok_or_else(|| CALENDAR_USAGE.to_string())?;
            execute_calendar_command(subcommand, &rest, today_local())?
        }
        "sub" => {
            let subcommand = args.get(1).ok_or_else(|| SUBSCRIPTION_USAGE.to_string())?;
            let owner = principal_from_env()?;
            let store = DocumentStore::open_with_journal(store_path_from_env())
                .map_err(|e| format!("failed to open subscription store: {e}"))?;
            let mut gateway = SubscriptionGateway::new(store);
            execute_subscription_command(
                &mut gateway,
                &owner,
                subcommand,
                &rest,
                Utc::now(),
                today_local(),
            )?
        }
        _ => return Err(USAGE.to_string()),
    };
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn principal_from_env() -> Result<OwnerId, String> {
    let raw = env::var("SUBTRACK_PRINCIPAL")
        .map_err(|_| "SUBTRACK_PRINCIPAL must be set for `subtrack sub`".to_string())?;
    OwnerId::new(raw.trim()).map_err(|e| format!("invalid SUBTRACK_PRINCIPAL: {e}"))
}

fn store_path_from_env() -> PathBuf {
    env::var("SUBTRACK_STORE_PATH")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH))
}
