//! # Risk Report
//!
//! Prints the risk queue of one facility as JSON.
//!
//! ## Usage
//! ```bash
//! # Facility "demo-facility", database from engine.toml / ORTRACK_DB_PATH
//! cargo run -p ortrack-engine --bin risk-report -- --facility demo-facility
//!
//! # Explicit config file and evaluation date
//! cargo run -p ortrack-engine --bin risk-report -- \
//!     --facility fac-7 --config ./engine.toml --date 2026-11-01
//! ```
//!
//! On failure the error is printed as an `ApiError` JSON object on stderr
//! and the process exits with status 1.

use chrono::{NaiveDate, Utc};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

use ortrack_core::Caller;
use ortrack_engine::{init_tracing, ApiError, Engine, EngineConfig, EngineError, EngineResult};

struct Args {
    facility_id: String,
    config_path: Option<PathBuf>,
    date: Option<NaiveDate>,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = match parse_args() {
        Ok(Some(args)) => args,
        Ok(None) => return ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::from(2);
        }
    };

    match run(args).await {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(err) => {
            let body = serde_json::to_string_pretty(&ApiError::from(&err))
                .unwrap_or_else(|_| err.to_string());
            eprintln!("{}", body);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> EngineResult<String> {
    let config = EngineConfig::load(args.config_path)?;
    let engine = Engine::open(config).await?;

    let caller = Caller::new("risk-report", &args.facility_id);
    let today = args.date.unwrap_or_else(|| Utc::now().date_naive());

    let queue = engine.risk().compute_risk_queue(&caller, today).await?;
    info!(facility_id = %args.facility_id, %today, alarms = queue.len(), "Risk report ready");

    engine.database().close().await;

    serde_json::to_string_pretty(&queue).map_err(|e| EngineError::Internal(e.to_string()))
}

/// Parses command-line flags. `Ok(None)` means help was printed.
fn parse_args() -> Result<Option<Args>, String> {
    let argv: Vec<String> = env::args().collect();

    let mut facility_id = None;
    let mut config_path = None;
    let mut date = None;

    let mut i = 1;
    while i < argv.len() {
        let value = argv.get(i + 1);
        match argv[i].as_str() {
            "--facility" | "-f" => {
                facility_id = value.cloned();
                i += 1;
            }
            "--config" | "-c" => {
                config_path = value.map(PathBuf::from);
                i += 1;
            }
            "--date" | "-d" => {
                let raw = value.ok_or("--date needs a value (YYYY-MM-DD)")?;
                date = Some(
                    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                        .map_err(|e| format!("Invalid --date '{}': {}", raw, e))?,
                );
                i += 1;
            }
            "--help" | "-h" => {
                println!("ORtrack Risk Report");
                println!();
                println!("Usage: risk-report --facility <ID> [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -f, --facility <ID>    Facility to report on (required)");
                println!("  -c, --config <PATH>    engine.toml path (default: platform config dir)");
                println!("  -d, --date <DATE>      Evaluation date, YYYY-MM-DD (default: today, UTC)");
                println!("  -h, --help             Show this help message");
                return Ok(None);
            }
            other => return Err(format!("Unknown argument '{}'. Try --help.", other)),
        }
        i += 1;
    }

    let facility_id = facility_id.ok_or("--facility is required. Try --help.")?;

    Ok(Some(Args {
        facility_id,
        config_path,
        date,
    }))
}
