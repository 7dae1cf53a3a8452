//! # Sweep Runner
//!
//! External trigger for the expiry sweeper.
//!
//! ## Usage
//! ```bash
//! # One pass, print the report, exit (cron style)
//! cargo run -p holdfast-db --bin holdfast-sweep -- --db ./holdfast.db --once
//!
//! # Run every 30 seconds until interrupted
//! cargo run -p holdfast-db --bin holdfast-sweep -- --interval 30
//!
//! # Only the order sweep, settings from a file
//! cargo run -p holdfast-db --bin holdfast-sweep -- --config holdfast.toml --mode orders
//! ```
//!
//! Flags override `HOLDFAST_*` environment variables, which override the
//! config file. Each pass prints its report as one JSON line on stdout.

use chrono::Utc;
use serde::Serialize;
use std::env;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use holdfast_db::migrations::migration_status;
use holdfast_db::service::sweeper::{CleanupReport, SweepReport};
use holdfast_db::{Database, EngineConfig, ExpirySweeper, SweepMode};

/// One pass of the runner, as printed.
#[derive(Debug, Serialize)]
struct PassReport {
    mode: SweepMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    orders: Option<SweepReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reservations: Option<CleanupReport>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = env::var("HOLDFAST_CONFIG").ok().map(PathBuf::from);
    let mut db_path: Option<PathBuf> = None;
    let mut interval_secs: Option<u64> = None;
    let mut mode: Option<SweepMode> = None;
    let mut once = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(flag_value(&args, &mut i)?));
            }
            "--db" | "-d" => {
                db_path = Some(PathBuf::from(flag_value(&args, &mut i)?));
            }
            "--interval" | "-i" => {
                interval_secs = Some(flag_value(&args, &mut i)?.parse()?);
            }
            "--mode" | "-m" => {
                mode = Some(flag_value(&args, &mut i)?.parse()?);
            }
            "--once" => once = true,
            "--help" | "-h" => {
                println!("Holdfast expiry sweep runner");
                println!();
                println!("Usage: holdfast-sweep [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>     TOML config file (env: HOLDFAST_CONFIG)");
                println!("  -d, --db <PATH>         Database file path (env: HOLDFAST_DB_PATH)");
                println!("  -i, --interval <SECS>   Seconds between passes (default: 60)");
                println!("  -m, --mode <MODE>       orders | reservations | both (default: both)");
                println!("      --once              Run a single pass and exit");
                println!("  -h, --help              Show this help message");
                return Ok(());
            }
            other => {
                error!(arg = %other, "Unknown argument");
                return Err(format!("unknown argument: {}", other).into());
            }
        }
        i += 1;
    }

    let mut config = EngineConfig::load(config_path.as_deref())?;
    if let Some(path) = db_path {
        config.database.path = path;
    }
    if let Some(secs) = interval_secs {
        config.sweeper.interval_secs = secs;
    }
    if let Some(mode) = mode {
        config.sweeper.mode = mode;
    }
    config.validate()?;

    let db = Database::new(config.db_config()).await?;
    if !db.health_check().await {
        return Err(format!("database at {} is not usable", config.database.path.display()).into());
    }
    let (migrations, applied) = migration_status(db.pool()).await?;

    let sweeper = db.sweeper(config.credit.clone());
    let mode = config.sweeper.mode;

    info!(
        path = %config.database.path.display(),
        migrations,
        applied,
        mode = %mode,
        once,
        interval_secs = config.sweeper.interval_secs,
        "Sweep runner starting"
    );

    if once {
        run_pass(&sweeper, mode).await?;
        db.close().await;
        return Ok(());
    }

    let mut ticker = tokio::time::interval(config.sweeper.interval());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // A failed scan is logged; the next tick tries again.
                if let Err(e) = run_pass(&sweeper, mode).await {
                    error!(error = %e, "Sweep pass failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    db.close().await;
    Ok(())
}

/// Returns the value following the flag at `args[*i]` and steps past it.
fn flag_value<'a>(args: &'a [String], i: &mut usize) -> Result<&'a str, Box<dyn std::error::Error>> {
    let flag = &args[*i];
    match args.get(*i + 1) {
        Some(value) => {
            *i += 1;
            Ok(value.as_str())
        }
        None => {
            error!(arg = %flag, "Missing value");
            Err(format!("missing value for {}", flag).into())
        }
    }
}

/// Runs one pass in the configured mode and prints its report.
async fn run_pass(sweeper: &ExpirySweeper, mode: SweepMode) -> Result<(), Box<dyn std::error::Error>> {
    let now = Utc::now();

    let orders = if mode.sweeps_orders() {
        Some(sweeper.sweep(now).await?)
    } else {
        None
    };

    let reservations = if mode.cleans_reservations() {
        Some(sweeper.clean_expired_reservations(now).await?)
    } else {
        None
    };

    let report = PassReport {
        mode,
        orders,
        reservations,
    };
    println!("{}", serde_json::to_string(&report)?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_flag_value_steps_past_value() {
        let argv = args(&["holdfast-sweep", "--db", "/tmp/h.db", "--once"]);
        let mut i = 1;
        assert_eq!(flag_value(&argv, &mut i).unwrap(), "/tmp/h.db");
        assert_eq!(i, 2);
    }

    #[test]
    fn test_trailing_flag_without_value_is_an_error() {
        for flag in ["--db", "--interval", "--mode", "--config"] {
            let argv = args(&["holdfast-sweep", "--once", flag]);
            let mut i = 2;
            let err = flag_value(&argv, &mut i).unwrap_err();
            assert_eq!(err.to_string(), format!("missing value for {}", flag));
            assert_eq!(i, 2);
        }
    }
}
