// Basis Tracker
// Written in 2025 by
//   the Basis Tracker developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the CC0 Public Domain Dedication
// along with this software.
// If not, see <http://creativecommons.org/publicdomain/zero/1.0/>.
//

//! Basis Tracker
//!
//! Deterministic cost-basis and capital-gains accounting for
//! cryptoasset activity across exchanges and wallets
//!

#[macro_use]
pub mod units;

pub mod cli;
pub mod config;
pub mod csv;
pub mod engine;
pub mod file;
pub mod ledger;
pub mod logger;
pub mod lots;
pub mod price;
pub mod report;
pub mod timemap;

use anyhow::Context;
use log::info;
use std::{fs, path::PathBuf};

use cli::Command;
use config::Configuration;
use engine::MatchingEngine;
use ledger::normalize::order_events;
use ledger::transfer::reconcile;
use ledger::{EventSource, JsonRecords, MalformedEvent, ReconciledStream};
use logger::Logger;
use price::{Historic, Valuation};
use units::UtcTime;

/// Normalizes every events file into one totally ordered stream
fn load_events(
    files: &[PathBuf],
) -> anyhow::Result<(Vec<ledger::LedgerEvent>, Vec<MalformedEvent>)> {
    let mut events = vec![];
    let mut malformed = vec![];
    for path in files {
        let name = path.display().to_string();
        let input = fs::File::open(path).with_context(|| format!("opening events file {name}"))?;
        let source = JsonRecords::from_reader(&name, input)?;
        info!("Normalizing {}.", source.describe());
        let batch = source
            .normalize()
            .with_context(|| format!("normalizing {name}"))?;
        events.extend(batch.events);
        malformed.extend(batch.malformed);
    }
    // Re-establish the total order across sources
    order_events(&mut events)?;
    Ok((events, malformed))
}

/// Loads the historic price store named by the config, or an empty one
fn load_prices(config: &Configuration) -> anyhow::Result<Historic> {
    match config.price_data_dir {
        Some(ref dir) => Historic::read_json(config.reporting_currency.clone(), dir)
            .with_context(|| format!("loading price data from {}", dir.display())),
        None => Ok(Historic::new(config.reporting_currency.clone())),
    }
}

/// Runs normalization and reconciliation, the shared front half
fn front_half(
    config: &Configuration,
    events_files: &[PathBuf],
) -> anyhow::Result<(ReconciledStream, Vec<MalformedEvent>)> {
    let (events, malformed) = load_events(events_files)?;
    info!("Normalized {} events ({} malformed).", events.len(), malformed.len());
    let reconciled = reconcile(events, config.transfer_tolerance);
    Ok((reconciled, malformed))
}

fn main() -> anyhow::Result<()> {
    let command = Command::from_args();
    match command {
        Command::Report { .. } => {
            let log_name = format!(
                "{}_{}.log",
                command.log_name(),
                UtcTime::now().format("%Y%m%d-%H%M%S"),
            );
            Logger::init(&log_name).context("initializing logger")?;
        }
        _ => Logger::init_stdout_only().context("initializing logger")?,
    }

    match command {
        Command::Report {
            config_file,
            events_files,
        } => {
            let config = Configuration::load(&config_file)?;
            let (reconciled, malformed) = front_half(&config, &events_files)?;

            let prices = load_prices(&config)?;
            let valuation = Valuation::new(
                &prices,
                config.reporting_currency.clone(),
                config.price_fallback.clone(),
            );
            let mut engine = MatchingEngine::new(
                config.matching_strategy,
                config.insufficient_lots_policy,
                valuation,
            );
            engine
                .apply_all(&reconciled.events)
                .context("matching disposals against lots")?;

            let dir = report::write_report(
                &config,
                engine.taxable_events(),
                engine.ledgers(),
                &malformed,
                &reconciled.matches,
            )?;
            info!("Report written to {}.", dir);
        }
        Command::CheckEvents {
            config_file,
            events_files,
        } => {
            let config = Configuration::load(&config_file)?;
            let (reconciled, malformed) = front_half(&config, &events_files)?;
            info!(
                "{} events would reach the matching engine; {} self-transfers reconciled.",
                reconciled.events.len(),
                reconciled.matches.len(),
            );
            for bad in &malformed {
                info!("excluded: {}", bad);
            }
        }
        Command::InitializePriceData { config_file, csv } => {
            let config = Configuration::load(&config_file)?;
            let dir = config
                .price_data_dir
                .as_ref()
                .context("config has no price_data_dir to initialize")?;
            let mut history = Historic::new(config.reporting_currency.clone());
            let input = fs::File::open(&csv)
                .with_context(|| format!("opening price CSV {}", csv.display()))?;
            history
                .read_csv(input)
                .with_context(|| format!("reading price CSV {}", csv.display()))?;
            history.write_out(dir)?;
            info!("Initialized {} price points in {}.", history.len(), dir.display());
        }
        Command::LatestPrice { config_file, asset } => {
            let config = Configuration::load(&config_file)?;
            let prices = load_prices(&config)?;
            match prices.price_at(&asset, UtcTime::now()) {
                Some((time, price)) => info!("{}: {} as of {}", asset, price, time),
                None => info!("{}: no stored price", asset),
            }
        }
    }

    // Ensure the debug log gets flushed before exit
    log::logger().flush();
    Ok(())
}
