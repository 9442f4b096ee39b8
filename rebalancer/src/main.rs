//! CLI entry point for the spot rebalancer.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rustc_hash::FxHashMap;

use spot_rebalancer::audit::{self, AuditLog};
use spot_rebalancer::config::{Config, ConnectionKind};
use spot_rebalancer::currency::Currency;
use spot_rebalancer::error::{Error, Result};
use spot_rebalancer::exchange::{Exchange, FillMode, PaperExchange};
use spot_rebalancer::executor;
use spot_rebalancer::market;
use spot_rebalancer::planner::rebalance_orders;
use spot_rebalancer::pricing::{
    mid_prices, normalize_weights, price_estimates, spread_to_fee, total_fee,
    weights_from_resources,
};
use spot_rebalancer::reconcile;
use spot_rebalancer::stats;
use spot_rebalancer::topo::topological_sort;
use spot_rebalancer::types::candidate_universe;
use spot_rebalancer::weights::TargetSpec;

#[derive(Parser)]
#[command(name = "rebalancer")]
#[command(about = "Portfolio rebalancer for a crypto spot exchange")]
#[command(version)]
struct Cli {
    /// Path to config.toml
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute the rebalance plan, confirm, and execute
    Rebalance {
        /// Path to weights.json
        weights: PathBuf,

        /// Use market orders instead of the limit-order executor
        #[arg(long)]
        market: bool,

        /// Show the plan without executing
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation prompt (for automation/cron)
        #[arg(long)]
        force: bool,
    },

    /// Show current resources and weights
    Positions,

    /// Check exchange connectivity
    Status,

    /// Compare actual resources vs a target weights file
    Reconcile {
        /// Path to weights.json
        weights: PathBuf,
    },
}

/// Build the exchange adapter selected by `config.connection.kind`.
///
/// Only the paper-trading fixture is implemented in-crate — live exchange
/// connectivity is a separate concern (spec's Non-goals).
fn build_exchange(config: &Config) -> Result<PaperExchange> {
    match config.connection.kind {
        ConnectionKind::Paper => Ok(PaperExchange::builder().fill_mode(FillMode::Full).build()),
        ConnectionKind::Live => Err(Error::ExchangeError(
            "live exchange connectivity is not implemented in this crate".into(),
        )),
    }
}

fn base_currency(config: &Config) -> Result<Currency> {
    Currency::new(config.account.base_currency.clone())
}

fn display_plan(transfers: &[spot_rebalancer::types::Transfer]) {
    if transfers.is_empty() {
        println!("No rebalancing needed — portfolio matches target.");
        return;
    }
    println!("REBALANCE PLAN:");
    println!("  {:>3}  {:10} {:10} {:>14}", "#", "From", "To", "Amount");
    for (i, t) in transfers.iter().enumerate() {
        println!("  {:>3}  {:10} {:10} {:>14}", i + 1, t.from, t.to, t.amount);
    }
}

/// Compute the display-only plan: what the planner would route right now.
/// The executor re-derives this internally on each retry; this call exists
/// purely so the CLI can show and audit a plan before committing to it.
fn compute_display_plan(
    exchange: &dyn Exchange,
    target_weights: &spot_rebalancer::types::Weights,
    base: &Currency,
) -> Result<Vec<spot_rebalancer::types::Transfer>> {
    let resources = exchange.get_resources()?;
    let through_trade = exchange.through_trade_currencies()?;
    let target_weights = normalize_weights(target_weights)?;

    let (_, products) = candidate_universe(&resources, &target_weights, &through_trade, base);
    let orderbooks = exchange.get_orderbooks(&products)?;
    let mid = mid_prices(&orderbooks);
    let estimates = price_estimates(&mid, base)?;
    let current_weights = weights_from_resources(&resources, &estimates)?;

    let mut edge_fees = FxHashMap::default();
    for product in orderbooks.keys() {
        let spread_fee = spread_to_fee(&orderbooks[product]);
        let exchange_fee = exchange.get_taker_fee(product)?;
        edge_fees.insert(
            product.clone(),
            rust_decimal::Decimal::ONE - total_fee(spread_fee, exchange_fee),
        );
    }

    let mut transfers = rebalance_orders(&current_weights, &target_weights, &edge_fees);
    transfers.retain(|t| t.amount > rust_decimal::Decimal::new(1, 9));
    Ok(topological_sort(transfers))
}

fn run_rebalance(
    config: &Config,
    weights_path: &PathBuf,
    target: &TargetSpec,
    market_mode: bool,
    dry_run: bool,
    force: bool,
) -> Result<()> {
    let exchange = build_exchange(config)?;
    let base = base_currency(config)?;
    let target_weights = target.as_weights()?;

    let mut audit_log = AuditLog::open(&config.audit_path())?;
    audit::log_run_started(
        &mut audit_log,
        &weights_path.display().to_string(),
        &base,
        if market_mode { "market" } else { "limit" },
    )?;

    let resources = exchange.get_resources()?;
    let estimates = {
        let through_trade = exchange.through_trade_currencies()?;
        let (_, products) = candidate_universe(&resources, &target_weights, &through_trade, &base);
        let orderbooks = exchange.get_orderbooks(&products)?;
        price_estimates(&mid_prices(&orderbooks), &base)?
    };
    audit::log_resources_fetched(&mut audit_log, &resources, &estimates)?;

    let transfers = compute_display_plan(&exchange, &target_weights, &base)?;
    audit::log_plan_computed(&mut audit_log, &transfers)?;
    display_plan(&transfers);

    if transfers.is_empty() {
        audit::log_run_completed(&mut audit_log, true, 0)?;
        return Ok(());
    }

    if transfers.len() > config.risk.max_orders_per_run {
        return Err(Error::Aborted(format!(
            "plan has {} transfers, exceeding risk.max_orders_per_run ({})",
            transfers.len(),
            config.risk.max_orders_per_run
        )));
    }

    if dry_run {
        println!("\n[DRY RUN] No orders submitted.");
        return Ok(());
    }

    if !force {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt("Execute?")
            .default(false)
            .interact()
            .map_err(|e| Error::Aborted(format!("confirmation prompt failed: {e}")))?;
        if !confirmed {
            println!("Aborted.");
            audit_log.log("user_confirmed", serde_json::json!({"approved": false}))?;
            return Ok(());
        }
        audit_log.log("user_confirmed", serde_json::json!({"approved": true}))?;
    }

    if market_mode {
        let reports = market::market_order_rebalance(&exchange, &target_weights, &base)?;
        for report in &reports {
            audit::log_market_fill(&mut audit_log, report)?;
        }
        let order_stats = stats::create_order_statistics(&reports, &config.account.base_currency);
        for s in &order_stats {
            println!(
                "{} {} {} @ {} (fee {})",
                s.action, s.pair, s.volume, s.average_exec_price, s.fee
            );
        }
        audit::log_run_completed(&mut audit_log, true, reports.len())?;
    } else {
        let outcome = executor::limit_order_rebalance(
            &exchange,
            &target_weights,
            &base,
            config.execution.max_retries,
            config.execution.wait_seconds,
            config.execution.dust_notional_threshold,
            |d: Duration| std::thread::sleep(d),
        )?;
        for state in &outcome.fills {
            audit::log_order_filled(&mut audit_log, state)?;
        }
        for report in &outcome.market_fallbacks {
            audit::log_market_fill(&mut audit_log, report)?;
        }
        if !outcome.complete {
            println!("\nRebalance left a residual after exhausting retries.");
        }
        audit::log_run_completed(&mut audit_log, outcome.complete, outcome.fills.len())?;
    }

    println!("\nAudit logged to {}", config.audit_path().display());
    Ok(())
}

fn show_positions(config: &Config) -> Result<()> {
    let exchange = build_exchange(config)?;
    let base = base_currency(config)?;
    let resources = exchange.get_resources()?;
    let through_trade = exchange.through_trade_currencies()?;

    let (_, products) =
        candidate_universe(&resources, &spot_rebalancer::types::Weights::default(), &through_trade, &base);
    let orderbooks = exchange.get_orderbooks(&products)?;
    let estimates = price_estimates(&mid_prices(&orderbooks), &base)?;
    let current_weights = weights_from_resources(&resources, &estimates)?;

    if resources.is_empty() {
        println!("No resources.");
        return Ok(());
    }

    println!("CURRENT PORTFOLIO:");
    let mut symbols: Vec<&Currency> = resources.keys().collect();
    symbols.sort();
    for currency in symbols {
        let amount = resources[currency];
        let weight = current_weights.get(currency).copied().unwrap_or_default();
        println!("  {currency:8} {amount:>14}  ({:.2}%)", weight * rust_decimal::Decimal::ONE_HUNDRED);
    }
    Ok(())
}

fn check_status(config: &Config) -> Result<()> {
    print!("Checking exchange connectivity ({:?})... ", config.connection.kind);
    let exchange = build_exchange(config)?;
    exchange.get_resources()?;
    println!("OK");
    Ok(())
}

fn run_reconcile(config: &Config, target: &TargetSpec) -> Result<()> {
    let exchange = build_exchange(config)?;
    let base = base_currency(config)?;
    let target_weights = target.as_weights()?;
    let resources = exchange.get_resources()?;
    let through_trade = exchange.through_trade_currencies()?;

    let (_, products) = candidate_universe(&resources, &target_weights, &through_trade, &base);
    let orderbooks = exchange.get_orderbooks(&products)?;
    let estimates = price_estimates(&mid_prices(&orderbooks), &base)?;

    let report = reconcile::reconcile(&resources, &target_weights, &estimates)?;
    print!("{report}");
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Rebalance {
            weights,
            market,
            dry_run,
            force,
        } => {
            let target = match TargetSpec::load(&weights) {
                Ok(t) => t,
                Err(e) => {
                    eprintln!("Error loading weights file: {e}");
                    process::exit(1);
                }
            };
            run_rebalance(&config, &weights, &target, market, dry_run, force)
        }
        Command::Positions => show_positions(&config),
        Command::Status => check_status(&config),
        Command::Reconcile { weights } => {
            let target = match TargetSpec::load(&weights) {
                Ok(t) => t,
                Err(e) => {
                    eprintln!("Error loading weights file: {e}");
                    process::exit(1);
                }
            };
            run_reconcile(&config, &target)
        }
    };

    if let Err(e) = result {
        match &e {
            Error::Aborted(msg) => {
                eprintln!("{msg}");
                process::exit(0);
            }
            _ => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }
}
