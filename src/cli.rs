//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::csv_adapter::{CsvAdapter, parse_subclasses};
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config::{EvolutionConfig, InvestorConfig, SimConfig};
use crate::domain::config_validation::{validate_sim_config, validate_subclasses};
use crate::domain::course_of_action::Strategy;
use crate::domain::error::SimError;
use crate::domain::factory::Factory;
use crate::domain::simulator::Simulator;
use crate::domain::subclass::SubclassTable;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

/// Rolling statistics window used when `[data] stats_window` is absent.
pub const DEFAULT_STATS_WINDOW: i64 = 30;

#[derive(Parser, Debug)]
#[command(name = "platosim", about = "Genetic-algorithm FX strategy simulator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a simulation
    Simulate {
        #[arg(short, long)]
        config: PathBuf,
        /// Overrides `[simulation] seed`
        #[arg(long)]
        seed: Option<u64>,
        /// Overrides `[report] stats_path`
        #[arg(long)]
        stats: Option<PathBuf>,
    },
    /// Validate a configuration and its metric table
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Decode a genome and print its canonical form and identity
    Dna {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        dna: String,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Simulate {
            config,
            seed,
            stats,
        } => run_simulate(&config, seed, stats.as_ref()),
        Command::Validate { config } => run_validate(&config),
        Command::Dna { config, dna } => run_dna(&config, &dna),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn fail(err: SimError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

/// Relative paths in the configuration are taken from the config file's directory.
pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let p = PathBuf::from(value.trim());
    if p.is_absolute() {
        return p;
    }
    match config_path.parent() {
        Some(dir) => dir.join(p),
        None => p,
    }
}

fn require_usize(config: &dyn ConfigPort, section: &str, key: &str, default: i64) -> Result<usize, SimError> {
    let v = config.get_int(section, key, default);
    usize::try_from(v).map_err(|_| SimError::invalid_config(section, key, "must be non-negative"))
}

pub fn build_sim_config(adapter: &dyn ConfigPort) -> Result<SimConfig, SimError> {
    let c1 = adapter.require_string("simulation", "c1")?;
    let c2 = adapter.require_string("simulation", "c2")?;
    let start_date = adapter.require_date("simulation", "start_date")?;
    let end_date = adapter.require_date("simulation", "end_date")?;

    let mut config = SimConfig::new(c1.trim(), c2.trim(), start_date, end_date);
    config.generations = require_usize(adapter, "simulation", "generations", 1)?;
    config.generation_duration = match adapter.get_string("simulation", "generation_duration") {
        Some(s) if !s.trim().is_empty() => Some(s.parse()?),
        _ => None,
    };
    config.loop_count = require_usize(adapter, "simulation", "loop_count", 1)?;
    config.population_size = require_usize(adapter, "simulation", "population_size", 10)?;
    config.seed = match adapter.get_string("simulation", "seed") {
        Some(s) if !s.trim().is_empty() => Some(s.trim().parse().map_err(|_| {
            SimError::invalid_config("simulation", "seed", "seed must be an unsigned integer")
        })?),
        _ => None,
    };
    config.worker_threads = require_usize(adapter, "simulation", "worker_threads", 0)?;
    config.enforce_stop_date = adapter.get_bool("simulation", "enforce_stop_date", false);
    config.allow_duplicate_investors = adapter.get_bool("simulation", "allow_duplicate_investors", false);

    let inv = InvestorConfig::default();
    config.investor = InvestorConfig {
        init_funds: adapter.get_double("investor", "init_funds", inv.init_funds),
        std_investment: adapter.get_double("investor", "std_investment", inv.std_investment),
        stop_loss: adapter.get_double("investor", "stop_loss", inv.stop_loss),
        txn_fee: adapter.get_double("investor", "txn_fee", inv.txn_fee),
        txn_fee_factor: adapter.get_double("investor", "txn_fee_factor", inv.txn_fee_factor),
        min_influencers: require_usize(adapter, "investor", "min_influencers", inv.min_influencers as i64)?,
        max_influencers: require_usize(adapter, "investor", "max_influencers", inv.max_influencers as i64)?,
        inv_w1: adapter.get_double("investor", "inv_w1", inv.inv_w1),
        inv_w2: adapter.get_double("investor", "inv_w2", inv.inv_w2),
        strategy: match adapter.get_string("investor", "strategy") {
            Some(s) if !s.trim().is_empty() => s.trim().parse::<Strategy>()?,
            _ => inv.strategy,
        },
        std_dev_variation_factor: adapter.get_double(
            "investor",
            "std_dev_variation_factor",
            inv.std_dev_variation_factor,
        ),
    };

    let evo = EvolutionConfig::default();
    config.evolution = EvolutionConfig {
        mutation_rate: u32::try_from(adapter.get_int("evolution", "mutation_rate", evo.mutation_rate as i64))
            .map_err(|_| SimError::invalid_config("evolution", "mutation_rate", "must be non-negative"))?,
        preserve_elite: adapter.get_bool("evolution", "preserve_elite", evo.preserve_elite),
        preserve_elite_pct: adapter.get_double("evolution", "preserve_elite_pct", evo.preserve_elite_pct),
        top_investor_count: require_usize(adapter, "evolution", "top_investor_count", evo.top_investor_count as i64)?,
        bonus_plan: adapter.get_bool("evolution", "bonus_plan", evo.bonus_plan),
    };

    config.single_investor_dna = adapter
        .get_string("single", "dna")
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.trim().to_string());
    config.gen0_elites = (1..)
        .map_while(|i| adapter.get_string("elites", &format!("dna{i}")))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    Ok(config)
}

fn load_subclasses(config_path: &Path, adapter: &dyn ConfigPort) -> Result<SubclassTable, SimError> {
    let path = resolve_path(config_path, &adapter.require_string("data", "subclasses_path")?);
    let content = fs::read_to_string(&path).map_err(|e| SimError::Database {
        reason: format!("failed to read {}: {}", path.display(), e),
    })?;
    let table = parse_subclasses(&content)?;
    validate_subclasses(&table)?;
    Ok(table)
}

fn load_data(config_path: &Path, adapter: &dyn ConfigPort) -> Result<CsvAdapter, SimError> {
    let csv_path = resolve_path(config_path, &adapter.require_string("data", "csv_path")?);
    let subclasses_path = resolve_path(config_path, &adapter.require_string("data", "subclasses_path")?);
    let window = require_usize(adapter, "data", "stats_window", DEFAULT_STATS_WINDOW)?;
    let data = CsvAdapter::from_files(&csv_path, &subclasses_path, window)?;
    validate_subclasses(&data.metric_subclasses()?)?;
    Ok(data)
}

fn run_simulate(config_path: &Path, seed: Option<u64>, stats_override: Option<&PathBuf>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = validate_sim_config(&adapter) {
        return fail(e);
    }
    let mut config = match build_sim_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    if seed.is_some() {
        config.seed = seed;
    }

    let data = match load_data(config_path, &adapter) {
        Ok(d) => d,
        Err(e) => return fail(e),
    };
    let subclasses = match data.metric_subclasses() {
        Ok(t) => t,
        Err(e) => return fail(e),
    };
    info!(
        "loaded {} days of data and {} metrics",
        data.len(),
        subclasses.len()
    );

    let mut sim = match Simulator::new(Arc::new(config), Arc::new(subclasses), &data) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let stats = match sim.run() {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    for s in &stats {
        eprintln!(
            "generation {:>3}: {} - {}  profitable {:>4}  max profit {:>10.2}  unsettled C2 {:>10.2}",
            s.generation, s.dt_gen_start, s.dt_actual_stop, s.profitable_investors, s.max_profit, s.unsettled_c2
        );
    }
    if let Some(best) = sim.top_investors().first() {
        eprintln!("best portfolio value {:.2}: {}", best.portfolio_value, best.dna);
    }

    let stats_path = stats_override.cloned().or_else(|| {
        adapter
            .get_string("report", "stats_path")
            .filter(|s| !s.trim().is_empty())
            .map(|s| resolve_path(config_path, &s))
    });
    if let Some(path) = stats_path {
        let report = CsvReportAdapter::new(&path);
        if let Err(e) = report.write_stats(&stats) {
            return fail(e);
        }
        if let Err(e) = report.write_top_investors(sim.top_investors()) {
            return fail(e);
        }
        eprintln!("Statistics written to {}", report.stats_path().display());
    }
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = validate_sim_config(&adapter) {
        return fail(e);
    }
    let config = match build_sim_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let table = match load_subclasses(config_path, &adapter) {
        Ok(t) => t,
        Err(e) => return fail(e),
    };

    eprintln!(
        "  {}/{} {} - {}, {} generations, population {}",
        config.c1,
        config.c2,
        config.start_date,
        config.end_date,
        config.generation_count(),
        config.population_size
    );
    eprintln!("  metrics: {}", table.metrics().join(", "));
    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_dna(config_path: &Path, dna: &str) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let config = match build_sim_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let table = match load_subclasses(config_path, &adapter) {
        Ok(t) => t,
        Err(e) => return fail(e),
    };
    let mut factory = Factory::new(Arc::new(config), Arc::new(table));
    match factory.investor_from_dna(dna) {
        Ok(inv) => {
            println!("{}", inv.dna());
            println!("{}", inv.id);
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}
