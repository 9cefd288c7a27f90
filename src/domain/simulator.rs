//! The generational state machine.
//!
//! Each generation walks T3 day by day from its start to its end date. Once
//! the end date has been simulated, investors still holding C2 enter
//! wind-down: buys stop and the loop keeps going until every investor is
//! below the dust threshold or the simulated date reaches today. Fitness,
//! statistics and the next population follow.

use chrono::{Duration, Local, NaiveDate};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::sync::Arc;

use super::config::SimConfig;
use super::error::SimError;
use super::factory::{BREED_RETRY_LIMIT, DUPLICATE_RETRY_LIMIT, Factory, FactoryCounters};
use super::fitness::{FitnessBonus, NoBonus, StepBonus};
use super::generation::generation_end;
use super::investor::{Investor, MIN_TRADE_BALANCE};
use super::stats::{SimulationStatistics, TopInvestor, update_top_investors};
use super::subclass::SubclassTable;
use crate::ports::data_port::DataPort;

/// Outcome of one generation's daily loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationRun {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Last day simulated, after any wind-down.
    pub actual_stop: NaiveDate,
    pub end_of_data_reached: bool,
}

pub struct Simulator<'a> {
    config: Arc<SimConfig>,
    data: &'a dyn DataPort,
    factory: Factory,
    bonus: Box<dyn FitnessBonus>,
    pool: rayon::ThreadPool,
    investors: Vec<Investor>,
    stats: Vec<SimulationStatistics>,
    top_investors: Vec<TopInvestor>,
    today: NaiveDate,
    generations_completed: usize,
    loops_completed: usize,
}

impl<'a> Simulator<'a> {
    pub fn new(
        config: Arc<SimConfig>,
        subclasses: Arc<SubclassTable>,
        data: &'a dyn DataPort,
    ) -> Result<Self, SimError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .build()
            .map_err(|e| SimError::invalid_config("simulation", "worker_threads", e.to_string()))?;
        let bonus: Box<dyn FitnessBonus> = if config.evolution.bonus_plan {
            Box::new(StepBonus::default())
        } else {
            Box::new(NoBonus)
        };
        let today = data
            .latest_date()
            .map(|d| d + Duration::days(1))
            .unwrap_or_else(|| Local::now().date_naive());

        Ok(Simulator {
            factory: Factory::new(Arc::clone(&config), subclasses),
            config,
            data,
            bonus,
            pool,
            investors: Vec::new(),
            stats: Vec::new(),
            top_investors: Vec::new(),
            today,
            generations_completed: 0,
            loops_completed: 0,
        })
    }

    /// Overrides the date at which wind-down gives up.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn investors(&self) -> &[Investor] {
        &self.investors
    }

    pub fn stats(&self) -> &[SimulationStatistics] {
        &self.stats
    }

    pub fn top_investors(&self) -> &[TopInvestor] {
        &self.top_investors
    }

    pub fn counters(&self) -> FactoryCounters {
        self.factory.counters
    }

    pub fn generations_completed(&self) -> usize {
        self.generations_completed
    }

    pub fn loops_completed(&self) -> usize {
        self.loops_completed
    }

    /// Runs every loop and generation. Fatal invariant violations stop the run.
    pub fn run(&mut self) -> Result<Vec<SimulationStatistics>, SimError> {
        let cfg = Arc::clone(&self.config);
        let generations = cfg.generation_count();
        info!(
            "simulating {}/{} from {} to {}: {} generations x {} loops, population {}",
            cfg.c1, cfg.c2, cfg.start_date, cfg.end_date, generations, cfg.loop_count, cfg.population_size
        );

        if self.investors.is_empty() {
            self.investors = self.initial_population()?;
        }

        for lp in 0..cfg.loop_count {
            let mut gen_start = cfg.start_date;
            for g in 0..generations {
                let gen_end = generation_end(gen_start, cfg.generation_duration.as_ref(), cfg.end_date);
                let run = self.run_generation(gen_start, gen_end)?;
                self.generations_completed += 1;
                self.finish_generation(&run)?;

                let last = g + 1 == generations && lp + 1 == cfg.loop_count;
                if !last {
                    self.investors = self.next_population()?;
                }
                if cfg.generation_duration.is_some() {
                    gen_start = gen_end;
                }
            }
            self.loops_completed += 1;
            info!("loop {} completed", lp + 1);
        }

        let c = self.factory.counters;
        info!(
            "simulation finished: {} generations, {} mutations in {} breedings, {} duplicate genomes",
            self.generations_completed, c.mutations, c.mutate_calls, c.hash_duplicates
        );
        Ok(self.stats.clone())
    }

    /// Elite seed genomes, then a single configured genome, then random investors.
    pub fn initial_population(&mut self) -> Result<Vec<Investor>, SimError> {
        let cfg = Arc::clone(&self.config);
        let size = cfg.population_size;
        let mut population = Vec::with_capacity(size);

        for dna in &cfg.gen0_elites {
            if population.len() == size {
                break;
            }
            match self.factory.investor_from_dna(dna) {
                Ok(inv) => {
                    self.factory.register(&inv);
                    population.push(inv);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    self.factory.counters.rejected_genomes += 1;
                    warn!("skipping seed genome: {e}");
                }
            }
        }

        if let Some(dna) = &cfg.single_investor_dna {
            while population.len() < size {
                let inv = self.factory.investor_from_dna(dna)?;
                self.factory.register(&inv);
                population.push(inv);
            }
        }

        let mut failures = 0;
        let mut duplicates = 0;
        while population.len() < size {
            let inv = match self.factory.random_investor() {
                Ok(inv) => inv,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    failures += 1;
                    self.factory.counters.rejected_genomes += 1;
                    warn!("rejected random genome: {e}");
                    if failures >= BREED_RETRY_LIMIT {
                        return Err(e);
                    }
                    continue;
                }
            };
            if !self.factory.register(&inv) && !cfg.allow_duplicate_investors {
                self.factory.counters.hash_duplicates += 1;
                duplicates += 1;
                if duplicates < DUPLICATE_RETRY_LIMIT {
                    continue;
                }
                warn!("accepting duplicate investor {}", inv.short_id());
            }
            population.push(inv);
        }
        Ok(population)
    }

    fn check_population(&self) -> Result<(), SimError> {
        if self.investors.len() != self.config.population_size {
            return Err(SimError::PopulationSize {
                expected: self.config.population_size,
                actual: self.investors.len(),
            });
        }
        Ok(())
    }

    /// All investors act on `t3` in parallel. Non-fatal errors are logged.
    fn daily_run(&mut self, t3: NaiveDate, wind_down: bool) -> Result<(), SimError> {
        let data = self.data;
        let investors = &mut self.investors;
        let results: Vec<(String, Result<(), SimError>)> = self.pool.install(|| {
            investors
                .par_iter_mut()
                .map(|inv| (inv.short_id().to_string(), inv.daily_run(t3, data, wind_down)))
                .collect()
        });
        for (id, result) in results {
            match result {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("{t3} {id}: daily run failed: {e}"),
            }
        }
        Ok(())
    }

    fn holding_c2(&self) -> bool {
        self.investors.iter().any(|inv| inv.balance_c2 > MIN_TRADE_BALANCE)
    }

    fn snapshot_portfolio_values(&mut self, date: NaiveDate) -> Result<(), SimError> {
        for inv in &mut self.investors {
            inv.portfolio_value_c1 = inv.portfolio_value(self.data, date)?;
            inv.dt_portfolio_value = Some(date);
        }
        Ok(())
    }

    /// Simulates `start..=end`, then winds down if needed.
    pub fn run_generation(&mut self, start: NaiveDate, end: NaiveDate) -> Result<GenerationRun, SimError> {
        for inv in &mut self.investors {
            inv.reset();
        }

        let mut t3 = start;
        let mut actual_stop = start;
        let mut wind_down = false;
        let mut end_of_data_reached = false;

        while t3 <= end || wind_down {
            self.check_population()?;
            self.daily_run(t3, wind_down)?;

            if wind_down && !self.holding_c2() {
                wind_down = false;
            }
            if t3 == end {
                self.snapshot_portfolio_values(t3)?;
            }

            actual_stop = t3;
            t3 += Duration::days(1);

            if !wind_down && t3 > end && !self.config.enforce_stop_date && self.holding_c2() {
                debug!("{t3}: winding down");
                wind_down = true;
            }
            if t3 >= self.today {
                end_of_data_reached = true;
                break;
            }
        }

        Ok(GenerationRun {
            start,
            end,
            actual_stop,
            end_of_data_reached,
        })
    }

    /// Revalues at the actual stop and returns the best profit.
    fn calculate_max_vals(&mut self, run: &GenerationRun) -> f64 {
        let init = self.config.investor.init_funds;
        if run.actual_stop != run.end {
            for inv in &mut self.investors {
                match inv.portfolio_value(self.data, run.actual_stop) {
                    Ok(pv) => {
                        inv.portfolio_value_c1 = pv;
                        inv.dt_portfolio_value = Some(run.actual_stop);
                    }
                    Err(e) => warn!("{}: keeping end-of-generation value: {e}", inv.short_id()),
                }
            }
        }
        let max_profit = self
            .investors
            .iter()
            .map(|inv| inv.portfolio_value_c1 - init)
            .fold(f64::MIN, f64::max);
        for inv in &mut self.investors {
            inv.max_profit = max_profit;
        }
        max_profit
    }

    fn finish_generation(&mut self, run: &GenerationRun) -> Result<(), SimError> {
        self.calculate_max_vals(run);
        let days = (run.end - run.start).num_days();
        for inv in &mut self.investors {
            inv.calculate_fitness_score(self.bonus.as_ref(), days)?;
        }

        let stats = SimulationStatistics::collect(
            self.generations_completed,
            &self.investors,
            self.config.investor.init_funds,
            run.start,
            run.end,
            run.actual_stop,
            run.end_of_data_reached,
        );
        info!(
            "completed generation {}, {} - {}, unsettled = {:.2} {}, max profit {:.2}",
            self.generations_completed,
            run.start,
            run.actual_stop,
            stats.unsettled_c2,
            self.config.c2,
            stats.max_profit
        );
        self.stats.push(stats);

        update_top_investors(
            &mut self.top_investors,
            &mut self.investors,
            self.generations_completed,
            self.config.evolution.top_investor_count,
        );
        Ok(())
    }

    /// Elites (already sorted by portfolio value) followed by bred children.
    fn next_population(&mut self) -> Result<Vec<Investor>, SimError> {
        let elite_count = self.config.elite_count().min(self.investors.len());
        let mut next: Vec<Investor> = self.investors[..elite_count]
            .iter()
            .map(|inv| {
                let mut elite = inv.clone();
                elite.reset();
                elite.elite = true;
                elite
            })
            .collect();
        let children = self
            .factory
            .new_population(&mut self.investors, self.config.population_size - elite_count)?;
        next.extend(children);
        Ok(next)
    }
}
