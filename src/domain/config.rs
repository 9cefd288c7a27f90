//! Run configuration passed explicitly to the factory, investors and simulator.

use chrono::NaiveDate;

use super::course_of_action::Strategy;
use super::generation::GenerationDuration;

/// Investor economics and genome bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct InvestorConfig {
    pub init_funds: f64,
    pub std_investment: f64,
    /// Fraction of value that may be lost before a forced liquidation.
    pub stop_loss: f64,
    /// Flat fee charged once per buy and once per sell.
    pub txn_fee: f64,
    /// Proportional fee on the C1 amount of each buy and sell chunk.
    pub txn_fee_factor: f64,
    pub min_influencers: usize,
    pub max_influencers: usize,
    pub inv_w1: f64,
    pub inv_w2: f64,
    pub strategy: Strategy,
    /// Noise factor applied to a metric's standard deviation.
    pub std_dev_variation_factor: f64,
}

impl Default for InvestorConfig {
    fn default() -> Self {
        InvestorConfig {
            init_funds: 1000.0,
            std_investment: 100.0,
            stop_loss: 0.1,
            txn_fee: 0.0,
            txn_fee_factor: 0.0,
            min_influencers: 1,
            max_influencers: 5,
            inv_w1: 0.5,
            inv_w2: 0.5,
            strategy: Strategy::DistributedDecision,
            std_dev_variation_factor: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvolutionConfig {
    /// Percent chance (1..=100) that a bred child is mutated.
    pub mutation_rate: u32,
    pub preserve_elite: bool,
    pub preserve_elite_pct: f64,
    pub top_investor_count: usize,
    pub bonus_plan: bool,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        EvolutionConfig {
            mutation_rate: 1,
            preserve_elite: false,
            preserve_elite_pct: 0.0,
            top_investor_count: 10,
            bonus_plan: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    pub c1: String,
    pub c2: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub generations: usize,
    /// When present, overrides `generations`.
    pub generation_duration: Option<GenerationDuration>,
    pub loop_count: usize,
    pub population_size: usize,
    pub seed: Option<u64>,
    /// 0 selects the rayon default.
    pub worker_threads: usize,
    /// Disables wind-down past the generation end.
    pub enforce_stop_date: bool,
    pub allow_duplicate_investors: bool,
    pub investor: InvestorConfig,
    pub evolution: EvolutionConfig,
    /// Every generation-0 investor is built from this genome.
    pub single_investor_dna: Option<String>,
    /// Genomes seeded into generation 0.
    pub gen0_elites: Vec<String>,
}

impl SimConfig {
    pub fn new(c1: &str, c2: &str, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        SimConfig {
            c1: c1.to_string(),
            c2: c2.to_string(),
            start_date,
            end_date,
            generations: 1,
            generation_duration: None,
            loop_count: 1,
            population_size: 10,
            seed: None,
            worker_threads: 0,
            enforce_stop_date: false,
            allow_duplicate_investors: false,
            investor: InvestorConfig::default(),
            evolution: EvolutionConfig::default(),
            single_investor_dna: None,
            gen0_elites: Vec::new(),
        }
    }

    /// Number of investors carried unchanged into the next generation.
    pub fn elite_count(&self) -> usize {
        if !self.evolution.preserve_elite {
            return 0;
        }
        let n = (self.evolution.preserve_elite_pct * self.population_size as f64 / 100.0).round();
        (n.max(0.0) as usize).min(self.population_size)
    }

    pub fn generation_count(&self) -> usize {
        match &self.generation_duration {
            Some(d) => d.generation_count(self.start_date, self.end_date),
            None => self.generations.max(1),
        }
    }
}
