//! Investor construction and the genetic operators.
//!
//! The factory owns the run's only random number generator, so every draw
//! (random genomes, selection, crossover, mutation) happens in a fixed order
//! and seeded runs are reproducible.

use log::warn;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use super::config::SimConfig;
use super::course_of_action::Strategy;
use super::dna::{DnaMap, InfluencerDna, InvestorDna};
use super::error::SimError;
use super::influencer::Influencer;
use super::investor::Investor;
use super::subclass::{SUBCLASS_NAMES, SubclassTable};

/// Attempts to draw a second parent distinct from the first.
pub const PARENT_RETRY_LIMIT: usize = 10;

/// Attempts to build one child before giving up.
pub const BREED_RETRY_LIMIT: usize = 10;

/// Re-breeds allowed for a child whose genome was already seen.
pub const DUPLICATE_RETRY_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FactoryCounters {
    pub mutate_calls: u64,
    pub mutations: u64,
    pub hash_duplicates: u64,
    pub rejected_genomes: u64,
}

/// The investor-level DNA fields a mutation can touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gene {
    Strategy,
    InvW1,
    InvW2,
    Influencers,
}

const GENES: [Gene; 4] = [Gene::Strategy, Gene::InvW1, Gene::InvW2, Gene::Influencers];

pub struct Factory {
    config: Arc<SimConfig>,
    subclasses: Arc<SubclassTable>,
    rng: StdRng,
    next_influencer_id: u64,
    seen: HashSet<String>,
    pub counters: FactoryCounters,
}

impl Factory {
    pub fn new(config: Arc<SimConfig>, subclasses: Arc<SubclassTable>) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Factory {
            config,
            subclasses,
            rng,
            next_influencer_id: 1,
            seen: HashSet::new(),
            counters: FactoryCounters::default(),
        }
    }

    pub fn config(&self) -> &Arc<SimConfig> {
        &self.config
    }

    pub fn subclasses(&self) -> &SubclassTable {
        &self.subclasses
    }

    fn default_subclass(&self) -> &'static str {
        SUBCLASS_NAMES[0]
    }

    /// Builds an influencer from a gene. The metric must be in the subclass table.
    pub fn new_influencer(&mut self, gene: &InfluencerDna) -> Result<Influencer, SimError> {
        let subclass = self.subclasses.get(gene.metric())?;
        let id = self.next_influencer_id;
        let inf = Influencer::from_gene(id, subclass, gene, &mut self.rng)?;
        self.next_influencer_id += 1;
        Ok(inf)
    }

    pub fn investor_from_genome(&mut self, genome: &InvestorDna) -> Result<Investor, SimError> {
        let mut metrics = HashSet::new();
        let mut influencers = Vec::with_capacity(genome.influencers.len());
        for gene in &genome.influencers {
            if !metrics.insert(gene.metric().to_string()) {
                return Err(SimError::malformed(
                    &genome.canonical(),
                    format!("metric {} appears twice", gene.metric()),
                ));
            }
            influencers.push(self.new_influencer(gene)?);
        }
        if influencers.is_empty() {
            return Err(SimError::malformed(&genome.canonical(), "no influencers"));
        }
        Ok(Investor::new(
            Arc::clone(&self.config),
            genome.strategy,
            genome.inv_w1,
            genome.inv_w2,
            influencers,
        ))
    }

    pub fn investor_from_dna(&mut self, dna: &str) -> Result<Investor, SimError> {
        let genome = InvestorDna::parse(dna)?;
        self.investor_from_genome(&genome)
    }

    /// A random team of distinct metrics with the configured weights and strategy.
    pub fn random_investor(&mut self) -> Result<Investor, SimError> {
        let cfg = &self.config.investor;
        let available = self.subclasses.len();
        let max = cfg.max_influencers.min(available);
        let min = cfg.min_influencers.min(max);
        if max == 0 {
            return Err(SimError::invalid_config(
                "investor",
                "max_influencers",
                "no metric subclasses available",
            ));
        }
        let count = self.rng.gen_range(min.max(1)..=max);

        let mut metrics: Vec<String> = self.subclasses.metrics().iter().map(|m| m.to_string()).collect();
        metrics.shuffle(&mut self.rng);
        let subclass = self.default_subclass();
        let genome = InvestorDna {
            strategy: cfg.strategy,
            inv_w1: cfg.inv_w1,
            inv_w2: cfg.inv_w2,
            influencers: metrics
                .iter()
                .take(count)
                .map(|m| InfluencerDna::new(subclass, m))
                .collect(),
        };
        self.investor_from_genome(&genome)
    }

    /// Records an identity; false when it was already present.
    pub fn register(&mut self, investor: &Investor) -> bool {
        self.seen.insert(investor.id.clone())
    }

    pub fn is_known(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Fitness-proportionate selection, skipping `used`. Falls back to the
    /// last individual when rounding leaves the spin unreached.
    pub fn roulette_select(
        &mut self,
        population: &[Investor],
        fitness_sum: f64,
        used: Option<usize>,
    ) -> usize {
        let spin = self.rng.r#gen::<f64>() * fitness_sum;
        let mut running = 0.0;
        for (i, inv) in population.iter().enumerate() {
            if Some(i) == used {
                continue;
            }
            running += inv.fitness;
            if running >= spin {
                return i;
            }
        }
        population.len().saturating_sub(1)
    }

    /// Two distinct parent indices.
    pub fn select_parents(&mut self, population: &[Investor], fitness_sum: f64) -> (usize, usize) {
        let p1 = self.roulette_select(population, fitness_sum, None);
        let mut p2 = p1;
        for _ in 0..PARENT_RETRY_LIMIT {
            p2 = self.roulette_select(population, fitness_sum, Some(p1));
            if p2 != p1 {
                break;
            }
        }
        if p2 == p1 {
            p2 = (0..population.len()).find(|&j| j != p1).unwrap_or(p1);
        }
        (p1, p2)
    }

    /// Field-level crossover of two parents' genomes.
    pub fn crossover(&mut self, parent1: &Investor, parent2: &Investor) -> InvestorDna {
        let g1 = parent1.genome();
        let g2 = parent2.genome();
        let parents = [&g1, &g2];

        let (inv_w1, inv_w2) = if self.rng.gen_bool(0.5) {
            let w1 = parents[self.rng.gen_range(0..2)].inv_w1;
            (w1, 1.0 - w1)
        } else {
            let w2 = parents[self.rng.gen_range(0..2)].inv_w2;
            (1.0 - w2, w2)
        };

        let strategy = match self.rng.gen_range(0..3) {
            0 => g1.strategy,
            1 => g2.strategy,
            _ => Strategy::ALL[self.rng.gen_range(0..Strategy::ALL.len())],
        };

        let n1 = g1.influencers.len();
        let n2 = g2.influencers.len();
        let n = if self.rng.gen_bool(0.5) { n1 } else { n2 }.clamp(n1.min(n2), n1.max(n2));

        let mut by_metric: BTreeMap<&str, Vec<&InfluencerDna>> = BTreeMap::new();
        for gene in g1.influencers.iter().chain(g2.influencers.iter()) {
            by_metric.entry(gene.metric()).or_default().push(gene);
        }
        let mut candidates: Vec<Vec<&InfluencerDna>> = by_metric.into_values().collect();
        candidates.shuffle(&mut self.rng);

        let influencers = candidates
            .into_iter()
            .take(n)
            .filter_map(|genes| match genes.as_slice() {
                [a, b, ..] => Some(self.blend_genes(a, b)),
                [a] => Some((*a).clone()),
                [] => None,
            })
            .collect();

        InvestorDna {
            strategy,
            inv_w1,
            inv_w2,
            influencers,
        }
    }

    /// Alternates each key between the two genes, starting from a random one.
    fn blend_genes(&mut self, a: &InfluencerDna, b: &InfluencerDna) -> InfluencerDna {
        let maps = [&a.params, &b.params];
        let mut pick = self.rng.gen_range(0..2);
        let mut params = DnaMap::new();
        for key in a.params.keys() {
            let value = maps[pick]
                .get(key)
                .or_else(|| a.params.get(key))
                .cloned();
            if let Some(v) = value {
                params.insert(key.clone(), v);
            }
            pick = 1 - pick;
        }
        InfluencerDna {
            subclass: a.subclass.clone(),
            params,
        }
    }

    /// With probability `mutation_rate`%, changes one investor-level field.
    pub fn mutate(&mut self, genome: &mut InvestorDna) {
        self.counters.mutate_calls += 1;
        if self.rng.gen_range(1..=100) > self.config.evolution.mutation_rate {
            return;
        }
        self.counters.mutations += 1;

        match GENES[self.rng.gen_range(0..GENES.len())] {
            Gene::InvW1 => {
                let w = self.redraw_weight(genome.inv_w1);
                genome.inv_w1 = w;
                genome.inv_w2 = 1.0 - w;
            }
            Gene::InvW2 => {
                let w = self.redraw_weight(genome.inv_w2);
                genome.inv_w2 = w;
                genome.inv_w1 = 1.0 - w;
            }
            Gene::Strategy => {
                genome.strategy = Strategy::ALL[self.rng.gen_range(0..Strategy::ALL.len())];
            }
            Gene::Influencers => self.mutate_influencers(genome),
        }
    }

    fn redraw_weight(&mut self, current: f64) -> f64 {
        loop {
            let w: f64 = self.rng.r#gen();
            if w != current {
                return w;
            }
        }
    }

    fn unused_metric(&mut self, genome: &InvestorDna) -> Option<String> {
        let used: HashSet<&str> = genome.influencers.iter().map(InfluencerDna::metric).collect();
        let available: Vec<&str> = self
            .subclasses
            .metrics()
            .into_iter()
            .filter(|m| !used.contains(m))
            .collect();
        available.choose(&mut self.rng).map(|m| m.to_string())
    }

    fn mutate_influencers(&mut self, genome: &mut InvestorDna) {
        let count = genome.influencers.len();
        let cfg = &self.config.investor;
        let (min, max) = (cfg.min_influencers, cfg.max_influencers);
        let subclass = self.default_subclass();

        if self.rng.gen_bool(0.5) {
            if self.rng.gen_bool(0.5) {
                if count < max && count < self.subclasses.len() {
                    if let Some(m) = self.unused_metric(genome) {
                        genome.influencers.push(InfluencerDna::new(subclass, &m));
                    }
                }
            } else if count > min {
                let idx = self.rng.gen_range(0..count);
                genome.influencers.remove(idx);
            }
        } else if count > 0 {
            let idx = self.rng.gen_range(0..count);
            let metric = self
                .unused_metric(genome)
                .unwrap_or_else(|| genome.influencers[idx].metric().to_string());
            let subclass = genome.influencers[idx].subclass.clone();
            genome.influencers[idx] = InfluencerDna::new(&subclass, &metric);
        }
    }

    /// Crossover, mutation and construction of one child.
    pub fn breed_new_investor(
        &mut self,
        parent1: &Investor,
        parent2: &Investor,
    ) -> Result<Investor, SimError> {
        let mut genome = self.crossover(parent1, parent2);
        self.mutate(&mut genome);
        self.investor_from_genome(&genome)
    }

    /// Breeds `count` children from `population`, whose fitness must already
    /// be computed. Parents have their `parented` counter incremented.
    pub fn new_population(
        &mut self,
        population: &mut [Investor],
        count: usize,
    ) -> Result<Vec<Investor>, SimError> {
        if population.len() < 2 {
            return Err(SimError::PopulationSize {
                expected: 2,
                actual: population.len(),
            });
        }
        let fitness_sum: f64 = population.iter().map(|inv| inv.fitness).sum();
        let mut children = Vec::with_capacity(count);

        while children.len() < count {
            let (p1, p2) = self.select_parents(population, fitness_sum);
            population[p1].parented += 1;
            population[p2].parented += 1;

            let child = self.breed_unique(&population[p1], &population[p2])?;
            children.push(child);
        }
        Ok(children)
    }

    fn breed_unique(&mut self, p1: &Investor, p2: &Investor) -> Result<Investor, SimError> {
        let mut duplicates = 0;
        let mut failures = 0;
        loop {
            let child = match self.breed_new_investor(p1, p2) {
                Ok(c) => c,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    self.counters.rejected_genomes += 1;
                    failures += 1;
                    warn!("rejected bred genome: {e}");
                    if failures >= BREED_RETRY_LIMIT {
                        return Err(e);
                    }
                    continue;
                }
            };
            if self.config.allow_duplicate_investors || self.register(&child) {
                return Ok(child);
            }
            self.counters.hash_duplicates += 1;
            duplicates += 1;
            if duplicates >= DUPLICATE_RETRY_LIMIT {
                warn!(
                    "accepting duplicate investor {} after {duplicates} attempts",
                    child.short_id()
                );
                return Ok(child);
            }
        }
    }
}
