//! An investor: influencer votes, C1/C2 balances and a ledger of lots.

use chrono::{Duration, NaiveDate};
use log::{debug, warn};
use std::sync::Arc;

use super::config::SimConfig;
use super::course_of_action::{Action, CourseOfAction, Strategy};
use super::dna::InvestorDna;
use super::error::SimError;
use super::fitness::{self, FitnessBonus};
use super::influencer::{Influencer, PredictionContext};
use super::investment::{Investment, MIN_EXCHANGE_RATE, SETTLE_EPSILON};
use super::record::FieldSelector;
use crate::ports::data_port::DataPort;

/// Balances below this are not traded.
pub const MIN_TRADE_BALANCE: f64 = 1.0;

/// Days searched backwards for a valuation rate across market closures.
const RATE_LOOKBACK_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct Investor {
    /// Identity hash of the canonical DNA.
    pub id: String,
    pub config: Arc<SimConfig>,
    pub strategy: Strategy,
    pub w1: f64,
    pub w2: f64,
    pub influencers: Vec<Influencer>,
    pub investments: Vec<Investment>,
    pub balance_c1: f64,
    pub balance_c2: f64,
    pub stop_loss_threshold: f64,
    pub stop_loss_count: u32,
    /// Portfolio value in C1 on the last day of the generation.
    pub portfolio_value_c1: f64,
    pub dt_portfolio_value: Option<NaiveDate>,
    pub max_profit: f64,
    pub fitness: f64,
    fitness_calculated: bool,
    /// Times selected as a parent.
    pub parented: u32,
    pub elite: bool,
}

impl Investor {
    pub fn new(
        config: Arc<SimConfig>,
        strategy: Strategy,
        w1: f64,
        w2: f64,
        influencers: Vec<Influencer>,
    ) -> Self {
        let mut inv = Investor {
            id: String::new(),
            strategy,
            w1,
            w2,
            influencers,
            investments: Vec::new(),
            balance_c1: 0.0,
            balance_c2: 0.0,
            stop_loss_threshold: 0.0,
            stop_loss_count: 0,
            portfolio_value_c1: 0.0,
            dt_portfolio_value: None,
            max_profit: 0.0,
            fitness: 0.0,
            fitness_calculated: false,
            parented: 0,
            elite: false,
            config,
        };
        inv.id = inv.genome().identity();
        inv.reset();
        inv
    }

    pub fn genome(&self) -> InvestorDna {
        InvestorDna {
            strategy: self.strategy,
            inv_w1: self.w1,
            inv_w2: self.w2,
            influencers: self.influencers.iter().map(Influencer::gene).collect(),
        }
    }

    /// Canonical DNA including the identity hash.
    pub fn dna(&self) -> String {
        self.genome().encode()
    }

    /// Fresh funds and an empty ledger; genes are kept.
    pub fn reset(&mut self) {
        let cfg = &self.config.investor;
        self.balance_c1 = cfg.init_funds;
        self.balance_c2 = 0.0;
        self.stop_loss_threshold = (1.0 - cfg.stop_loss) * cfg.init_funds;
        self.stop_loss_count = 0;
        self.investments.clear();
        self.portfolio_value_c1 = 0.0;
        self.dt_portfolio_value = None;
        self.max_profit = 0.0;
        self.fitness = 0.0;
        self.fitness_calculated = false;
        self.parented = 0;
        for inf in &mut self.influencers {
            inf.predictions.clear();
            inf.nil_data_count = 0;
            inf.fitness = 0.0;
        }
    }

    fn rate_selector(&self) -> FieldSelector {
        FieldSelector::exchange_rate(&self.config.c1, &self.config.c2)
    }

    /// C2-per-C1 close on `date`, if the market was open.
    pub fn exchange_rate(&self, data: &dyn DataPort, date: NaiveDate) -> Result<Option<f64>, SimError> {
        let sel = self.rate_selector();
        Ok(data
            .select(date, std::slice::from_ref(&sel))?
            .and_then(|rec| rec.value(&sel)))
    }

    fn valuation_rate(&self, data: &dyn DataPort, date: NaiveDate) -> Result<f64, SimError> {
        for back in 0..=RATE_LOOKBACK_DAYS {
            let d = date - Duration::days(back);
            if let Some(rate) = self.exchange_rate(data, d)? {
                if back > 0 {
                    warn!("{}: no exchange rate on {date}, valuing at {d}", self.short_id());
                }
                return Ok(rate);
            }
        }
        Err(SimError::ExchangeRateNotFound {
            date,
            field: self.rate_selector().field_name(),
        })
    }

    /// `BalanceC1 + BalanceC2 / rate`.
    pub fn portfolio_value(&self, data: &dyn DataPort, date: NaiveDate) -> Result<f64, SimError> {
        if self.balance_c2 == 0.0 {
            return Ok(self.balance_c1);
        }
        let rate = self.valuation_rate(data, date)?;
        Ok(self.balance_c1 + self.balance_c2 / rate)
    }

    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(8)]
    }

    pub fn total_nil_data(&self) -> u64 {
        self.influencers.iter().map(|i| i.nil_data_count).sum()
    }

    pub fn buy_count(&self) -> usize {
        self.investments.iter().filter(|i| !i.bookkeeping).count()
    }

    /// Lots with at least one profitable chunk.
    pub fn profitable_buy_count(&self) -> usize {
        self.investments
            .iter()
            .filter(|i| !i.bookkeeping && i.chunks.iter().any(|c| c.profitable))
            .count()
    }

    /// Stop-loss check, then influencer polling and vote resolution.
    pub fn decide_course_of_action(
        &mut self,
        t3: NaiveDate,
        data: &dyn DataPort,
    ) -> Result<CourseOfAction, SimError> {
        let pv = self.portfolio_value(data, t3)?;
        if pv < self.stop_loss_threshold {
            self.execute_sell(t3, 1.0, data)?;
            self.stop_loss_threshold = (1.0 - self.config.investor.stop_loss) * self.balance_c1;
            self.stop_loss_count += 1;
            debug!(
                "{} {}: stop loss at PV {:.2}, new threshold {:.2}",
                t3,
                self.short_id(),
                pv,
                self.stop_loss_threshold
            );
            return Ok(CourseOfAction::stop_loss());
        }

        let config = Arc::clone(&self.config);
        let ctx = PredictionContext {
            data,
            c1: &config.c1,
            c2: &config.c2,
            noise_factor: config.investor.std_dev_variation_factor,
        };

        let mut coa = CourseOfAction::default();
        for inf in &mut self.influencers {
            match inf.get_prediction(t3, &ctx) {
                Ok(p) => coa.tally(p.action, p.probability, p.weight),
                Err(e) if e.is_nil_data() => coa.tally(Action::Abstain, 1.0, 1.0),
                Err(e) => return Err(e),
            }
        }
        coa.resolve(self.strategy);
        debug!(
            "{} {}: {} {:.2} (buy {} sell {} hold {} abstain {})",
            t3,
            self.short_id(),
            coa.action,
            coa.action_pct,
            coa.buy_votes,
            coa.sell_votes,
            coa.hold_votes,
            coa.abstains
        );
        Ok(coa)
    }

    /// One simulated day. Buys are suppressed during wind-down.
    /// Days without an exchange rate are market closures and are skipped.
    pub fn daily_run(
        &mut self,
        t3: NaiveDate,
        data: &dyn DataPort,
        wind_down: bool,
    ) -> Result<(), SimError> {
        let Some(rate) = self.exchange_rate(data, t3)? else {
            return Ok(());
        };
        let coa = self.decide_course_of_action(t3, data)?;
        if coa.stop_loss {
            return Ok(());
        }
        match coa.action {
            Action::Buy if !wind_down => self.execute_buy(t3, coa.action_pct, rate),
            Action::Sell => self.execute_sell(t3, coa.action_pct, data),
            _ => Ok(()),
        }
    }

    /// Spends `pct` of the standard investment (or all remaining C1 if less) on C2.
    pub fn execute_buy(&mut self, t3: NaiveDate, pct: f64, rate: f64) -> Result<(), SimError> {
        if self.balance_c1 < MIN_TRADE_BALANCE {
            return Ok(());
        }
        if rate < MIN_EXCHANGE_RATE {
            return Err(SimError::InvalidExchangeRate { date: t3, rate });
        }
        let cfg = &self.config.investor;
        let wanted = if self.balance_c1 < cfg.std_investment {
            self.balance_c1
        } else {
            cfg.std_investment * pct
        };
        // Purchase plus fees never exceeds the C1 balance.
        let affordable = (self.balance_c1 - cfg.txn_fee) / (1.0 + cfg.txn_fee_factor);
        let t3_c1 = wanted.min(affordable);
        if t3_c1 <= 0.0 {
            return Ok(());
        }
        let fee = t3_c1 * cfg.txn_fee_factor + cfg.txn_fee;

        let mut lot = Investment::buy(t3, rate, t3_c1, fee);
        self.balance_c1 -= t3_c1 + fee;
        self.balance_c2 += lot.t3_c2_buy;
        lot.t3_balance_c1 = self.balance_c1;
        lot.t3_balance_c2 = self.balance_c2;
        debug!(
            "{} {}: buy {:.2} {} -> {:.2} {} at {:.4}",
            t3,
            self.short_id(),
            t3_c1,
            self.config.c1,
            lot.t3_c2_buy,
            self.config.c2,
            rate
        );
        self.investments.push(lot);
        Ok(())
    }

    /// Sells `pct` of the C2 balance.
    pub fn execute_sell(&mut self, t4: NaiveDate, pct: f64, data: &dyn DataPort) -> Result<(), SimError> {
        if self.balance_c2 < MIN_TRADE_BALANCE {
            return Ok(());
        }
        let amount = pct * self.balance_c2;
        self.settle_investment(t4, amount, data)
    }

    /// Liquidates `amount` C2 across open lots, greatest loss first.
    ///
    /// Every open lot is stamped with today's rate and the lots are ordered by
    /// that rate relative to their purchase rate, descending. Each chunk sold
    /// finalizes the matching prediction on every influencer.
    pub fn settle_investment(
        &mut self,
        t4: NaiveDate,
        mut amount: f64,
        data: &dyn DataPort,
    ) -> Result<(), SimError> {
        let er_t4 = self
            .exchange_rate(data, t4)?
            .ok_or_else(|| SimError::ExchangeRateNotFound {
                date: t4,
                field: self.rate_selector().field_name(),
            })?;
        if er_t4 < MIN_EXCHANGE_RATE {
            return Err(SimError::InvalidExchangeRate { date: t4, rate: er_t4 });
        }

        for lot in self.investments.iter_mut().filter(|l| l.is_open()) {
            lot.er_t4 = er_t4;
        }
        let mut order: Vec<usize> = (0..self.investments.len())
            .filter(|&j| self.investments[j].is_open())
            .collect();
        order.sort_by(|&a, &b| {
            self.investments[b]
                .loss_ratio()
                .total_cmp(&self.investments[a].loss_ratio())
        });

        let fee_factor = self.config.investor.txn_fee_factor;
        let mut sold_any = false;
        for j in order {
            if amount <= SETTLE_EPSILON {
                break;
            }
            let chunk = self.investments[j].sell_chunk(t4, er_t4, amount, fee_factor);
            amount -= chunk.t4_c2_sold;
            self.balance_c1 += chunk.t4_c1 - chunk.fee;
            self.balance_c2 -= chunk.t4_c2_sold;
            sold_any = true;

            let lot = &mut self.investments[j];
            lot.t4_balance_c1 = self.balance_c1;
            lot.t4_balance_c2 = self.balance_c2;
            let t3 = lot.t3;
            debug!(
                "{} {}: sell {:.2} {} -> {:.2} {} (lot {}, {})",
                t4,
                self.short_id(),
                chunk.t4_c2_sold,
                self.config.c2,
                chunk.t4_c1,
                self.config.c1,
                t3,
                if chunk.profitable { "gain" } else { "loss" }
            );
            for inf in &mut self.influencers {
                inf.finalize_prediction(t3, t4, chunk.profitable);
            }
        }

        let flat = self.config.investor.txn_fee.min(self.balance_c1.max(0.0));
        if sold_any && flat > 0.0 {
            self.balance_c1 -= flat;
            self.investments.push(Investment::fee_entry(t4, er_t4, flat));
        }
        Ok(())
    }

    /// `W1 * profit / max_profit + W2 * correctness`, floored at 0, scaled by
    /// the bonus policy and cached for the rest of the generation.
    pub fn calculate_fitness_score(
        &mut self,
        bonus: &dyn FitnessBonus,
        generation_days: i64,
    ) -> Result<f64, SimError> {
        if self.fitness_calculated {
            return Ok(self.fitness);
        }
        let invalid = |what: &str| SimError::InvalidFitness {
            investor: self.id.clone(),
            reason: format!("{what} is not finite"),
        };

        let correctness = fitness::correctness(&self.investments);
        let init = self.config.investor.init_funds;
        let profit = self.portfolio_value_c1 - init;
        if !profit.is_finite() {
            return Err(invalid("profit"));
        }
        let weighted_profit = if self.max_profit > 0.0 {
            self.w1 * profit / self.max_profit
        } else {
            0.0
        };
        if !weighted_profit.is_finite() {
            return Err(invalid("weighted profit"));
        }

        let mut score = (weighted_profit + self.w2 * correctness).max(0.0);
        let ar = fitness::annualized_return(init, self.portfolio_value_c1, generation_days);
        score *= bonus.multiplier(ar);
        if !score.is_finite() {
            return Err(invalid("fitness"));
        }

        self.fitness = score;
        self.fitness_calculated = true;
        Ok(score)
    }

    pub fn is_fitness_calculated(&self) -> bool {
        self.fitness_calculated
    }
}
