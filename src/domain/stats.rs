//! Per-generation statistics and the cross-generation leaderboard.

use chrono::NaiveDate;

use super::investor::Investor;

/// Summary of one completed generation.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationStatistics {
    /// 1-based count of generations completed when recorded.
    pub generation: usize,
    pub profitable_investors: usize,
    /// Mean profit among profitable investors only.
    pub avg_profit: f64,
    pub max_profit: f64,
    pub max_profit_dna: String,
    /// Lots bought by the max-profit investor.
    pub total_buys: usize,
    pub profitable_buys: usize,
    pub total_nil_data_requests: u64,
    pub dt_gen_start: NaiveDate,
    pub dt_gen_stop: NaiveDate,
    /// Last simulated day, after any wind-down.
    pub dt_actual_stop: NaiveDate,
    /// Investors still holding at least one unit of C2.
    pub total_holding_c2: usize,
    pub unsettled_c2: f64,
    pub end_of_data_reached: bool,
    pub stop_loss_count: u32,
}

impl SimulationStatistics {
    /// Gathers the statistics for `population` against the initial funds.
    pub fn collect(
        generation: usize,
        population: &[Investor],
        init_funds: f64,
        dt_gen_start: NaiveDate,
        dt_gen_stop: NaiveDate,
        dt_actual_stop: NaiveDate,
        end_of_data_reached: bool,
    ) -> Self {
        let mut profitable = 0;
        let mut profit_sum = 0.0;
        let mut best: Option<(&Investor, f64)> = None;
        let mut total_holding_c2 = 0;
        let mut unsettled_c2 = 0.0;

        for inv in population {
            let profit = inv.portfolio_value_c1 - init_funds;
            if profit > 0.0 {
                profitable += 1;
                profit_sum += profit;
                if best.is_none_or(|(_, p)| profit > p) {
                    best = Some((inv, profit));
                }
            }
            if inv.balance_c2 >= 1.0 {
                total_holding_c2 += 1;
                unsettled_c2 += inv.balance_c2;
            }
        }

        let (max_profit, max_profit_dna, total_buys, profitable_buys) = match best {
            Some((inv, p)) => (p, inv.dna(), inv.buy_count(), inv.profitable_buy_count()),
            None => (0.0, String::new(), 0, 0),
        };

        SimulationStatistics {
            generation,
            profitable_investors: profitable,
            avg_profit: if profitable > 0 {
                profit_sum / profitable as f64
            } else {
                0.0
            },
            max_profit,
            max_profit_dna,
            total_buys,
            profitable_buys,
            total_nil_data_requests: population.iter().map(Investor::total_nil_data).sum(),
            dt_gen_start,
            dt_gen_stop,
            dt_actual_stop,
            total_holding_c2,
            unsettled_c2,
            end_of_data_reached,
            stop_loss_count: population.iter().map(|i| i.stop_loss_count).sum(),
        }
    }
}

/// A leaderboard entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TopInvestor {
    pub portfolio_value: f64,
    pub dt_portfolio_value: Option<NaiveDate>,
    pub dna: String,
    pub generation: usize,
    pub balance_c1: f64,
    pub balance_c2: f64,
    pub stop_loss_count: u32,
}

impl TopInvestor {
    pub fn from_investor(inv: &Investor, generation: usize) -> Self {
        TopInvestor {
            portfolio_value: inv.portfolio_value_c1,
            dt_portfolio_value: inv.dt_portfolio_value,
            dna: inv.dna(),
            generation,
            balance_c1: inv.balance_c1,
            balance_c2: inv.balance_c2,
            stop_loss_count: inv.stop_loss_count,
        }
    }
}

/// Sorts `population` by portfolio value, descending, then merges its best
/// `limit` investors into `top`, keeping the overall best `limit`.
pub fn update_top_investors(
    top: &mut Vec<TopInvestor>,
    population: &mut [Investor],
    generation: usize,
    limit: usize,
) {
    population.sort_by(|a, b| b.portfolio_value_c1.total_cmp(&a.portfolio_value_c1));
    top.extend(
        population
            .iter()
            .take(limit)
            .map(|inv| TopInvestor::from_investor(inv, generation)),
    );
    top.sort_by(|a, b| b.portfolio_value.total_cmp(&a.portfolio_value));
    top.truncate(limit);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::SimConfig;
    use crate::domain::course_of_action::Strategy;
    use crate::domain::dna::InfluencerDna;
    use crate::domain::influencer::Influencer;
    use crate::domain::investment::Investment;
    use crate::domain::subclass::{InfluencerSubclass, LocaleType, Predictor};
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Arc;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, m, day).unwrap()
    }

    fn investor(cfg: &Arc<SimConfig>, d1: i64, pv: f64) -> Investor {
        let sc = InfluencerSubclass {
            metric: "GDP".into(),
            name: "GDP".into(),
            subclass: "LSMInfluencer".into(),
            locale_type: LocaleType::None,
            predictor: Predictor::SingleValGT,
            min_delta1: -100,
            max_delta1: -30,
            min_delta2: -20,
            max_delta2: -1,
            fitness_w1: 0.5,
            fitness_w2: 0.5,
            hold_window_pos: 0.0,
            hold_window_neg: 0.0,
            blocs: Vec::new(),
        };
        let gene = InfluencerDna::new("LSMInfluencer", "GDP").with_deltas(d1, -5);
        let mut rng = StdRng::seed_from_u64(0);
        let inf = Influencer::from_gene(1, &sc, &gene, &mut rng).unwrap();
        let mut inv = Investor::new(Arc::clone(cfg), Strategy::MajorityRules, 0.5, 0.5, vec![inf]);
        inv.portfolio_value_c1 = pv;
        inv
    }

    fn config() -> Arc<SimConfig> {
        Arc::new(SimConfig::new("USD", "JPY", d(1, 1), d(12, 31)))
    }

    #[test]
    fn statistics_summarize_population() {
        let cfg = config();
        let mut rich = investor(&cfg, -40, 1200.0);
        let mut lot = Investment::buy(d(2, 1), 130.0, 100.0, 0.0);
        lot.sell_chunk(d(3, 1), 120.0, 13000.0, 0.0);
        rich.investments.push(lot);
        rich.investments.push(Investment::buy(d(4, 1), 130.0, 100.0, 0.0));
        rich.balance_c2 = 13000.0;
        rich.stop_loss_count = 1;

        let modest = investor(&cfg, -50, 1100.0);
        let poor = investor(&cfg, -60, 900.0);

        let s = SimulationStatistics::collect(3, &[modest, rich.clone(), poor], 1000.0, d(1, 1), d(12, 31), d(12, 31), false);
        assert_eq!(s.generation, 3);
        assert_eq!(s.profitable_investors, 2);
        assert_relative_eq!(s.avg_profit, 150.0);
        assert_relative_eq!(s.max_profit, 200.0);
        assert_eq!(s.max_profit_dna, rich.dna());
        assert_eq!(s.total_buys, 2);
        assert_eq!(s.profitable_buys, 1);
        assert_eq!(s.total_holding_c2, 1);
        assert_relative_eq!(s.unsettled_c2, 13000.0);
        assert_eq!(s.stop_loss_count, 1);
    }

    #[test]
    fn statistics_without_profit() {
        let cfg = config();
        let s = SimulationStatistics::collect(1, &[investor(&cfg, -40, 950.0)], 1000.0, d(1, 1), d(6, 1), d(6, 3), true);
        assert_eq!(s.profitable_investors, 0);
        assert_eq!(s.avg_profit, 0.0);
        assert!(s.max_profit_dna.is_empty());
        assert!(s.end_of_data_reached);
    }

    #[test]
    fn top_investors_keep_best_across_generations() {
        let cfg = config();
        let mut top = Vec::new();
        let mut gen1 = vec![investor(&cfg, -40, 1100.0), investor(&cfg, -50, 1300.0), investor(&cfg, -60, 1000.0)];
        update_top_investors(&mut top, &mut gen1, 1, 2);
        assert_eq!(gen1[0].portfolio_value_c1, 1300.0);
        assert_eq!(top.len(), 2);

        let mut gen2 = vec![investor(&cfg, -70, 1200.0), investor(&cfg, -80, 900.0)];
        update_top_investors(&mut top, &mut gen2, 2, 2);
        let values: Vec<f64> = top.iter().map(|t| t.portfolio_value).collect();
        assert_eq!(values, vec![1300.0, 1200.0]);
        assert_eq!(top[0].generation, 1);
        assert_eq!(top[1].generation, 2);
    }
}
