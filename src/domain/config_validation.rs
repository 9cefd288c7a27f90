//! Configuration validation.
//!
//! Validates the raw configuration before a [`SimConfig`](super::config::SimConfig)
//! is built, and the metric subclass table once it is loaded.

use crate::domain::error::SimError;
use crate::domain::generation::GenerationDuration;
use crate::domain::subclass::{LocaleType, SubclassTable};
use crate::ports::config_port::ConfigPort;

pub fn validate_sim_config(config: &dyn ConfigPort) -> Result<(), SimError> {
    validate_currencies(config)?;
    validate_dates(config)?;
    validate_generations(config)?;
    validate_population(config)?;
    validate_funds(config)?;
    validate_stop_loss(config)?;
    validate_fees(config)?;
    validate_influencer_bounds(config)?;
    validate_weights(config)?;
    validate_mutation_rate(config)?;
    validate_elite_pct(config)?;
    Ok(())
}

fn validate_currencies(config: &dyn ConfigPort) -> Result<(), SimError> {
    let c1 = config.require_string("simulation", "c1")?;
    let c2 = config.require_string("simulation", "c2")?;
    if c1.trim() == c2.trim() {
        return Err(SimError::invalid_config("simulation", "c2", "c1 and c2 must differ"));
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), SimError> {
    let start = config.require_date("simulation", "start_date")?;
    let end = config.require_date("simulation", "end_date")?;
    if start >= end {
        return Err(SimError::invalid_config(
            "simulation",
            "start_date",
            "start_date must be before end_date",
        ));
    }
    Ok(())
}

fn validate_generations(config: &dyn ConfigPort) -> Result<(), SimError> {
    if config.get_int("simulation", "loop_count", 1) < 1 {
        return Err(SimError::invalid_config(
            "simulation",
            "loop_count",
            "loop_count must be at least 1",
        ));
    }
    if let Some(text) = config.get_string("simulation", "generation_duration") {
        if !text.trim().is_empty() {
            text.parse::<GenerationDuration>()?;
            return Ok(());
        }
    }
    if config.get_int("simulation", "generations", 1) < 1 {
        return Err(SimError::invalid_config(
            "simulation",
            "generations",
            "generations must be at least 1",
        ));
    }
    Ok(())
}

fn validate_population(config: &dyn ConfigPort) -> Result<(), SimError> {
    if config.get_int("simulation", "population_size", 10) < 2 {
        return Err(SimError::invalid_config(
            "simulation",
            "population_size",
            "population_size must be at least 2",
        ));
    }
    if config.get_int("simulation", "worker_threads", 0) < 0 {
        return Err(SimError::invalid_config(
            "simulation",
            "worker_threads",
            "worker_threads must be non-negative",
        ));
    }
    Ok(())
}

fn validate_funds(config: &dyn ConfigPort) -> Result<(), SimError> {
    let init = config.get_double("investor", "init_funds", 1000.0);
    if init <= 0.0 {
        return Err(SimError::invalid_config(
            "investor",
            "init_funds",
            "init_funds must be positive",
        ));
    }
    let std = config.get_double("investor", "std_investment", 100.0);
    if std <= 0.0 || std > init / 3.0 {
        return Err(SimError::invalid_config(
            "investor",
            "std_investment",
            "std_investment must be positive and at most init_funds / 3",
        ));
    }
    Ok(())
}

fn validate_stop_loss(config: &dyn ConfigPort) -> Result<(), SimError> {
    let value = config.get_double("investor", "stop_loss", 0.1);
    if !(0.0..1.0).contains(&value) {
        return Err(SimError::invalid_config(
            "investor",
            "stop_loss",
            "stop_loss must be in [0, 1)",
        ));
    }
    Ok(())
}

fn validate_fees(config: &dyn ConfigPort) -> Result<(), SimError> {
    for key in ["txn_fee", "txn_fee_factor", "std_dev_variation_factor"] {
        if config.get_double("investor", key, 0.0) < 0.0 {
            return Err(SimError::invalid_config(
                "investor",
                key,
                format!("{key} must be non-negative"),
            ));
        }
    }
    Ok(())
}

fn validate_influencer_bounds(config: &dyn ConfigPort) -> Result<(), SimError> {
    let min = config.get_int("investor", "min_influencers", 1);
    let max = config.get_int("investor", "max_influencers", 5);
    if min < 1 {
        return Err(SimError::invalid_config(
            "investor",
            "min_influencers",
            "min_influencers must be at least 1",
        ));
    }
    if max < min {
        return Err(SimError::invalid_config(
            "investor",
            "max_influencers",
            "max_influencers must not be less than min_influencers",
        ));
    }
    Ok(())
}

fn validate_weights(config: &dyn ConfigPort) -> Result<(), SimError> {
    let w1 = config.get_double("investor", "inv_w1", 0.5);
    let w2 = config.get_double("investor", "inv_w2", 0.5);
    if !(0.0..=1.0).contains(&w1) || !(0.0..=1.0).contains(&w2) {
        return Err(SimError::invalid_config(
            "investor",
            "inv_w1",
            "weights must be between 0 and 1",
        ));
    }
    if w1 + w2 > 1.0 + 1e-9 {
        return Err(SimError::invalid_config(
            "investor",
            "inv_w2",
            "inv_w1 + inv_w2 must not exceed 1",
        ));
    }
    if let Some(s) = config.get_string("investor", "strategy") {
        s.trim().parse::<crate::domain::course_of_action::Strategy>()?;
    }
    Ok(())
}

fn validate_mutation_rate(config: &dyn ConfigPort) -> Result<(), SimError> {
    let rate = config.get_int("evolution", "mutation_rate", 1);
    if !(1..=100).contains(&rate) {
        return Err(SimError::invalid_config(
            "evolution",
            "mutation_rate",
            "mutation_rate must be between 1 and 100",
        ));
    }
    Ok(())
}

fn validate_elite_pct(config: &dyn ConfigPort) -> Result<(), SimError> {
    let pct = config.get_double("evolution", "preserve_elite_pct", 0.0);
    if !(0.0..100.0).contains(&pct) {
        return Err(SimError::invalid_config(
            "evolution",
            "preserve_elite_pct",
            "preserve_elite_pct must be in [0, 100)",
        ));
    }
    Ok(())
}

/// Delta ordering and locale requirements for every metric.
pub fn validate_subclasses(table: &SubclassTable) -> Result<(), SimError> {
    if table.is_empty() {
        return Err(SimError::Database {
            reason: "metric subclass table is empty".to_string(),
        });
    }
    for sc in table.iter() {
        let bad = |reason: String| SimError::Database {
            reason: format!("{}: {reason}", sc.metric),
        };
        let ordered = sc.min_delta1 <= sc.max_delta1
            && sc.max_delta1 < sc.min_delta2
            && sc.min_delta2 <= sc.max_delta2
            && sc.max_delta2 <= 0;
        if !ordered {
            return Err(bad(format!(
                "delta bounds must satisfy MinDelta1 <= MaxDelta1 < MinDelta2 <= MaxDelta2 <= 0, got [{}, {}] [{}, {}]",
                sc.min_delta1, sc.max_delta1, sc.min_delta2, sc.max_delta2
            )));
        }
        if sc.predictor.is_ratio() && sc.locale_type != LocaleType::C1C2 {
            return Err(bad(format!("{} requires LocaleC1C2", sc.predictor)));
        }
        if sc.locale_type == LocaleType::Bloc && sc.blocs.is_empty() {
            return Err(bad("LocaleBloc requires at least one bloc member".to_string()));
        }
        if sc.hold_window_neg > sc.hold_window_pos {
            return Err(bad("HoldWindowNeg must not exceed HoldWindowPos".to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use crate::domain::subclass::{InfluencerSubclass, Predictor};

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    const BASE: &str = "[simulation]\nc1 = USD\nc2 = JPY\nstart_date = 2020-01-01\nend_date = 2021-01-01\n";

    fn with(extra: &str) -> FileConfigAdapter {
        make_config(&format!("{BASE}{extra}"))
    }

    #[test]
    fn valid_config_passes() {
        let config = make_config(
            r#"
[simulation]
c1 = USD
c2 = JPY
start_date = 2020-01-01
end_date = 2022-12-31
generation_duration = 6 M
population_size = 50

[investor]
init_funds = 1000
std_investment = 100
stop_loss = 0.1
min_influencers = 1
max_influencers = 5
inv_w1 = 0.6
inv_w2 = 0.4
strategy = MajorityRules

[evolution]
mutation_rate = 5
preserve_elite = true
preserve_elite_pct = 10
"#,
        );
        assert!(validate_sim_config(&config).is_ok());
    }

    #[test]
    fn missing_currency_fails() {
        let config = make_config("[simulation]\nc1 = USD\nstart_date = 2020-01-01\nend_date = 2021-01-01\n");
        let err = validate_sim_config(&config).unwrap_err();
        assert!(matches!(err, SimError::ConfigMissing { key, .. } if key == "c2"));
    }

    #[test]
    fn same_currencies_fail() {
        let config = make_config("[simulation]\nc1 = USD\nc2 = USD\nstart_date = 2020-01-01\nend_date = 2021-01-01\n");
        let err = validate_sim_config(&config).unwrap_err();
        assert!(matches!(err, SimError::ConfigInvalid { key, .. } if key == "c2"));
    }

    #[test]
    fn start_after_end_fails() {
        let config = make_config("[simulation]\nc1 = USD\nc2 = JPY\nstart_date = 2022-01-01\nend_date = 2021-01-01\n");
        let err = validate_sim_config(&config).unwrap_err();
        assert!(matches!(err, SimError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn bad_date_format_fails() {
        let config = make_config("[simulation]\nc1 = USD\nc2 = JPY\nstart_date = 01/01/2020\nend_date = 2021-01-01\n");
        let err = validate_sim_config(&config).unwrap_err();
        assert!(matches!(err, SimError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn bad_generation_duration_fails() {
        let err = validate_sim_config(&with("generation_duration = 3 Q\n")).unwrap_err();
        assert!(matches!(err, SimError::ConfigInvalid { key, .. } if key == "generation_duration"));
    }

    #[test]
    fn population_of_one_fails() {
        let err = validate_sim_config(&with("population_size = 1\n")).unwrap_err();
        assert!(matches!(err, SimError::ConfigInvalid { key, .. } if key == "population_size"));
    }

    #[test]
    fn std_investment_above_third_of_funds_fails() {
        let err = validate_sim_config(&with("[investor]\ninit_funds = 1000\nstd_investment = 400\n")).unwrap_err();
        assert!(matches!(err, SimError::ConfigInvalid { key, .. } if key == "std_investment"));
    }

    #[test]
    fn stop_loss_of_one_fails() {
        let err = validate_sim_config(&with("[investor]\nstop_loss = 1.0\n")).unwrap_err();
        assert!(matches!(err, SimError::ConfigInvalid { key, .. } if key == "stop_loss"));
    }

    #[test]
    fn negative_fee_fails() {
        let err = validate_sim_config(&with("[investor]\ntxn_fee = -1\n")).unwrap_err();
        assert!(matches!(err, SimError::ConfigInvalid { key, .. } if key == "txn_fee"));
    }

    #[test]
    fn influencer_bounds_inverted_fails() {
        let err = validate_sim_config(&with("[investor]\nmin_influencers = 4\nmax_influencers = 2\n")).unwrap_err();
        assert!(matches!(err, SimError::ConfigInvalid { key, .. } if key == "max_influencers"));
    }

    #[test]
    fn weights_above_one_fail() {
        let err = validate_sim_config(&with("[investor]\ninv_w1 = 0.7\ninv_w2 = 0.5\n")).unwrap_err();
        assert!(matches!(err, SimError::ConfigInvalid { key, .. } if key == "inv_w2"));
    }

    #[test]
    fn unknown_strategy_fails() {
        let err = validate_sim_config(&with("[investor]\nstrategy = Coinflip\n")).unwrap_err();
        assert!(matches!(err, SimError::MalformedDna { .. }));
    }

    #[test]
    fn mutation_rate_out_of_range_fails() {
        let err = validate_sim_config(&with("[evolution]\nmutation_rate = 0\n")).unwrap_err();
        assert!(matches!(err, SimError::ConfigInvalid { key, .. } if key == "mutation_rate"));
        let err = validate_sim_config(&with("[evolution]\nmutation_rate = 101\n")).unwrap_err();
        assert!(matches!(err, SimError::ConfigInvalid { key, .. } if key == "mutation_rate"));
    }

    fn subclass(metric: &str) -> InfluencerSubclass {
        InfluencerSubclass {
            metric: metric.into(),
            name: metric.into(),
            subclass: "LSMInfluencer".into(),
            locale_type: LocaleType::None,
            predictor: Predictor::SingleValGT,
            min_delta1: -180,
            max_delta1: -30,
            min_delta2: -20,
            max_delta2: -1,
            fitness_w1: 0.5,
            fitness_w2: 0.5,
            hold_window_pos: 0.5,
            hold_window_neg: -0.5,
            blocs: Vec::new(),
        }
    }

    #[test]
    fn well_formed_subclasses_pass() {
        let mut ratio = subclass("IR");
        ratio.locale_type = LocaleType::C1C2;
        ratio.predictor = Predictor::C1C2RatioLT;
        let table: SubclassTable = vec![subclass("GDP"), ratio].into_iter().collect();
        assert!(validate_subclasses(&table).is_ok());
    }

    #[test]
    fn overlapping_delta_ranges_fail() {
        let mut sc = subclass("GDP");
        sc.max_delta1 = -10;
        let table: SubclassTable = vec![sc].into_iter().collect();
        let err = validate_subclasses(&table).unwrap_err();
        assert!(matches!(err, SimError::Database { reason } if reason.starts_with("GDP:")));
    }

    #[test]
    fn positive_delta_fails() {
        let mut sc = subclass("GDP");
        sc.max_delta2 = 3;
        let table: SubclassTable = vec![sc].into_iter().collect();
        assert!(validate_subclasses(&table).is_err());
    }

    #[test]
    fn ratio_predictor_needs_paired_locale() {
        let mut sc = subclass("IR");
        sc.predictor = Predictor::C1C2RatioGT;
        let table: SubclassTable = vec![sc].into_iter().collect();
        assert!(validate_subclasses(&table).is_err());
    }

    #[test]
    fn empty_bloc_fails() {
        let mut sc = subclass("CPI");
        sc.locale_type = LocaleType::Bloc;
        let table: SubclassTable = vec![sc].into_iter().collect();
        assert!(validate_subclasses(&table).is_err());
    }

    #[test]
    fn empty_table_fails() {
        assert!(validate_subclasses(&SubclassTable::new()).is_err());
    }
}
