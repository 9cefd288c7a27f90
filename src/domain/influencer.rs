//! Metric-driven predictors.
//!
//! One parameterized [`Influencer`] type covers every metric; the metric's
//! [`InfluencerSubclass`] selects the locale handling and the signal function.
//!
//! For a decision date T3 the influencer samples its metric at
//! `T1 = T3 + Delta1` and `T2 = T3 + Delta2`. The average daily change must
//! clear `(noise_factor * std_dev)^2` before a buy or sell is proposed.
//! GT predictors buy on a falling value and sell on a rising one; LT
//! predictors do the reverse.

use chrono::{Duration, NaiveDate};
use rand::Rng;

use super::course_of_action::Action;
use super::dna::InfluencerDna;
use super::error::SimError;
use super::record::{FieldSelector, MetricValue, Record};
use super::subclass::{InfluencerSubclass, LocaleType, Polarity, Predictor};
use crate::ports::data_port::DataPort;

/// One day's output of an influencer.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub t3: NaiveDate,
    pub metric: String,
    pub influencer_id: u64,
    pub action: Action,
    pub probability: f64,
    pub weight: f64,
    pub delta1: i64,
    pub delta2: i64,
    pub val1: f64,
    pub val2: f64,
    pub avg_delta: f64,
    pub std_dev_squared: f64,
    /// Set once a sale of the lot bought on `t3` settles.
    pub completed: bool,
    pub correct: bool,
    pub t4: Option<NaiveDate>,
}

/// Read access to market data plus the run parameters a prediction needs.
#[derive(Clone, Copy)]
pub struct PredictionContext<'a> {
    pub data: &'a dyn DataPort,
    pub c1: &'a str,
    pub c2: &'a str,
    pub noise_factor: f64,
}

#[derive(Debug, Clone, Copy)]
struct Component {
    v1: MetricValue,
    v2: MetricValue,
}

#[derive(Debug, Clone, Copy)]
struct Thresholds {
    span: f64,
    noise_factor: f64,
    hold_pos: f64,
    hold_neg: f64,
    polarity: Polarity,
}

#[derive(Debug, Clone, Copy)]
struct Signal {
    action: Action,
    val1: f64,
    val2: f64,
    avg_delta: f64,
    std_dev_squared: f64,
}

impl Signal {
    fn abstain() -> Self {
        Signal {
            action: Action::Abstain,
            val1: 0.0,
            val2: 0.0,
            avg_delta: 0.0,
            std_dev_squared: 0.0,
        }
    }
}

type SignalFn = fn(&[Component], &Thresholds) -> Signal;

fn signal_fn(predictor: Predictor) -> SignalFn {
    match predictor {
        Predictor::SingleValGT | Predictor::SingleValLT => single_value_signal,
        Predictor::C1C2RatioGT | Predictor::C1C2RatioLT => ratio_signal,
        Predictor::Custom => custom_signal,
    }
}

/// Buy/sell by the sign of `delta` under the predictor's polarity.
fn direction(polarity: Polarity, delta: f64) -> Action {
    let rising = delta > 0.0;
    let falling = delta < 0.0;
    match polarity {
        Polarity::GreaterThan if falling => Action::Buy,
        Polarity::GreaterThan if rising => Action::Sell,
        Polarity::LessThan if rising => Action::Buy,
        Polarity::LessThan if falling => Action::Sell,
        _ => Action::Hold,
    }
}

/// `None` when the metric's rolling stats are not yet valid.
fn clears_noise(c: &Component, t: &Thresholds) -> Option<bool> {
    if !c.v2.stats_valid {
        return None;
    }
    let avg = (c.v2.value - c.v1.value) / t.span;
    let bar = t.noise_factor * t.noise_factor * c.v2.std_dev_squared;
    Some(avg * avg > bar)
}

fn hold_window_action(delta: f64, t: &Thresholds) -> Action {
    if delta > t.hold_pos || delta < t.hold_neg {
        direction(t.polarity, delta)
    } else {
        Action::Hold
    }
}

fn single_value_signal(components: &[Component], t: &Thresholds) -> Signal {
    let Some(c) = components.first() else {
        return Signal::abstain();
    };
    let delta = c.v2.value - c.v1.value;
    let action = match clears_noise(c, t) {
        Some(true) => direction(t.polarity, delta),
        Some(false) => Action::Hold,
        None => hold_window_action(delta, t),
    };
    Signal {
        action,
        val1: c.v1.value,
        val2: c.v2.value,
        avg_delta: delta / t.span,
        std_dev_squared: c.v2.std_dev_squared,
    }
}

fn ratio_signal(components: &[Component], t: &Thresholds) -> Signal {
    let [a, b] = components else {
        return Signal::abstain();
    };
    if b.v1.value == 0.0 || b.v2.value == 0.0 {
        return Signal::abstain();
    }
    let val1 = a.v1.value / b.v1.value;
    let val2 = a.v2.value / b.v2.value;
    let delta = val2 - val1;

    let action = match (clears_noise(a, t), clears_noise(b, t)) {
        (Some(true), Some(true)) => direction(t.polarity, delta),
        (Some(_), Some(_)) => Action::Hold,
        _ => hold_window_action(delta, t),
    };
    Signal {
        action,
        val1,
        val2,
        avg_delta: delta / t.span,
        std_dev_squared: a.v2.std_dev_squared.max(b.v2.std_dev_squared),
    }
}

// No custom handlers are registered; such metrics never vote.
fn custom_signal(_components: &[Component], _t: &Thresholds) -> Signal {
    Signal::abstain()
}

/// Mean of bloc member values; stats are valid only if every member's are.
fn bloc_mean(values: &[MetricValue]) -> MetricValue {
    let n = values.len().max(1) as f64;
    MetricValue {
        value: values.iter().map(|v| v.value).sum::<f64>() / n,
        mean: values.iter().map(|v| v.mean).sum::<f64>() / n,
        std_dev_squared: values.iter().map(|v| v.std_dev_squared).sum::<f64>() / n,
        stats_valid: !values.is_empty() && values.iter().all(|v| v.stats_valid),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Influencer {
    pub id: u64,
    pub subclass: InfluencerSubclass,
    pub delta1: i64,
    pub delta2: i64,
    pub fitness: f64,
    pub predictions: Vec<Prediction>,
    pub nil_data_count: u64,
}

impl Influencer {
    /// Builds an influencer from a gene, drawing any missing delta at random.
    /// A delta present in the gene must lie within the subclass bounds.
    pub fn from_gene<R: Rng>(
        id: u64,
        subclass: &InfluencerSubclass,
        gene: &InfluencerDna,
        rng: &mut R,
    ) -> Result<Self, SimError> {
        if gene.subclass != subclass.subclass {
            return Err(SimError::UnknownSubclass(gene.subclass.clone()));
        }
        if gene.metric() != subclass.metric {
            return Err(SimError::UnknownMetric(gene.metric().to_string()));
        }
        let delta1 = generate_delta(
            &subclass.metric,
            "Delta1",
            gene.delta1(),
            subclass.min_delta1,
            subclass.max_delta1,
            rng,
        )?;
        let delta2 = generate_delta(
            &subclass.metric,
            "Delta2",
            gene.delta2(),
            subclass.min_delta2,
            subclass.max_delta2,
            rng,
        )?;
        if delta1 >= delta2 {
            return Err(SimError::malformed(
                &gene.to_string(),
                "Delta1 must be earlier than Delta2",
            ));
        }
        Ok(Influencer {
            id,
            subclass: subclass.clone(),
            delta1,
            delta2,
            fitness: 0.0,
            predictions: Vec::new(),
            nil_data_count: 0,
        })
    }

    pub fn metric(&self) -> &str {
        &self.subclass.metric
    }

    pub fn gene(&self) -> InfluencerDna {
        InfluencerDna::new(&self.subclass.subclass, &self.subclass.metric)
            .with_deltas(self.delta1, self.delta2)
    }

    pub fn dna(&self) -> String {
        self.gene().to_string()
    }

    /// Field selectors for this metric under its locale type.
    pub fn selectors(&self, c1: &str, c2: &str) -> Vec<FieldSelector> {
        let m = &self.subclass.metric;
        match self.subclass.locale_type {
            LocaleType::None => vec![FieldSelector::metric(m)],
            LocaleType::C1C2 => vec![FieldSelector::localized(c1, m), FieldSelector::localized(c2, m)],
            LocaleType::Bloc => self
                .subclass
                .blocs
                .iter()
                .map(|b| FieldSelector::localized(b, m))
                .collect(),
        }
    }

    fn sample(
        &self,
        data: &dyn DataPort,
        date: NaiveDate,
        selectors: &[FieldSelector],
    ) -> Result<Vec<MetricValue>, SimError> {
        let nil = |field: &FieldSelector| SimError::NilData {
            date,
            field: field.field_name(),
        };
        let first = selectors
            .first()
            .ok_or_else(|| SimError::UnknownMetric(self.subclass.metric.clone()))?;
        let record: Record = data.select(date, selectors)?.ok_or_else(|| nil(first))?;
        selectors
            .iter()
            .map(|s| record.get(s).copied().ok_or_else(|| nil(s)))
            .collect()
    }

    fn components(&self, v1: Vec<MetricValue>, v2: Vec<MetricValue>) -> Vec<Component> {
        match self.subclass.locale_type {
            LocaleType::Bloc => vec![Component {
                v1: bloc_mean(&v1),
                v2: bloc_mean(&v2),
            }],
            LocaleType::None | LocaleType::C1C2 => v1
                .into_iter()
                .zip(v2)
                .map(|(v1, v2)| Component { v1, v2 })
                .collect(),
        }
    }

    /// Researches the metric and votes for T3.
    ///
    /// Missing data increments the nil-data counter and returns
    /// [`SimError::NilData`]; callers treat that as an abstention.
    pub fn get_prediction(
        &mut self,
        t3: NaiveDate,
        ctx: &PredictionContext<'_>,
    ) -> Result<Prediction, SimError> {
        let t1 = t3 + Duration::days(self.delta1);
        let t2 = t3 + Duration::days(self.delta2);
        let selectors = self.selectors(ctx.c1, ctx.c2);

        let sampled = self
            .sample(ctx.data, t1, &selectors)
            .and_then(|v1| Ok((v1, self.sample(ctx.data, t2, &selectors)?)));
        let (v1, v2) = match sampled {
            Ok(v) => v,
            Err(e) => {
                if e.is_nil_data() {
                    self.nil_data_count += 1;
                }
                return Err(e);
            }
        };

        let thresholds = Thresholds {
            span: (self.delta2 - self.delta1) as f64,
            noise_factor: ctx.noise_factor,
            hold_pos: self.subclass.hold_window_pos,
            hold_neg: self.subclass.hold_window_neg,
            polarity: self.subclass.predictor.polarity(),
        };
        let components = self.components(v1, v2);
        let signal = signal_fn(self.subclass.predictor)(&components, &thresholds);

        let prediction = Prediction {
            t3,
            metric: self.subclass.metric.clone(),
            influencer_id: self.id,
            action: signal.action,
            probability: 1.0,
            weight: 1.0,
            delta1: self.delta1,
            delta2: self.delta2,
            val1: signal.val1,
            val2: signal.val2,
            avg_delta: signal.avg_delta,
            std_dev_squared: signal.std_dev_squared,
            completed: false,
            correct: false,
            t4: None,
        };
        if prediction.action != Action::Abstain {
            self.predictions.push(prediction.clone());
        }
        Ok(prediction)
    }

    /// Marks the first unfinished prediction made on `t3`.
    pub fn finalize_prediction(&mut self, t3: NaiveDate, t4: NaiveDate, profitable: bool) {
        if let Some(p) = self
            .predictions
            .iter_mut()
            .find(|p| !p.completed && p.t3 == t3)
        {
            p.correct = profitable;
            p.completed = true;
            p.t4 = Some(t4);
        }
    }

    pub fn correct_predictions(&self) -> usize {
        self.predictions.iter().filter(|p| p.completed && p.correct).count()
    }
}

/// Validates a supplied delta or draws one uniformly in `[min, max]`.
pub fn generate_delta<R: Rng>(
    metric: &str,
    name: &str,
    value: Option<i64>,
    min: i64,
    max: i64,
    rng: &mut R,
) -> Result<i64, SimError> {
    match value {
        Some(v) if v < min || v > max => Err(SimError::InvalidDeltaRange {
            metric: metric.to_string(),
            delta: name.to_string(),
            value: v,
            min,
            max,
        }),
        Some(v) => Ok(v),
        None => Ok(rng.gen_range(min..=max)),
    }
}
