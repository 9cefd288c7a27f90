#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use platosim::domain::config::SimConfig;
use platosim::domain::error::SimError;
use platosim::domain::record::{FieldSelector, MetricValue, Record};
use platosim::domain::subclass::{InfluencerSubclass, LocaleType, Predictor, SubclassTable};
use platosim::ports::data_port::DataPort;
use std::collections::{BTreeMap, HashMap};

pub struct MockDataPort {
    pub days: BTreeMap<NaiveDate, HashMap<String, MetricValue>>,
    pub subclasses: SubclassTable,
    pub errors: HashMap<NaiveDate, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            days: BTreeMap::new(),
            subclasses: SubclassTable::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_value(mut self, date: NaiveDate, field: &str, value: MetricValue) -> Self {
        self.days
            .entry(date)
            .or_default()
            .insert(field.to_string(), value);
        self
    }

    pub fn with_rate(self, date: NaiveDate, rate: f64) -> Self {
        self.with_value(date, "USDJPYEXClose", MetricValue::plain(rate))
    }

    pub fn with_subclass(mut self, sc: InfluencerSubclass) -> Self {
        self.subclasses.insert(sc);
        self
    }

    pub fn with_error(mut self, date: NaiveDate, reason: &str) -> Self {
        self.errors.insert(date, reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn select(&self, date: NaiveDate, fields: &[FieldSelector]) -> Result<Option<Record>, SimError> {
        if let Some(reason) = self.errors.get(&date) {
            return Err(SimError::Database {
                reason: reason.clone(),
            });
        }
        Ok(self.days.get(&date).map(|day| {
            let mut rec = Record::new(date);
            for f in fields {
                let name = f.field_name();
                if let Some(v) = day.get(&name) {
                    rec.insert(name, *v);
                }
            }
            rec
        }))
    }

    fn metric_subclasses(&self) -> Result<SubclassTable, SimError> {
        Ok(self.subclasses.clone())
    }

    fn latest_date(&self) -> Option<NaiveDate> {
        self.days.keys().next_back().copied()
    }
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn subclass(metric: &str, predictor: Predictor) -> InfluencerSubclass {
    InfluencerSubclass {
        metric: metric.to_string(),
        name: metric.to_string(),
        subclass: "LSMInfluencer".to_string(),
        locale_type: LocaleType::None,
        predictor,
        min_delta1: -30,
        max_delta1: -5,
        min_delta2: -4,
        max_delta2: -1,
        fitness_w1: 0.5,
        fitness_w2: 0.5,
        hold_window_pos: 0.0,
        hold_window_neg: 0.0,
        blocs: Vec::new(),
    }
}

pub fn sim_config(start: &str, end: &str) -> SimConfig {
    let mut cfg = SimConfig::new("USD", "JPY", date(start), date(end));
    cfg.seed = Some(2024);
    cfg.worker_threads = 2;
    cfg.population_size = 6;
    cfg.investor.min_influencers = 1;
    cfg.investor.max_influencers = 3;
    cfg
}

/// A daily market from `start` for `days` days: a drifting USD/JPY rate and
/// three oscillating metrics with valid rolling statistics.
pub fn synthetic_market(start: &str, days: i64) -> MockDataPort {
    let start = date(start);
    let mut port = MockDataPort::new()
        .with_subclass(subclass("GDP", Predictor::SingleValGT))
        .with_subclass(subclass("CPI", Predictor::SingleValLT))
        .with_subclass(subclass("WTIOil", Predictor::SingleValGT));
    for i in 0..days {
        let d = start + Duration::days(i);
        let t = i as f64;
        let stat = |value: f64| MetricValue {
            value,
            mean: value,
            std_dev_squared: 0.01,
            stats_valid: true,
        };
        port = port
            .with_rate(d, 140.0 + (t / 11.0).sin() * 4.0 + t * 0.01)
            .with_value(d, "GDP", stat(100.0 + (t / 9.0).sin() * 6.0))
            .with_value(d, "CPI", stat(50.0 + (t / 13.0).cos() * 3.0))
            .with_value(d, "WTIOil", stat(70.0 + (t / 5.0).sin() * 8.0));
    }
    port
}
