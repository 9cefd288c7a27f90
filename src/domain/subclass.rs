//! Per-metric influencer policy table.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::SimError;

/// Influencer subclass names accepted in DNA.
pub const SUBCLASS_NAMES: &[&str] = &["LSMInfluencer"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocaleType {
    None,
    C1C2,
    Bloc,
}

impl FromStr for LocaleType {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "LocaleNone" | "None" | "" => Ok(LocaleType::None),
            "LocaleC1C2" | "C1C2" => Ok(LocaleType::C1C2),
            "LocaleBloc" | "Bloc" => Ok(LocaleType::Bloc),
            other => Err(SimError::Database {
                reason: format!("unknown locale type {other:?}"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Predictor {
    SingleValGT,
    SingleValLT,
    C1C2RatioGT,
    C1C2RatioLT,
    Custom,
}

/// Comparison direction of a predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    GreaterThan,
    LessThan,
}

impl Predictor {
    pub fn polarity(self) -> Polarity {
        match self {
            Predictor::SingleValGT | Predictor::C1C2RatioGT | Predictor::Custom => {
                Polarity::GreaterThan
            }
            Predictor::SingleValLT | Predictor::C1C2RatioLT => Polarity::LessThan,
        }
    }

    pub fn is_ratio(self) -> bool {
        matches!(self, Predictor::C1C2RatioGT | Predictor::C1C2RatioLT)
    }
}

impl FromStr for Predictor {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "SingleValGT" => Ok(Predictor::SingleValGT),
            "SingleValLT" => Ok(Predictor::SingleValLT),
            "C1C2RatioGT" => Ok(Predictor::C1C2RatioGT),
            "C1C2RatioLT" => Ok(Predictor::C1C2RatioLT),
            "CustomPredict" | "Custom" => Ok(Predictor::Custom),
            other => Err(SimError::Database {
                reason: format!("unknown predictor {other:?}"),
            }),
        }
    }
}

impl fmt::Display for Predictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Predictor::SingleValGT => "SingleValGT",
            Predictor::SingleValLT => "SingleValLT",
            Predictor::C1C2RatioGT => "C1C2RatioGT",
            Predictor::C1C2RatioLT => "C1C2RatioLT",
            Predictor::Custom => "CustomPredict",
        };
        f.write_str(s)
    }
}

/// Policy for one metric: delta bounds, locale handling, predictor and hold windows.
#[derive(Debug, Clone, PartialEq)]
pub struct InfluencerSubclass {
    pub metric: String,
    pub name: String,
    pub subclass: String,
    pub locale_type: LocaleType,
    pub predictor: Predictor,
    pub min_delta1: i64,
    pub max_delta1: i64,
    pub min_delta2: i64,
    pub max_delta2: i64,
    pub fitness_w1: f64,
    pub fitness_w2: f64,
    pub hold_window_pos: f64,
    pub hold_window_neg: f64,
    pub blocs: Vec<String>,
}

/// All metric subclasses known to a run, keyed by metric name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubclassTable {
    subclasses: BTreeMap<String, InfluencerSubclass>,
}

impl SubclassTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sc: InfluencerSubclass) {
        self.subclasses.insert(sc.metric.clone(), sc);
    }

    pub fn get(&self, metric: &str) -> Result<&InfluencerSubclass, SimError> {
        self.subclasses
            .get(metric)
            .ok_or_else(|| SimError::UnknownMetric(metric.to_string()))
    }

    pub fn contains(&self, metric: &str) -> bool {
        self.subclasses.contains_key(metric)
    }

    /// Metric names in sorted order.
    pub fn metrics(&self) -> Vec<&str> {
        self.subclasses.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InfluencerSubclass> {
        self.subclasses.values()
    }

    pub fn len(&self) -> usize {
        self.subclasses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subclasses.is_empty()
    }
}

impl FromIterator<InfluencerSubclass> for SubclassTable {
    fn from_iter<I: IntoIterator<Item = InfluencerSubclass>>(iter: I) -> Self {
        let mut table = SubclassTable::new();
        for sc in iter {
            table.insert(sc);
        }
        table
    }
}

pub fn is_known_subclass(name: &str) -> bool {
    SUBCLASS_NAMES.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(metric: &str) -> InfluencerSubclass {
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
            hold_window_pos: 0.01,
            hold_window_neg: -0.01,
            blocs: Vec::new(),
        }
    }

    #[test]
    fn parses_predictors_and_locales() {
        assert_eq!("C1C2RatioLT".parse::<Predictor>().unwrap(), Predictor::C1C2RatioLT);
        assert_eq!("CustomPredict".parse::<Predictor>().unwrap(), Predictor::Custom);
        assert_eq!("LocaleC1C2".parse::<LocaleType>().unwrap(), LocaleType::C1C2);
        assert!("Sideways".parse::<Predictor>().is_err());
    }

    #[test]
    fn polarity_follows_predictor() {
        assert_eq!(Predictor::SingleValGT.polarity(), Polarity::GreaterThan);
        assert_eq!(Predictor::C1C2RatioLT.polarity(), Polarity::LessThan);
        assert!(Predictor::C1C2RatioGT.is_ratio());
        assert!(!Predictor::SingleValLT.is_ratio());
    }

    #[test]
    fn table_lookup() {
        let table: SubclassTable = vec![sample("WTIOil"), sample("GDP")].into_iter().collect();
        assert_eq!(table.metrics(), vec!["GDP", "WTIOil"]);
        assert!(table.get("GDP").is_ok());
        assert!(matches!(table.get("CPI"), Err(SimError::UnknownMetric(m)) if m == "CPI"));
    }

    #[test]
    fn only_lsm_subclass_is_known() {
        assert!(is_known_subclass("LSMInfluencer"));
        assert!(!is_known_subclass("GDPInfluencer"));
    }
}
