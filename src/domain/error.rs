//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for platosim.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("nildata: no value for {field} on {date}")]
    NilData { date: NaiveDate, field: String },

    #[error("malformed DNA {dna:?}: {reason}")]
    MalformedDna { dna: String, reason: String },

    #[error("unknown metric: {0}")]
    UnknownMetric(String),

    #[error("unknown influencer subclass: {0}")]
    UnknownSubclass(String),

    #[error("{metric}: {delta}={value} outside [{min}, {max}]")]
    InvalidDeltaRange {
        metric: String,
        delta: String,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("exchange rate {field} not found for {date}")]
    ExchangeRateNotFound { date: NaiveDate, field: String },

    #[error("invalid exchange rate {rate} on {date}")]
    InvalidExchangeRate { date: NaiveDate, rate: f64 },

    #[error("population size mismatch: expected {expected}, got {actual}")]
    PopulationSize { expected: usize, actual: usize },

    #[error("invalid fitness for investor {investor}: {reason}")]
    InvalidFitness { investor: String, reason: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SimError {
    /// Missing market data; an expected outcome that callers count and skip.
    pub fn is_nil_data(&self) -> bool {
        matches!(self, SimError::NilData { .. })
    }

    /// Invariant violations that must halt a run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SimError::ExchangeRateNotFound { .. }
                | SimError::InvalidExchangeRate { .. }
                | SimError::PopulationSize { .. }
                | SimError::InvalidFitness { .. }
        )
    }

    pub(crate) fn malformed(dna: &str, reason: impl Into<String>) -> Self {
        SimError::MalformedDna {
            dna: dna.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_config(section: &str, key: &str, reason: impl Into<String>) -> Self {
        SimError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&SimError> for std::process::ExitCode {
    fn from(err: &SimError) -> Self {
        let code: u8 = match err {
            SimError::Io(_) => 1,
            SimError::ConfigParse { .. }
            | SimError::ConfigMissing { .. }
            | SimError::ConfigInvalid { .. } => 2,
            SimError::Database { .. } | SimError::NilData { .. } => 3,
            SimError::MalformedDna { .. }
            | SimError::UnknownMetric(_)
            | SimError::UnknownSubclass(_)
            | SimError::InvalidDeltaRange { .. } => 4,
            SimError::ExchangeRateNotFound { .. }
            | SimError::InvalidExchangeRate { .. }
            | SimError::PopulationSize { .. }
            | SimError::InvalidFitness { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 3, 14).unwrap()
    }

    #[test]
    fn nil_data_is_recoverable() {
        let err = SimError::NilData {
            date: date(),
            field: "USDJPYEXClose".into(),
        };
        assert!(err.is_nil_data());
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("nildata"));
    }

    #[test]
    fn settlement_errors_are_fatal() {
        let err = SimError::InvalidExchangeRate {
            date: date(),
            rate: 0.0,
        };
        assert!(err.is_fatal());
        let err = SimError::PopulationSize {
            expected: 10,
            actual: 9,
        };
        assert!(err.is_fatal());
        assert!(!SimError::UnknownMetric("GDP".into()).is_fatal());
    }

    #[test]
    fn delta_range_message_names_bounds() {
        let err = SimError::InvalidDeltaRange {
            metric: "Unemployment".into(),
            delta: "Delta1".into(),
            value: -400,
            min: -365,
            max: -30,
        };
        assert_eq!(
            err.to_string(),
            "Unemployment: Delta1=-400 outside [-365, -30]"
        );
    }
}
