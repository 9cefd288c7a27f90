//! Field selectors and the per-date records returned by the data store.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;

/// Metric name of the daily exchange-rate close.
pub const EXCHANGE_RATE_METRIC: &str = "EXClose";

/// Names a metric, optionally qualified by one or two locale codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldSelector {
    pub locale: Option<String>,
    pub locale2: Option<String>,
    pub metric: String,
}

impl FieldSelector {
    pub fn metric(metric: &str) -> Self {
        FieldSelector {
            locale: None,
            locale2: None,
            metric: metric.to_string(),
        }
    }

    pub fn localized(locale: &str, metric: &str) -> Self {
        FieldSelector {
            locale: Some(locale.to_string()),
            locale2: None,
            metric: metric.to_string(),
        }
    }

    pub fn pair(locale: &str, locale2: &str, metric: &str) -> Self {
        FieldSelector {
            locale: Some(locale.to_string()),
            locale2: Some(locale2.to_string()),
            metric: metric.to_string(),
        }
    }

    /// The exchange-rate close for the C1/C2 pair, e.g. `USDJPYEXClose`.
    pub fn exchange_rate(c1: &str, c2: &str) -> Self {
        Self::pair(c1, c2, EXCHANGE_RATE_METRIC)
    }

    /// Fully-qualified field name: `<Locale><Locale2><Metric>`.
    pub fn field_name(&self) -> String {
        let mut name = String::new();
        if let Some(l) = &self.locale {
            name.push_str(l);
        }
        if let Some(l) = &self.locale2 {
            name.push_str(l);
        }
        name.push_str(&self.metric);
        name
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.field_name())
    }
}

/// A value plus the rolling statistics of its metric at that date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricValue {
    pub value: f64,
    pub mean: f64,
    pub std_dev_squared: f64,
    pub stats_valid: bool,
}

impl MetricValue {
    /// A bare value with no usable statistics.
    pub fn plain(value: f64) -> Self {
        MetricValue {
            value,
            mean: 0.0,
            std_dev_squared: 0.0,
            stats_valid: false,
        }
    }
}

/// Values found for one date, keyed by fully-qualified field name.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub date: NaiveDate,
    pub fields: HashMap<String, MetricValue>,
}

impl Record {
    pub fn new(date: NaiveDate) -> Self {
        Record {
            date,
            fields: HashMap::new(),
        }
    }

    pub fn insert(&mut self, field: impl Into<String>, value: MetricValue) {
        self.fields.insert(field.into(), value);
    }

    pub fn get(&self, selector: &FieldSelector) -> Option<&MetricValue> {
        self.fields.get(&selector.field_name())
    }

    pub fn value(&self, selector: &FieldSelector) -> Option<f64> {
        self.get(selector).map(|v| v.value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_concatenate_locales() {
        assert_eq!(FieldSelector::metric("WTIOil").field_name(), "WTIOil");
        assert_eq!(
            FieldSelector::localized("JPY", "Unemployment").field_name(),
            "JPYUnemployment"
        );
        assert_eq!(
            FieldSelector::exchange_rate("USD", "JPY").field_name(),
            "USDJPYEXClose"
        );
    }

    #[test]
    fn record_lookup_by_selector() {
        let mut rec = Record::new(NaiveDate::from_ymd_opt(2022, 5, 2).unwrap());
        rec.insert("USDJPYEXClose", MetricValue::plain(130.1));
        assert_eq!(rec.value(&FieldSelector::exchange_rate("USD", "JPY")), Some(130.1));
        assert_eq!(rec.value(&FieldSelector::metric("GDP")), None);
        assert_eq!(rec.len(), 1);
    }
}
