//! CSV time-series store and metric subclass table.
//!
//! The series file has a `Date` column followed by one column per
//! fully-qualified field (`USDJPYEXClose`, `USDGDP`, `WTIOil`, ...). Empty
//! cells mean no data. Rolling statistics are computed per field while
//! loading, over that field's own values in date order.

use crate::domain::error::SimError;
use crate::domain::record::{FieldSelector, MetricValue, Record};
use crate::domain::rolling_stats::RollingStats;
use crate::domain::subclass::{InfluencerSubclass, SubclassTable};
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

pub struct CsvAdapter {
    series: BTreeMap<NaiveDate, HashMap<String, MetricValue>>,
    subclasses: SubclassTable,
}

fn db_error(reason: impl Into<String>) -> SimError {
    SimError::Database {
        reason: reason.into(),
    }
}

fn read_file(path: &Path) -> Result<String, SimError> {
    fs::read_to_string(path)
        .map_err(|e| db_error(format!("failed to read {}: {}", path.display(), e)))
}

/// `YYYY-MM-DD`, or `M/D/YYYY` as exported by spreadsheets.
pub fn parse_date(s: &str) -> Result<NaiveDate, SimError> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .map_err(|e| db_error(format!("invalid date {s:?}: {e}")))
}

impl CsvAdapter {
    pub fn from_files<P: AsRef<Path>, Q: AsRef<Path>>(
        series_path: P,
        subclasses_path: Q,
        window: usize,
    ) -> Result<Self, SimError> {
        let series = read_file(series_path.as_ref())?;
        let subclasses = read_file(subclasses_path.as_ref())?;
        Self::from_strings(&series, &subclasses, window)
    }

    pub fn from_strings(series: &str, subclasses: &str, window: usize) -> Result<Self, SimError> {
        Ok(CsvAdapter {
            series: parse_series(series, window)?,
            subclasses: parse_subclasses(subclasses)?,
        })
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.series.keys().next().copied()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

pub fn parse_series(
    content: &str,
    window: usize,
) -> Result<BTreeMap<NaiveDate, HashMap<String, MetricValue>>, SimError> {
    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let headers = rdr
        .headers()
        .map_err(|e| db_error(format!("CSV header error: {}", e)))?
        .clone();
    if headers.is_empty() {
        return Err(db_error("missing date column"));
    }
    let fields: Vec<String> = headers.iter().skip(1).map(|h| h.trim().to_string()).collect();

    let mut rows: Vec<(NaiveDate, Vec<Option<f64>>)> = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| db_error(format!("CSV parse error: {}", e)))?;
        let date = parse_date(record.get(0).ok_or_else(|| db_error("missing date column"))?)?;
        let mut values = Vec::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            let cell = record.get(i + 1).unwrap_or("").trim();
            if cell.is_empty() {
                values.push(None);
                continue;
            }
            let v: f64 = cell
                .parse()
                .map_err(|e| db_error(format!("invalid {field} value {cell:?} on {date}: {e}")))?;
            values.push(Some(v));
        }
        rows.push((date, values));
    }
    rows.sort_by_key(|(date, _)| *date);

    let mut windows: Vec<RollingStats> = fields.iter().map(|_| RollingStats::new(window)).collect();
    let mut series = BTreeMap::new();
    for (date, values) in rows {
        let day: &mut HashMap<String, MetricValue> = series.entry(date).or_default();
        for ((field, value), stats) in fields.iter().zip(values).zip(windows.iter_mut()) {
            if let Some(value) = value {
                let snap = stats.add_value(value);
                day.insert(
                    field.clone(),
                    MetricValue {
                        value,
                        mean: snap.mean,
                        std_dev_squared: snap.variance,
                        stats_valid: snap.valid,
                    },
                );
            }
        }
    }
    Ok(series)
}

fn column<'a>(record: &'a csv::StringRecord, idx: &HashMap<String, usize>, name: &str) -> &'a str {
    idx.get(name)
        .and_then(|&i| record.get(i))
        .map(str::trim)
        .unwrap_or("")
}

fn number<T: std::str::FromStr>(
    record: &csv::StringRecord,
    idx: &HashMap<String, usize>,
    metric: &str,
    name: &str,
) -> Result<T, SimError>
where
    T::Err: std::fmt::Display,
{
    let raw = column(record, idx, name);
    raw.parse()
        .map_err(|e| db_error(format!("{metric}: invalid {name} {raw:?}: {e}")))
}

/// Reads the metric subclass table.
pub fn parse_subclasses(content: &str) -> Result<SubclassTable, SimError> {
    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let idx: HashMap<String, usize> = rdr
        .headers()
        .map_err(|e| db_error(format!("CSV header error: {}", e)))?
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_string(), i))
        .collect();
    for required in ["Metric", "MinDelta1", "MaxDelta1", "MinDelta2", "MaxDelta2"] {
        if !idx.contains_key(required) {
            return Err(db_error(format!("subclass table missing {required} column")));
        }
    }

    let mut table = SubclassTable::new();
    for result in rdr.records() {
        let record = result.map_err(|e| db_error(format!("CSV parse error: {}", e)))?;
        let metric = column(&record, &idx, "Metric").to_string();
        if metric.is_empty() {
            continue;
        }
        let name = match column(&record, &idx, "Name") {
            "" => metric.clone(),
            n => n.to_string(),
        };
        let subclass = match column(&record, &idx, "Subclass") {
            "" => "LSMInfluencer".to_string(),
            s => s.to_string(),
        };
        let optional = |name: &str, default: f64| -> Result<f64, SimError> {
            match column(&record, &idx, name) {
                "" => Ok(default),
                _ => number(&record, &idx, &metric, name),
            }
        };
        let sc = InfluencerSubclass {
            name,
            subclass,
            locale_type: column(&record, &idx, "LocaleType").parse()?,
            predictor: match column(&record, &idx, "Predictor") {
                "" => crate::domain::subclass::Predictor::SingleValGT,
                p => p.parse()?,
            },
            min_delta1: number(&record, &idx, &metric, "MinDelta1")?,
            max_delta1: number(&record, &idx, &metric, "MaxDelta1")?,
            min_delta2: number(&record, &idx, &metric, "MinDelta2")?,
            max_delta2: number(&record, &idx, &metric, "MaxDelta2")?,
            fitness_w1: optional("FitnessW1", 0.5)?,
            fitness_w2: optional("FitnessW2", 0.5)?,
            hold_window_pos: optional("HoldWindowPos", 0.0)?,
            hold_window_neg: optional("HoldWindowNeg", 0.0)?,
            blocs: column(&record, &idx, "Blocs")
                .split([';', ' ', '|'])
                .filter(|b| !b.is_empty())
                .map(str::to_string)
                .collect(),
            metric,
        };
        table.insert(sc);
    }
    Ok(table)
}

impl DataPort for CsvAdapter {
    fn select(&self, date: NaiveDate, fields: &[FieldSelector]) -> Result<Option<Record>, SimError> {
        let Some(day) = self.series.get(&date) else {
            return Ok(None);
        };
        let mut record = Record::new(date);
        for sel in fields {
            let name = sel.field_name();
            if let Some(v) = day.get(&name) {
                record.insert(name, *v);
            }
        }
        Ok(Some(record))
    }

    fn metric_subclasses(&self) -> Result<SubclassTable, SimError> {
        Ok(self.subclasses.clone())
    }

    fn latest_date(&self) -> Option<NaiveDate> {
        self.series.keys().next_back().copied()
    }
}
