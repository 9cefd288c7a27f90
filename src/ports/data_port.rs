//! Data access port trait.

use crate::domain::error::SimError;
use crate::domain::record::{FieldSelector, Record};
use crate::domain::subclass::SubclassTable;
use chrono::NaiveDate;

/// Read-only historical data store. Shared across worker threads during a run.
pub trait DataPort: Sync {
    /// Values for `date`. `Ok(None)` when the store has no record for that date;
    /// selectors with no value are simply absent from the record.
    fn select(&self, date: NaiveDate, fields: &[FieldSelector])
        -> Result<Option<Record>, SimError>;

    /// The per-metric influencer policy table.
    fn metric_subclasses(&self) -> Result<SubclassTable, SimError>;

    /// Last date for which the store holds data, if known.
    fn latest_date(&self) -> Option<NaiveDate> {
        None
    }
}
