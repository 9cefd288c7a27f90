//! Configuration access port trait.

use crate::domain::error::SimError;
use chrono::NaiveDate;

/// Sectioned key/value configuration source.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    fn require_string(&self, section: &str, key: &str) -> Result<String, SimError> {
        self.get_string(section, key)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| SimError::ConfigMissing {
                section: section.to_string(),
                key: key.to_string(),
            })
    }

    /// A required `YYYY-MM-DD` date.
    fn require_date(&self, section: &str, key: &str) -> Result<NaiveDate, SimError> {
        let raw = self.require_string(section, key)?;
        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
            SimError::invalid_config(section, key, "invalid date format (expected YYYY-MM-DD)")
        })
    }
}
