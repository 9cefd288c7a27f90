//! Calendar-duration generation lengths ("1 Y 6 M 2 W 3 D").

use chrono::{Days, Months, NaiveDate};
use std::fmt;
use std::str::FromStr;

use super::error::SimError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationDuration {
    pub years: u32,
    pub months: u32,
    pub weeks: u32,
    pub days: u32,
}

fn duration_error(text: &str, reason: impl Into<String>) -> SimError {
    SimError::invalid_config("simulation", "generation_duration", format!("{text:?}: {}", reason.into()))
}

impl FromStr for GenerationDuration {
    type Err = SimError;

    /// Parses `N Unit` pairs, units `Y`, `M`, `W`, `D`, each at most once.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.is_empty() || tokens.len() % 2 != 0 {
            return Err(duration_error(text, "expected pairs of <count> <unit>"));
        }

        let mut dur = GenerationDuration::default();
        let mut seen = [false; 4];
        for pair in tokens.chunks(2) {
            let n: u32 = pair[0]
                .parse()
                .map_err(|_| duration_error(text, format!("bad count {:?}", pair[0])))?;
            let (slot, field) = match pair[1].to_ascii_uppercase().as_str() {
                "Y" => (0, &mut dur.years),
                "M" => (1, &mut dur.months),
                "W" => (2, &mut dur.weeks),
                "D" => (3, &mut dur.days),
                other => return Err(duration_error(text, format!("unknown unit {other:?}"))),
            };
            if seen[slot] {
                return Err(duration_error(text, format!("unit {} repeated", pair[1])));
            }
            seen[slot] = true;
            *field = n;
        }

        if dur.is_zero() {
            return Err(duration_error(text, "duration must be positive"));
        }
        Ok(dur)
    }
}

impl fmt::Display for GenerationDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        for (n, unit) in [
            (self.years, "Y"),
            (self.months, "M"),
            (self.weeks, "W"),
            (self.days, "D"),
        ] {
            if n > 0 {
                parts.push(format!("{n} {unit}"));
            }
        }
        f.write_str(&parts.join(" "))
    }
}

impl GenerationDuration {
    pub fn is_zero(&self) -> bool {
        self.years == 0 && self.months == 0 && self.weeks == 0 && self.days == 0
    }

    /// `date` advanced by this duration using calendar arithmetic.
    pub fn add_to(&self, date: NaiveDate) -> Option<NaiveDate> {
        date.checked_add_months(Months::new(self.years * 12 + self.months))?
            .checked_add_days(Days::new(u64::from(self.weeks) * 7 + u64::from(self.days)))
    }

    /// Number of generations needed to cover `start..end`, stepping by
    /// calendar so month lengths and leap days are honoured. The last
    /// generation may be shorter than the duration.
    pub fn generation_count(&self, start: NaiveDate, end: NaiveDate) -> usize {
        let mut count = 0;
        let mut gen_start = start;
        while gen_start < end {
            count += 1;
            match self.add_to(gen_start) {
                Some(next) if next > gen_start => gen_start = next,
                _ => break,
            }
        }
        count.max(1)
    }
}

/// End date of a generation starting on `gen_start`, clamped to `stop`.
/// Without a duration every generation spans the whole simulation.
pub fn generation_end(
    gen_start: NaiveDate,
    duration: Option<&GenerationDuration>,
    stop: NaiveDate,
) -> NaiveDate {
    match duration.and_then(|d| d.add_to(gen_start)) {
        Some(end) if end < stop => end,
        _ => stop,
    }
}
