//! Report generation port trait.

use crate::domain::error::SimError;
use crate::domain::stats::{SimulationStatistics, TopInvestor};

/// Sink for per-generation statistics and the best investors of a run.
pub trait ReportPort {
    fn write_stats(&self, stats: &[SimulationStatistics]) -> Result<(), SimError>;

    fn write_top_investors(&self, top: &[TopInvestor]) -> Result<(), SimError>;
}
