//! CSV report writer: `simstats` rows per generation and the top investors.

use crate::domain::error::SimError;
use crate::domain::stats::{SimulationStatistics, TopInvestor};
use crate::ports::report_port::ReportPort;
use std::path::{Path, PathBuf};

pub struct CsvReportAdapter {
    stats_path: PathBuf,
    top_investors_path: PathBuf,
}

fn write_error(path: &Path, e: impl std::fmt::Display) -> SimError {
    SimError::Io(std::io::Error::other(format!(
        "failed to write {}: {}",
        path.display(),
        e
    )))
}

impl CsvReportAdapter {
    /// Top investors go next to the stats file, as `<stem>_top_investors.csv`.
    pub fn new<P: AsRef<Path>>(stats_path: P) -> Self {
        let stats_path = stats_path.as_ref().to_path_buf();
        let stem = stats_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "simstats".to_string());
        let top_investors_path = stats_path.with_file_name(format!("{stem}_top_investors.csv"));
        Self {
            stats_path,
            top_investors_path,
        }
    }

    pub fn stats_path(&self) -> &Path {
        &self.stats_path
    }

    pub fn top_investors_path(&self) -> &Path {
        &self.top_investors_path
    }

    fn write_rows(path: &Path, header: &[&str], rows: Vec<Vec<String>>) -> Result<(), SimError> {
        let mut wtr = csv::Writer::from_path(path).map_err(|e| write_error(path, e))?;
        wtr.write_record(header).map_err(|e| write_error(path, e))?;
        for row in rows {
            wtr.write_record(&row).map_err(|e| write_error(path, e))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl ReportPort for CsvReportAdapter {
    fn write_stats(&self, stats: &[SimulationStatistics]) -> Result<(), SimError> {
        let header = [
            "Generation",
            "GenStart",
            "GenStop",
            "ActualStop",
            "ProfitableInvestors",
            "AvgProfit",
            "MaxProfit",
            "TotalBuys",
            "ProfitableBuys",
            "NilDataRequests",
            "HoldingC2",
            "UnsettledC2",
            "EndOfData",
            "StopLossCount",
            "MaxProfitDNA",
        ];
        let rows = stats
            .iter()
            .map(|s| {
                vec![
                    s.generation.to_string(),
                    s.dt_gen_start.to_string(),
                    s.dt_gen_stop.to_string(),
                    s.dt_actual_stop.to_string(),
                    s.profitable_investors.to_string(),
                    format!("{:.2}", s.avg_profit),
                    format!("{:.2}", s.max_profit),
                    s.total_buys.to_string(),
                    s.profitable_buys.to_string(),
                    s.total_nil_data_requests.to_string(),
                    s.total_holding_c2.to_string(),
                    format!("{:.2}", s.unsettled_c2),
                    s.end_of_data_reached.to_string(),
                    s.stop_loss_count.to_string(),
                    s.max_profit_dna.clone(),
                ]
            })
            .collect();
        Self::write_rows(&self.stats_path, &header, rows)
    }

    fn write_top_investors(&self, top: &[TopInvestor]) -> Result<(), SimError> {
        let header = [
            "Rank",
            "PortfolioValue",
            "Date",
            "Generation",
            "BalanceC1",
            "BalanceC2",
            "StopLossCount",
            "DNA",
        ];
        let rows = top
            .iter()
            .enumerate()
            .map(|(i, t)| {
                vec![
                    (i + 1).to_string(),
                    format!("{:.2}", t.portfolio_value),
                    t.dt_portfolio_value.map(|d| d.to_string()).unwrap_or_default(),
                    t.generation.to_string(),
                    format!("{:.2}", t.balance_c1),
                    format!("{:.2}", t.balance_c2),
                    t.stop_loss_count.to_string(),
                    t.dna.clone(),
                ]
            })
            .collect();
        Self::write_rows(&self.top_investors_path, &header, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, m, day).unwrap()
    }

    fn stats() -> SimulationStatistics {
        SimulationStatistics {
            generation: 1,
            profitable_investors: 3,
            avg_profit: 12.5,
            max_profit: 40.0,
            max_profit_dna: "{Investor;ID=abc;Strategy=MajorityRules}".to_string(),
            total_buys: 9,
            profitable_buys: 4,
            total_nil_data_requests: 17,
            dt_gen_start: d(1, 1),
            dt_gen_stop: d(6, 30),
            dt_actual_stop: d(7, 4),
            total_holding_c2: 0,
            unsettled_c2: 0.0,
            end_of_data_reached: false,
            stop_loss_count: 2,
        }
    }

    #[test]
    fn writes_stats_rows() {
        let dir = TempDir::new().unwrap();
        let adapter = CsvReportAdapter::new(dir.path().join("simstats.csv"));
        adapter.write_stats(&[stats()]).unwrap();

        let content = fs::read_to_string(adapter.stats_path()).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().starts_with("Generation,GenStart"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("1,2022-01-01,2022-06-30,2022-07-04,3,12.50,40.00,9,4,17"));
        assert!(row.ends_with("{Investor;ID=abc;Strategy=MajorityRules}"));
    }

    #[test]
    fn writes_top_investors_next_to_stats() {
        let dir = TempDir::new().unwrap();
        let adapter = CsvReportAdapter::new(dir.path().join("run1.csv"));
        assert_eq!(adapter.top_investors_path(), dir.path().join("run1_top_investors.csv"));
        let top = TopInvestor {
            portfolio_value: 1234.5,
            dt_portfolio_value: Some(d(6, 30)),
            dna: "{Investor;ID=def}".to_string(),
            generation: 2,
            balance_c1: 1234.5,
            balance_c2: 0.0,
            stop_loss_count: 0,
        };
        adapter.write_top_investors(&[top]).unwrap();
        let content = fs::read_to_string(adapter.top_investors_path()).unwrap();
        assert!(content.lines().nth(1).unwrap().starts_with("1,1234.50,2022-06-30,2,"));
    }

    #[test]
    fn unwritable_path_is_io_error() {
        let adapter = CsvReportAdapter::new("/nonexistent/dir/simstats.csv");
        assert!(matches!(adapter.write_stats(&[]), Err(SimError::Io(_))));
    }
}
