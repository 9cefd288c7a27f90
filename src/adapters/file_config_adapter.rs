//! INI file configuration adapter.

use crate::domain::error::SimError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    /// DNA values contain `;`, so only `#` starts a comment.
    fn ini() -> Ini {
        let mut config = Ini::new();
        config.set_comment_symbols(&['#']);
        config
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SimError> {
        let path = path.as_ref();
        let mut config = Self::ini();
        config.load(path).map_err(|reason| SimError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Self::ini();
        config.read(content.to_string())?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[simulation]
c1 = USD
c2 = JPY
population_size = 200

[data]
csv_path = data/platodb.csv
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(adapter.get_string("simulation", "c1"), Some("USD".to_string()));
        assert_eq!(adapter.get_int("simulation", "population_size", 0), 200);
        assert_eq!(
            adapter.get_string("data", "csv_path"),
            Some("data/platodb.csv".to_string())
        );
    }

    #[test]
    fn dna_values_survive_semicolons() {
        let dna = "{Investor;Strategy=MajorityRules;InvW1=0.5000;InvW2=0.5000;Influencers=[{LSMInfluencer,Delta1=-30,Delta2=-2,Metric=GDP}]}";
        let adapter = FileConfigAdapter::from_string(&format!("[single]\ndna = {dna}\n")).unwrap();
        assert_eq!(adapter.get_string("single", "dna"), Some(dna.to_string()));
    }

    #[test]
    fn hash_comments_are_ignored() {
        let adapter =
            FileConfigAdapter::from_string("# run settings\n[simulation]\nseed = 7\n").unwrap();
        assert_eq!(adapter.get_int("simulation", "seed", 0), 7);
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[simulation]\nc1 = USD\n").unwrap();
        assert_eq!(adapter.get_string("simulation", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_int_returns_default_for_missing_or_non_numeric() {
        let adapter =
            FileConfigAdapter::from_string("[evolution]\nmutation_rate = abc\n").unwrap();
        assert_eq!(adapter.get_int("evolution", "mutation_rate", 42), 42);
        assert_eq!(adapter.get_int("evolution", "missing", 7), 7);
    }

    #[test]
    fn get_double_returns_value() {
        let adapter = FileConfigAdapter::from_string("[investor]\ninit_funds = 1000.5\n").unwrap();
        assert_eq!(adapter.get_double("investor", "init_funds", 0.0), 1000.5);
    }

    #[test]
    fn get_double_returns_default_for_non_numeric() {
        let adapter =
            FileConfigAdapter::from_string("[investor]\nstop_loss = not_a_number\n").unwrap();
        assert_eq!(adapter.get_double("investor", "stop_loss", 0.1), 0.1);
    }

    #[test]
    fn get_bool_accepts_common_spellings() {
        let adapter = FileConfigAdapter::from_string(
            "[evolution]\na = true\nb = yes\nc = 1\nd = false\ne = no\nf = 0\n",
        )
        .unwrap();
        assert!(adapter.get_bool("evolution", "a", false));
        assert!(adapter.get_bool("evolution", "b", false));
        assert!(adapter.get_bool("evolution", "c", false));
        assert!(!adapter.get_bool("evolution", "d", true));
        assert!(!adapter.get_bool("evolution", "e", true));
        assert!(!adapter.get_bool("evolution", "f", true));
        assert!(adapter.get_bool("evolution", "missing", true));
    }

    #[test]
    fn require_date_parses_and_rejects() {
        let adapter = FileConfigAdapter::from_string(
            "[simulation]\nstart_date = 2020-02-29\nend_date = 2020/12/31\n",
        )
        .unwrap();
        assert_eq!(
            adapter.require_date("simulation", "start_date").unwrap(),
            chrono::NaiveDate::from_ymd_opt(2020, 2, 29).unwrap()
        );
        assert!(matches!(
            adapter.require_date("simulation", "end_date"),
            Err(SimError::ConfigInvalid { .. })
        ));
        assert!(matches!(
            adapter.require_string("simulation", "c1"),
            Err(SimError::ConfigMissing { .. })
        ));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[report]\nstats_path = /tmp/simstats.csv\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("report", "stats_path"),
            Some("/tmp/simstats.csv".to_string())
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(matches!(result, Err(SimError::ConfigParse { .. })));
    }
}
