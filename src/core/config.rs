use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::clean::FilterSpec;
use crate::core::error::{Error, Result};

pub const DEFAULT_URL_TEMPLATE: &str = "https://files.rcsb.org/download/{id}.pdb";
pub const DEFAULT_REPORT_NAME: &str = "proteinprep_log.json";

/// Remote repository access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Download URL; `{id}` is replaced by the upper-cased identifier.
    pub url_template: String,
    /// Total number of attempts for transient failures.
    pub max_attempts: u32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Delay before the second attempt, in milliseconds. Doubles after every attempt.
    pub backoff_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            max_attempts: 3,
            timeout_secs: 10,
            backoff_ms: 2000,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn url_for(&self, id: &str) -> String {
        self.url_template.replace("{id}", id)
    }
}

/// External chemistry toolkit invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Explicit executable; when unset `obabel` then `babel` are looked up on `PATH`.
    pub executable: Option<PathBuf>,
    /// Wall-clock limit for one invocation, in seconds.
    pub timeout_secs: u64,
    /// Extension of the docking-ready output, which also selects the output format.
    pub output_format: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        ToolConfig {
            executable: None,
            timeout_secs: 300,
            output_format: "pdbqt".to_string(),
        }
    }
}

impl ToolConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Executables to try, in order.
    pub fn candidates(&self) -> Vec<PathBuf> {
        match &self.executable {
            Some(path) => vec![path.clone()],
            None => vec![PathBuf::from("obabel"), PathBuf::from("babel")],
        }
    }
}

/// Optional pipeline stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub add_hydrogens: bool,
    pub convert: bool,
}

impl PipelineOptions {
    pub fn needs_tool(&self) -> bool {
        self.add_hydrogens || self.convert
    }
}

/// Everything a [`Pipeline`](crate::Pipeline) needs, passed in at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepConfig {
    pub out_dir: PathBuf,
    /// Where downloaded structures are cached; defaults to `out_dir`.
    pub cache_dir: Option<PathBuf>,
    /// JSON run report; defaults to `<out_dir>/proteinprep_log.json`.
    pub report_path: Option<PathBuf>,
    pub fetch: FetchConfig,
    pub tool: ToolConfig,
    pub filter: FilterSpec,
    pub options: PipelineOptions,
}

impl Default for PrepConfig {
    fn default() -> Self {
        PrepConfig {
            out_dir: PathBuf::from("."),
            cache_dir: None,
            report_path: None,
            fetch: FetchConfig::default(),
            tool: ToolConfig::default(),
            filter: FilterSpec::default(),
            options: PipelineOptions::default(),
        }
    }
}

impl PrepConfig {
    pub fn with_out_dir(out_dir: impl AsRef<Path>) -> Self {
        PrepConfig {
            out_dir: out_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| self.out_dir.clone())
    }

    pub fn report_path(&self) -> PathBuf {
        self.report_path
            .clone()
            .unwrap_or_else(|| self.out_dir.join(DEFAULT_REPORT_NAME))
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.max_attempts == 0 {
            return Err(Error::Config("fetch.max_attempts must be at least 1".to_string()));
        }
        if !self.fetch.url_template.contains("{id}") {
            return Err(Error::Config(format!(
                "fetch.url_template '{}' has no {{id}} placeholder",
                self.fetch.url_template
            )));
        }
        let format = self.tool.output_format.trim();
        if format.is_empty() || format.contains(['/', '\\', '.']) {
            return Err(Error::Config(format!(
                "tool.output_format '{}' is not a plain file extension",
                self.tool.output_format
            )));
        }
        if self.tool.timeout_secs == 0 {
            return Err(Error::Config("tool.timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PrepConfig::default();
        assert_eq!(config.fetch.max_attempts, 3);
        assert_eq!(config.fetch.timeout(), Duration::from_secs(10));
        assert_eq!(config.tool.output_format, "pdbqt");
        assert!(config.filter.remove_water);
        assert!(config.filter.remove_heteroatoms);
        assert!(!config.options.needs_tool());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cache_and_report_fall_back_to_out_dir() {
        let config = PrepConfig::with_out_dir("out");
        assert_eq!(config.cache_dir(), PathBuf::from("out"));
        assert_eq!(config.report_path(), PathBuf::from("out").join(DEFAULT_REPORT_NAME));
    }

    #[test]
    fn test_url_for() {
        let fetch = FetchConfig::default();
        assert_eq!(fetch.url_for("1A4W"), "https://files.rcsb.org/download/1A4W.pdb");
    }

    #[test]
    fn test_candidates() {
        let tool = ToolConfig::default();
        assert_eq!(tool.candidates(), vec![PathBuf::from("obabel"), PathBuf::from("babel")]);

        let tool = ToolConfig {
            executable: Some(PathBuf::from("/opt/ob/bin/obabel")),
            ..Default::default()
        };
        assert_eq!(tool.candidates(), vec![PathBuf::from("/opt/ob/bin/obabel")]);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{"out_dir": "prep", "fetch": {"max_attempts": 5}, "filter": {"keep_chains": ["A"]}}"#;
        let config: PrepConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.out_dir, PathBuf::from("prep"));
        assert_eq!(config.fetch.max_attempts, 5);
        assert_eq!(config.fetch.timeout_secs, 10);
        assert!(config.filter.remove_water);
        assert!(config.filter.keep_chains.contains("A"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PrepConfig::default();
        config.fetch.max_attempts = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = PrepConfig::default();
        config.fetch.url_template = "https://example.org/file.pdb".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = PrepConfig::default();
        config.tool.output_format = "../x".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
