use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;

use protein_prep::{PrepConfig, Result, build_name_set, read_batch_file, read_config_file};

#[derive(Parser)]
#[command(
    name = "protein-prep",
    about = "Fetch, clean and prepare protein structures for docking",
    version
)]
pub struct Cli {
    /// PDB codes or local structure files to prepare
    #[arg(value_name = "ID")]
    pub ids: Vec<String>,

    /// File with one identifier or path per line (`#` starts a comment)
    #[arg(short, long, value_name = "FILE")]
    pub batch_file: Option<PathBuf>,

    /// JSON configuration file; command-line flags override its values
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory for prepared structures
    #[arg(short, long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Directory for downloaded structures (defaults to the output directory)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Run report path (defaults to <OUT_DIR>/proteinprep_log.json)
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Keep water molecules
    #[arg(long, help_heading = "Cleaning")]
    pub keep_water: bool,

    /// Keep all HETATM records
    #[arg(long, help_heading = "Cleaning")]
    pub keep_hetero: bool,

    /// Keep only these chains (comma separated)
    #[arg(long, value_name = "CHAINS", value_delimiter = ',', help_heading = "Cleaning")]
    pub keep_chains: Vec<String>,

    /// Residue names of ligands to keep regardless of other filters (comma separated)
    #[arg(long, value_name = "NAMES", value_delimiter = ',', help_heading = "Cleaning")]
    pub keep_ligands: Vec<String>,

    /// Keep header and annotation records
    #[arg(long, help_heading = "Cleaning")]
    pub keep_metadata: bool,

    /// Add hydrogens with the external toolkit
    #[arg(long, help_heading = "Preparation")]
    pub add_hydrogens: bool,

    /// Convert the result to the docking format
    #[arg(long, help_heading = "Preparation")]
    pub convert: bool,

    /// Output format for --convert
    #[arg(long, value_name = "EXT", help_heading = "Preparation")]
    pub format: Option<String>,

    /// Path to the obabel executable
    #[arg(long, value_name = "PATH", help_heading = "Preparation")]
    pub obabel: Option<PathBuf>,

    /// Time limit for one tool invocation, in seconds
    #[arg(long, value_name = "SECS", help_heading = "Preparation")]
    pub tool_timeout: Option<u64>,

    /// Download attempts for transient failures
    #[arg(long, value_name = "N", help_heading = "Download")]
    pub retries: Option<u32>,

    /// Per-request download timeout, in seconds
    #[arg(long, value_name = "SECS", help_heading = "Download")]
    pub timeout: Option<u64>,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log debugging detail
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn log_level(&self) -> Option<LevelFilter> {
        if self.quiet {
            Some(LevelFilter::Warn)
        } else if self.verbose {
            Some(LevelFilter::Debug)
        } else {
            None
        }
    }

    /// Loads the configuration file, if any, and applies command-line overrides.
    pub fn build_config(&self) -> Result<PrepConfig> {
        let mut config = match &self.config {
            Some(path) => read_config_file(path)?,
            None => PrepConfig::default(),
        };

        if let Some(out_dir) = &self.out_dir {
            config.out_dir = out_dir.clone();
        }
        if let Some(cache_dir) = &self.cache_dir {
            config.cache_dir = Some(cache_dir.clone());
        }
        if let Some(report) = &self.report {
            config.report_path = Some(report.clone());
        }

        let filter = &mut config.filter;
        if self.keep_water {
            filter.remove_water = false;
        }
        if self.keep_hetero {
            filter.remove_heteroatoms = false;
        }
        if !self.keep_chains.is_empty() {
            filter.keep_chains = build_name_set(&self.keep_chains);
        }
        if !self.keep_ligands.is_empty() {
            filter.keep_ligands = build_name_set(&self.keep_ligands);
        }
        if self.keep_metadata {
            filter.keep_metadata = true;
        }

        if self.add_hydrogens {
            config.options.add_hydrogens = true;
        }
        if self.convert {
            config.options.convert = true;
        }
        if let Some(format) = &self.format {
            config.tool.output_format = format.trim_start_matches('.').to_lowercase();
        }
        if let Some(obabel) = &self.obabel {
            config.tool.executable = Some(obabel.clone());
        }
        if let Some(secs) = self.tool_timeout {
            config.tool.timeout_secs = secs;
        }
        if let Some(retries) = self.retries {
            config.fetch.max_attempts = retries;
        }
        if let Some(secs) = self.timeout {
            config.fetch.timeout_secs = secs;
        }

        config.validate()?;
        Ok(config)
    }

    /// Positional identifiers followed by the batch file entries.
    pub fn identifiers(&self) -> Result<Vec<String>> {
        let mut identifiers = self.ids.clone();
        if let Some(path) = &self.batch_file {
            identifiers.extend(read_batch_file(path)?);
        }
        Ok(identifiers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["protein-prep", "1a4w"]);
        let config = cli.build_config().unwrap();
        assert_eq!(config, PrepConfig::default());
        assert_eq!(cli.identifiers().unwrap(), vec!["1a4w"]);
        assert_eq!(cli.log_level(), None);
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "protein-prep",
            "1a4w",
            "--keep-water",
            "--keep-chains",
            "a,C",
            "--keep-ligands",
            "nad,HEM",
            "--add-hydrogens",
            "--convert",
            "--format",
            ".MOL2",
            "--retries",
            "5",
            "--quiet",
        ]);
        let config = cli.build_config().unwrap();

        assert!(!config.filter.remove_water);
        assert!(config.filter.remove_heteroatoms);
        assert_eq!(config.filter.keep_chains, build_name_set(["A", "C"]));
        assert_eq!(config.filter.keep_ligands, build_name_set(["NAD", "HEM"]));
        assert!(config.options.add_hydrogens && config.options.convert);
        assert_eq!(config.tool.output_format, "mol2");
        assert_eq!(config.fetch.max_attempts, 5);
        assert_eq!(cli.log_level(), Some(LevelFilter::Warn));
    }

    #[test]
    fn test_config_file_then_flags() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"out_dir": "from_file", "fetch": {{"max_attempts": 7}}}}"#).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = Cli::parse_from(["protein-prep", "--config", &path, "--out-dir", "from_flag"]);
        let config = cli.build_config().unwrap();
        assert_eq!(config.out_dir, PathBuf::from("from_flag"));
        assert_eq!(config.fetch.max_attempts, 7);
    }

    #[test]
    fn test_zero_retries_rejected() {
        let cli = Cli::parse_from(["protein-prep", "1a4w", "--retries", "0"]);
        assert!(cli.build_config().is_err());
    }

    #[test]
    fn test_identifiers_include_batch_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "2xyz\n# skipped\n\n3abc\n").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = Cli::parse_from(["protein-prep", "1a4w", "--batch-file", &path]);
        assert_eq!(cli.identifiers().unwrap(), vec!["1a4w", "2xyz", "3abc"]);
    }
}
