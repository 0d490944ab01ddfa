//! Batch orchestration: drives fetch, clean and the tool-backed steps over a list of
//! identifiers and collects one [`RunReport`] per identifier.

use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::core::clean::{FilterSpec, clean_with_summary};
use crate::core::config::{PipelineOptions, PrepConfig};
use crate::core::error::{Error, Result};
use crate::core::fetch::{Fetcher, HttpTransport, Transport};
use crate::core::report::{RunReport, StepName};
use crate::core::structure::{StructureFile, summarize_pdb};
use crate::core::tool::{ObabelRunner, Operation, ToolRequest, ToolRunner};
use crate::core::utils::{is_same_file, write_string_to_file};

enum ToolOutcome {
    Produced(PathBuf),
    /// The tool is unavailable; the pipeline carries on without it.
    Skipped,
    /// The report is now terminal.
    Failed,
}

/// Sequential preparation pipeline.
///
/// Identifiers are processed one after another; a failure is recorded in that
/// identifier's report and never aborts the batch. Once the external tool is found to
/// be missing, every later tool step of the batch is skipped instead of retried.
pub struct Pipeline {
    config: PrepConfig,
    fetcher: Fetcher,
    runner: Box<dyn ToolRunner>,
    tool_missing: Option<Error>,
}

impl Pipeline {
    /// Builds a pipeline that downloads over HTTP and runs Open Babel.
    pub fn new(config: PrepConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.fetch.timeout());
        let runner = ObabelRunner::new(config.tool.clone());
        Self::with_components(config, Box::new(transport), Box::new(runner))
    }

    /// Builds a pipeline around caller-supplied transport and tool runner.
    pub fn with_components(
        config: PrepConfig,
        transport: Box<dyn Transport>,
        runner: Box<dyn ToolRunner>,
    ) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.out_dir)?;
        let fetcher = Fetcher::new(config.fetch.clone(), config.cache_dir(), transport);

        Ok(Pipeline {
            config,
            fetcher,
            runner,
            tool_missing: None,
        })
    }

    pub fn config(&self) -> &PrepConfig {
        &self.config
    }

    /// Processes every identifier in order with the given filter and options.
    pub fn process<I, S>(&mut self, identifiers: I, filter: &FilterSpec, options: &PipelineOptions) -> Vec<RunReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut reports = Vec::new();
        for identifier in identifiers {
            let report = self.process_one(identifier.as_ref(), filter, options);
            reports.push(report);
        }
        reports
    }

    /// Runs the whole pipeline for a single identifier.
    ///
    /// Callers that need to stop a batch early call this in their own loop and simply
    /// stop calling it.
    pub fn process_one(&mut self, identifier: &str, filter: &FilterSpec, options: &PipelineOptions) -> RunReport {
        let mut report = RunReport::new(identifier, options);
        info!("[{}] Starting", identifier);

        let fetched = match self.fetcher.fetch(identifier) {
            Ok(fetched) => fetched,
            Err(e) => {
                error!("[{}] fetch failed: {}", identifier, e);
                report.fail(StepName::Fetch, &e);
                return report;
            }
        };
        report.label = fetched.label.clone();
        report.succeed(StepName::Fetch);

        let cleaned_path = self.output_path(&fetched.label, "_clean", "pdb");
        let atoms = match self.clean_step(&fetched.bytes, &cleaned_path, filter, &mut report) {
            Ok(atoms) => atoms,
            Err(e) => {
                error!("[{}] clean failed: {}", identifier, e);
                report.fail(StepName::Clean, &e);
                return report;
            }
        };
        report.add_output(&cleaned_path);
        report.succeed(StepName::Clean);

        if atoms == 0 && options.needs_tool() {
            warn!("[{}] Nothing left after cleaning; skipping tool steps", identifier);
            report.warn("no ATOM/HETATM records left after cleaning; tool steps skipped");
            report.finish();
            return report;
        }

        let mut current = cleaned_path;
        let sources = [
            fetched.path.clone(),
            self.config.cache_dir().join(format!("{}.pdb", fetched.label)),
        ];

        if options.add_hydrogens {
            let output = self.output_path(&fetched.label, "_protonated", "pdb");
            match self.tool_step(&current, &output, &sources, Operation::AddHydrogens, &mut report) {
                ToolOutcome::Produced(path) => current = path,
                ToolOutcome::Failed => return report,
                ToolOutcome::Skipped => {}
            }
        }

        if options.convert {
            let format = self.config.tool.output_format.clone();
            let output = self.output_path(&fetched.label, "", &format);
            if let ToolOutcome::Failed = self.tool_step(&current, &output, &sources, Operation::Convert, &mut report) {
                return report;
            }
        }

        report.finish();
        info!("[{}] {}", identifier, report.state);
        report
    }

    /// Parses, cleans, validates and writes; returns the number of coordinate records kept.
    fn clean_step(&self, bytes: &[u8], output: &Path, filter: &FilterSpec, report: &mut RunReport) -> Result<usize> {
        let structure = StructureFile::parse(bytes)?;
        let (cleaned, removed) = clean_with_summary(structure, filter);
        let atoms = cleaned.atom_count();
        let content = cleaned.to_pdb_string();

        write_string_to_file(&content, output)?;
        info!(
            "[{}] Cleaned: kept {} atom record(s), removed {} water, {} heteroatom, {} off-chain",
            report.id, atoms, removed.waters, removed.heteroatoms, removed.chains
        );
        report.removed = Some(removed);

        if atoms > 0 {
            match summarize_pdb(&content) {
                Ok(summary) => report.summary = Some(summary),
                Err(errors) => {
                    let details = errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
                    warn!("[{}] Cleaned structure failed validation: {}", report.id, details);
                    report.warn(format!("cleaned structure failed validation: {}", details));
                }
            }
        }

        Ok(atoms)
    }

    /// Runs one tool-backed step and records its outcome in `report`.
    ///
    /// The runner replaces `output`, so the step fails without running when `output` is
    /// the step input or one of `sources`.
    fn tool_step(
        &mut self,
        input: &Path,
        output: &Path,
        sources: &[PathBuf],
        operation: Operation,
        report: &mut RunReport,
    ) -> ToolOutcome {
        let step = match operation {
            Operation::AddHydrogens => StepName::AddHydrogens,
            Operation::Convert => StepName::Convert,
        };

        if let Some(missing) = &self.tool_missing {
            report.skip(step, Some(missing));
            return ToolOutcome::Skipped;
        }

        if is_same_file(output, input) || sources.iter().any(|source| is_same_file(output, source)) {
            let e = Error::OutputConflict {
                output: output.display().to_string(),
            };
            error!("[{}] {} failed: {}", report.id, step, e);
            report.fail(step, &e);
            return ToolOutcome::Failed;
        }

        let request = ToolRequest {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            operation,
        };

        match self.runner.run_tool(&request) {
            Ok(path) => {
                report.add_output(&path);
                report.succeed(step);
                ToolOutcome::Produced(path)
            }
            Err(e @ Error::ToolNotFound(_)) => {
                warn!("{}; tool steps will be skipped for the rest of the batch", e);
                report.skip(step, Some(&e));
                self.tool_missing = Some(e);
                ToolOutcome::Skipped
            }
            Err(e) => {
                error!("[{}] {} failed: {}", report.id, step, e);
                report.fail(step, &e);
                ToolOutcome::Failed
            }
        }
    }

    fn output_path(&self, label: &str, suffix: &str, extension: &str) -> PathBuf {
        self.config.out_dir.join(format!("{}{}.{}", label, suffix, extension))
    }
}
