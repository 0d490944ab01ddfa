use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};

use crate::core::clean::CleanSummary;
use crate::core::config::PipelineOptions;
use crate::core::error::{Error, Result};
use crate::core::structure::StructureSummary;
use crate::core::utils::write_atomic;

/// The stages of the preparation pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepName {
    Fetch,
    Clean,
    AddHydrogens,
    Convert,
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepName::Fetch => "fetch",
            StepName::Clean => "clean",
            StepName::AddHydrogens => "add-hydrogens",
            StepName::Convert => "convert",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Success,
    Failed,
    Skipped,
}

/// Result of one step for one identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStep {
    pub name: StepName,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Standard error of a failed external tool run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl PipelineStep {
    fn pending(name: StepName) -> Self {
        PipelineStep {
            name,
            status: StepStatus::Pending,
            kind: None,
            error: None,
            stderr: None,
        }
    }
}

/// Where an identifier is in its pipeline.
///
/// `PENDING -> FETCHED -> CLEANED -> [PROTONATED] -> [CONVERTED] -> DONE`, or
/// `FAILED(step)` from any state. Both `DONE` and `FAILED` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepState {
    Pending,
    Fetched,
    Cleaned,
    Protonated,
    Converted,
    Done,
    Failed(StepName),
}

impl PrepState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PrepState::Done | PrepState::Failed(_))
    }

    /// State reached when `step` succeeds.
    fn after(step: StepName) -> Self {
        match step {
            StepName::Fetch => PrepState::Fetched,
            StepName::Clean => PrepState::Cleaned,
            StepName::AddHydrogens => PrepState::Protonated,
            StepName::Convert => PrepState::Converted,
        }
    }
}

impl fmt::Display for PrepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrepState::Pending => write!(f, "PENDING"),
            PrepState::Fetched => write!(f, "FETCHED"),
            PrepState::Cleaned => write!(f, "CLEANED"),
            PrepState::Protonated => write!(f, "PROTONATED"),
            PrepState::Converted => write!(f, "CONVERTED"),
            PrepState::Done => write!(f, "DONE"),
            PrepState::Failed(step) => write!(f, "FAILED({})", step),
        }
    }
}

impl Serialize for PrepState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Everything that happened to one requested identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// The identifier exactly as requested.
    pub id: String,
    /// Base name of the files produced for it; empty until fetched.
    pub label: String,
    pub state: PrepState,
    pub steps: Vec<PipelineStep>,
    pub outputs: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<CleanSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<StructureSummary>,
    pub warnings: Vec<String>,
}

impl RunReport {
    /// A report with every requested step pending.
    pub fn new(id: &str, options: &PipelineOptions) -> Self {
        let mut steps = vec![PipelineStep::pending(StepName::Fetch), PipelineStep::pending(StepName::Clean)];
        if options.add_hydrogens {
            steps.push(PipelineStep::pending(StepName::AddHydrogens));
        }
        if options.convert {
            steps.push(PipelineStep::pending(StepName::Convert));
        }

        RunReport {
            id: id.to_string(),
            label: String::new(),
            state: PrepState::Pending,
            steps,
            outputs: Vec::new(),
            removed: None,
            summary: None,
            warnings: Vec::new(),
        }
    }

    pub fn step(&self, name: StepName) -> Option<&PipelineStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    fn step_mut(&mut self, name: StepName) -> &mut PipelineStep {
        let index = match self.steps.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                self.steps.push(PipelineStep::pending(name));
                self.steps.len() - 1
            }
        };
        &mut self.steps[index]
    }

    pub fn succeed(&mut self, name: StepName) {
        self.step_mut(name).status = StepStatus::Success;
        self.state = PrepState::after(name);
    }

    pub fn skip(&mut self, name: StepName, error: Option<&Error>) {
        let step = self.step_mut(name);
        step.status = StepStatus::Skipped;
        if let Some(error) = error {
            step.kind = Some(error.kind().to_string());
            step.error = Some(error.to_string());
        }
    }

    /// Records `error` against `name`, skips every later pending step and makes the
    /// report terminal.
    pub fn fail(&mut self, name: StepName, error: &Error) {
        let step = self.step_mut(name);
        step.status = StepStatus::Failed;
        step.kind = Some(error.kind().to_string());
        step.error = Some(error.to_string());
        if let Error::ExternalTool { stderr, .. } = error {
            if !stderr.is_empty() {
                step.stderr = Some(stderr.clone());
            }
        }

        for step in self.steps.iter_mut().filter(|s| s.status == StepStatus::Pending) {
            step.status = StepStatus::Skipped;
        }
        self.state = PrepState::Failed(name);
    }

    /// Marks the report `DONE` unless it already failed.
    pub fn finish(&mut self) {
        if !matches!(self.state, PrepState::Failed(_)) {
            for step in self.steps.iter_mut().filter(|s| s.status == StepStatus::Pending) {
                step.status = StepStatus::Skipped;
            }
            self.state = PrepState::Done;
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == PrepState::Done
    }

    pub fn failed_step(&self) -> Option<StepName> {
        match self.state {
            PrepState::Failed(step) => Some(step),
            _ => None,
        }
    }

    pub fn add_output(&mut self, path: &Path) {
        self.outputs.push(path.to_path_buf());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Serializes `reports` as a pretty-printed JSON array and writes it atomically.
pub fn write_reports(reports: &[RunReport], path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(reports)
        .map_err(|e| Error::Io { source: e.into() })?;
    write_atomic(path, json.as_bytes())?;
    Ok(())
}
