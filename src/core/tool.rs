//! Adapter around the external chemistry toolkit (Open Babel) used for hydrogen
//! addition and format conversion.

use std::cell::OnceCell;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use itertools::Itertools;
use log::{debug, info};

use crate::core::config::ToolConfig;
use crate::core::error::{Error, Result};
use crate::core::utils::is_non_empty_file;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// What the external tool is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    AddHydrogens,
    Convert,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::AddHydrogens => write!(f, "add-hydrogens"),
            Operation::Convert => write!(f, "convert"),
        }
    }
}

/// One invocation: read `input`, write `output`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub operation: Operation,
}

/// Capability to run the external tool.
pub trait ToolRunner {
    /// Runs the tool and returns the path of the file it produced.
    ///
    /// Implementations return [`Error::ToolNotFound`] when the tool cannot be located
    /// and [`Error::ExternalTool`] when it ran but did not produce usable output.
    fn run_tool(&self, request: &ToolRequest) -> Result<PathBuf>;
}

/// Runs Open Babel as a subprocess.
///
/// The executable is located lazily, on the first request, and the outcome is kept for
/// the lifetime of the runner.
pub struct ObabelRunner {
    config: ToolConfig,
    executable: OnceCell<Option<PathBuf>>,
}

impl ObabelRunner {
    pub fn new(config: ToolConfig) -> Self {
        ObabelRunner {
            config,
            executable: OnceCell::new(),
        }
    }

    /// Argument list for `request`, excluding the executable.
    pub fn arguments(&self, request: &ToolRequest) -> Vec<String> {
        let mut args = vec![
            request.input.display().to_string(),
            "-O".to_string(),
            request.output.display().to_string(),
        ];
        match request.operation {
            Operation::AddHydrogens => args.push("-h".to_string()),
            Operation::Convert => {
                // rigid receptor: no torsion tree in the PDBQT output
                if self.config.output_format.eq_ignore_ascii_case("pdbqt") {
                    args.push("-xr".to_string());
                }
            }
        }
        args
    }

    fn executable(&self) -> Result<&Path> {
        let found = self
            .executable
            .get_or_init(|| self.config.candidates().into_iter().find(|candidate| probe(candidate)));

        match found {
            Some(path) => Ok(path.as_path()),
            None => Err(Error::ToolNotFound(
                self.config
                    .candidates()
                    .iter()
                    .map(|c| c.display().to_string())
                    .join(", "),
            )),
        }
    }
}

impl ToolRunner for ObabelRunner {
    fn run_tool(&self, request: &ToolRequest) -> Result<PathBuf> {
        let executable = self.executable()?;
        let args = self.arguments(request);
        let operation = request.operation.to_string();

        info!(
            "Running {} on {} -> {}",
            operation,
            request.input.display(),
            request.output.display()
        );
        debug!("{} {}", executable.display(), args.iter().join(" "));

        // A stale file from an earlier run must not pass for fresh output.
        if request.output.exists() {
            std::fs::remove_file(&request.output)?;
        }

        let mut stderr_file = tempfile::tempfile()?;
        let child = Command::new(executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_file.try_clone()?))
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                    Error::ToolNotFound(executable.display().to_string())
                }
                _ => Error::Io { source: e },
            })?;

        let status = wait_with_timeout(child, self.config.timeout())?;
        let stderr = read_captured(&mut stderr_file);

        let failure = |code: Option<i32>, reason: String| Error::ExternalTool {
            operation: operation.clone(),
            code,
            reason,
            stderr: stderr.clone(),
        };

        let status = match status {
            Some(status) => status,
            None => {
                return Err(failure(
                    None,
                    format!("timed out after {}s", self.config.timeout().as_secs()),
                ));
            }
        };

        if !status.success() {
            return Err(failure(status.code(), "non-zero exit status".to_string()));
        }

        // Exit code 0 alone is not trusted.
        if !is_non_empty_file(&request.output) {
            return Err(failure(
                status.code(),
                format!("expected output {} is missing or empty", request.output.display()),
            ));
        }

        Ok(request.output.clone())
    }
}

/// Whether `candidate` answers `-V` (print the version) with a zero exit status in time.
fn probe(candidate: &Path) -> bool {
    let child = Command::new(candidate)
        .arg("-V")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    match child {
        Ok(child) => {
            let usable = matches!(
                wait_with_timeout(child, PROBE_TIMEOUT),
                Ok(Some(status)) if status.success()
            );
            debug!("Probed {}: usable={}", candidate.display(), usable);
            usable
        }
        Err(e) => {
            debug!("Probed {}: {}", candidate.display(), e);
            false
        }
    }
}

/// Waits for `child`, killing it once `timeout` has elapsed. `Ok(None)` means the
/// process was killed.
fn wait_with_timeout(mut child: Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            child.kill()?;
            child.wait()?;
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn read_captured(file: &mut File) -> String {
    let mut buf = Vec::new();
    if file.seek(SeekFrom::Start(0)).is_ok() {
        let _ = file.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).trim().to_string()
}
