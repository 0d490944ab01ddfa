//! Retrieval of structure files by identifier, from disk or from a remote repository.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};

use crate::core::config::FetchConfig;
use crate::core::error::{Error, Result};
use crate::core::structure::StructureFile;
use crate::core::utils::{is_non_empty_file, write_atomic};

/// Outcome of a single HTTP request, as seen by the retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The server answered with an HTTP error status.
    Status(u16),
    /// No usable answer: connection failure, timeout, truncated body...
    Network(String),
}

impl TransportError {
    fn is_transient(&self) -> bool {
        match self {
            TransportError::Status(code) => *code >= 500 || *code == 408 || *code == 429,
            TransportError::Network(_) => true,
        }
    }
}

/// Issues one GET request and returns the body.
pub trait Transport {
    fn get(&self, url: &str) -> std::result::Result<Vec<u8>, TransportError>;
}

/// Blocking HTTP transport backed by `ureq`, with a per-request timeout.
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("protein-prep/", env!("CARGO_PKG_VERSION")))
            .build();
        HttpTransport { agent }
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> std::result::Result<Vec<u8>, TransportError> {
        match self.agent.get(url).call() {
            Ok(response) => {
                let mut body = Vec::new();
                response
                    .into_reader()
                    .read_to_end(&mut body)
                    .map_err(|e| TransportError::Network(e.to_string()))?;
                Ok(body)
            }
            Err(ureq::Error::Status(code, _)) => Err(TransportError::Status(code)),
            Err(ureq::Error::Transport(transport)) => {
                Err(TransportError::Network(transport.to_string()))
            }
        }
    }
}

/// Bounded retry schedule: how many attempts have been made and how long to wait
/// before the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    max_attempts: u32,
    next_delay: Duration,
}

impl RetryState {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        RetryState {
            attempt: 0,
            max_attempts: max_attempts.max(1),
            next_delay: initial_delay,
        }
    }

    /// Number of attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Registers the start of an attempt. Returns `None` once the budget is spent,
    /// otherwise the delay to wait before the attempt (zero for the first one).
    pub fn begin_attempt(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let delay = if self.attempt == 0 {
            Duration::ZERO
        } else {
            let delay = self.next_delay;
            self.next_delay = self.next_delay.saturating_mul(2);
            delay
        };
        self.attempt += 1;
        Some(delay)
    }
}

/// Raw bytes of a structure plus where they came from.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// Name used for every file derived from this structure.
    pub label: String,
    pub bytes: Vec<u8>,
    /// The local file the bytes were read from or cached to. A download that was not
    /// cached because it is not a structure file has no file at this path.
    pub path: PathBuf,
}

/// Resolves identifiers to structure bytes: local files are read as-is, PDB codes are
/// served from the cache directory or downloaded and cached.
pub struct Fetcher {
    config: FetchConfig,
    cache_dir: PathBuf,
    transport: Box<dyn Transport>,
}

impl Fetcher {
    pub fn new(config: FetchConfig, cache_dir: impl Into<PathBuf>, transport: Box<dyn Transport>) -> Self {
        Fetcher {
            config,
            cache_dir: cache_dir.into(),
            transport,
        }
    }

    /// Fetches `identifier`.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidIdentifier`] when it is neither a file nor a PDB code.
    /// * [`Error::NotFound`] on HTTP 404/410, without retrying.
    /// * [`Error::RequestRejected`] on any other client error, without retrying.
    /// * [`Error::TransientFetch`] once every attempt failed with a timeout, network
    ///   error or server error.
    pub fn fetch(&self, identifier: &str) -> Result<Fetched> {
        let path = Path::new(identifier);
        if path.is_file() {
            let label = local_label(path);
            debug!("Reading local structure {}", path.display());
            let bytes = fs::read(path)?;
            return Ok(Fetched {
                label,
                bytes,
                path: path.to_path_buf(),
            });
        }

        let label = pdb_code(identifier).ok_or_else(|| Error::InvalidIdentifier(identifier.to_string()))?;
        let cache_path = self.cache_dir.join(format!("{}.pdb", label));

        if is_non_empty_file(&cache_path) {
            debug!("Using cached {}", cache_path.display());
            let bytes = fs::read(&cache_path)?;
            return Ok(Fetched {
                label,
                bytes,
                path: cache_path,
            });
        }

        let url = self.config.url_for(&label);
        info!("Downloading {} from {}", label, url);
        let bytes = self.download(&label, &url)?;

        // An error page served with status 200 must not poison the cache.
        match StructureFile::parse(&bytes) {
            Ok(_) => write_atomic(&cache_path, &bytes)?,
            Err(e) => warn!("Not caching {}: {}", label, e),
        }
        Ok(Fetched {
            label,
            bytes,
            path: cache_path,
        })
    }

    fn download(&self, label: &str, url: &str) -> Result<Vec<u8>> {
        let mut retry = RetryState::new(self.config.max_attempts, self.config.backoff());
        let mut last_error = String::new();

        while let Some(delay) = retry.begin_attempt() {
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }

            let failure = match self.transport.get(url) {
                Ok(bytes) if bytes.is_empty() => TransportError::Network("empty response body".to_string()),
                Ok(bytes) => return Ok(bytes),
                Err(e) => e,
            };

            match &failure {
                TransportError::Status(404 | 410) => {
                    return Err(Error::NotFound {
                        id: label.to_string(),
                        url: url.to_string(),
                    });
                }
                TransportError::Status(status) if !failure.is_transient() => {
                    return Err(Error::RequestRejected {
                        id: label.to_string(),
                        status: *status,
                    });
                }
                _ => {}
            }

            last_error = match &failure {
                TransportError::Status(code) => format!("HTTP status {}", code),
                TransportError::Network(message) => message.clone(),
            };
            warn!(
                "Download attempt {}/{} for {} failed: {}",
                retry.attempts(),
                self.config.max_attempts,
                label,
                last_error
            );
        }

        Err(Error::TransientFetch {
            id: label.to_string(),
            attempts: retry.attempts(),
            reason: last_error,
        })
    }
}

/// Upper-cased PDB code if `identifier` looks like one (4 alphanumeric characters).
pub fn pdb_code(identifier: &str) -> Option<String> {
    let code = identifier.trim();
    if code.len() == 4 && code.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(code.to_ascii_uppercase())
    } else {
        None
    }
}

fn local_label(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("structure")
        .to_string()
}
