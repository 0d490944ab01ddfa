use thiserror::Error;

/// Failures that can occur while preparing a single structure.
///
/// Every variant is scoped to one identifier (or one pipeline step of it); the
/// orchestrator records them in the run report and moves on.
#[derive(Debug, Error)]
pub enum Error {
    #[error("structure '{id}' does not exist upstream ({url})")]
    NotFound { id: String, url: String },

    #[error("failed to download '{id}' after {attempts} attempt(s): {reason}")]
    TransientFetch {
        id: String,
        attempts: u32,
        reason: String,
    },

    #[error("request for '{id}' was rejected with HTTP status {status}")]
    RequestRejected { id: String, status: u16 },

    #[error("'{0}' is neither an existing file nor a 4-character PDB code")]
    InvalidIdentifier(String),

    #[error("{operation} failed (exit code {}): {reason}", .code.map_or("none".to_string(), |c| c.to_string()))]
    ExternalTool {
        operation: String,
        code: Option<i32>,
        reason: String,
        stderr: String,
    },

    #[error("external tool not found (tried: {0})")]
    ToolNotFound(String),

    #[error("refusing to write {output}: it is one of the input files")]
    OutputConflict { output: String },

    #[error("malformed structure file: {details} (at line {line})")]
    MalformedInput { line: usize, details: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O operation failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn malformed(line: usize, details: impl Into<String>) -> Self {
        Self::MalformedInput {
            line,
            details: details.into(),
        }
    }

    /// Stable name of the error class, as written into run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "NotFoundError",
            Error::TransientFetch { .. } => "TransientFetchError",
            Error::RequestRejected { .. } => "RequestRejectedError",
            Error::InvalidIdentifier(_) => "InvalidIdentifierError",
            Error::ExternalTool { .. } => "ExternalToolError",
            Error::ToolNotFound(_) => "ToolNotFoundError",
            Error::OutputConflict { .. } => "OutputConflictError",
            Error::MalformedInput { .. } => "MalformedInputError",
            Error::Config(_) => "ConfigError",
            Error::Io { .. } => "IoError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        let err = Error::NotFound {
            id: "0XXX".to_string(),
            url: "https://example.org/0XXX.pdb".to_string(),
        };
        assert_eq!(err.kind(), "NotFoundError");
        assert_eq!(Error::malformed(3, "short line").kind(), "MalformedInputError");
        assert_eq!(Error::ToolNotFound("obabel".to_string()).kind(), "ToolNotFoundError");
        let err = Error::OutputConflict {
            output: "out/1A4W.pdb".to_string(),
        };
        assert_eq!(err.kind(), "OutputConflictError");
        assert_eq!(err.to_string(), "refusing to write out/1A4W.pdb: it is one of the input files");
    }

    #[test]
    fn test_external_tool_message_includes_code() {
        let err = Error::ExternalTool {
            operation: "add-hydrogens".to_string(),
            code: Some(2),
            reason: "non-zero exit status".to_string(),
            stderr: "boom".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "add-hydrogens failed (exit code 2): non-zero exit status"
        );

        let err = Error::ExternalTool {
            operation: "convert".to_string(),
            code: None,
            reason: "timed out after 1s".to_string(),
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "convert failed (exit code none): timed out after 1s");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io.into();
        assert_eq!(err.kind(), "IoError");
    }
}
