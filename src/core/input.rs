use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::core::config::PrepConfig;
use crate::core::error::{Error, Result};

/// Reads a JSON configuration file into a [`PrepConfig`].
///
/// Missing fields take their defaults, so a file only needs the settings it changes.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file cannot be opened or is not a valid
/// configuration object.
pub fn read_config_file(file_path: &Path) -> Result<PrepConfig> {
    let file = File::open(file_path)
        .map_err(|e| Error::Config(format!("cannot open {}: {}", file_path.display(), e)))?;
    let reader = BufReader::new(file);

    let config: PrepConfig = serde_json::from_reader(reader)
        .map_err(|e| Error::Config(format!("{}: {}", file_path.display(), e)))?;

    Ok(config)
}

/// Reads a batch file: one identifier or path per line.
///
/// Surrounding whitespace is trimmed; blank lines and lines starting with `#` are
/// ignored. Order is preserved, duplicates included.
pub fn read_batch_file(file_path: &Path) -> Result<Vec<String>> {
    let file = File::open(file_path)?;
    let reader = BufReader::new(file);

    let mut identifiers = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let entry = line.trim();
        if entry.is_empty() || entry.starts_with('#') {
            continue;
        }
        identifiers.push(entry.to_string());
    }

    Ok(identifiers)
}
