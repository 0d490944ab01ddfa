use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

/// Writes `content` to `file_path` through a temporary file in the same directory,
/// so readers never observe a half-written file. Missing parent directories are created.
pub fn write_atomic(file_path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = match file_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut file = NamedTempFile::new_in(parent)?;
    file.write_all(content)?;
    file.flush()?;
    file.persist(file_path).map_err(|e| e.error)?;

    Ok(())
}

pub fn write_string_to_file(content: &str, file_path: &Path) -> std::io::Result<()> {
    write_atomic(file_path, content.as_bytes())
}

/// Whether `path` is a regular file with at least one byte in it.
pub fn is_non_empty_file(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

/// Whether `a` and `b` resolve to the same existing file.
pub fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
