//! Resolution of the application root to a working directory.

use std::env;
use std::path::{Path, PathBuf};

use url::Url;

use crate::error::HarnessError;

/// Resolves a filesystem path or `file:` URL to an absolute directory.
///
/// Relative paths are taken from the current directory. When the path names
/// a file, its parent directory is used instead.
///
/// # Errors
///
/// Returns [`HarnessError::InvalidAppRoot`] when the input is empty, is a
/// non-local URL, does not exist, or has no parent directory.
pub fn resolve_app_root(app_root: &str) -> Result<PathBuf, HarnessError> {
    let invalid = |reason: String| HarnessError::InvalidAppRoot {
        app_root: app_root.to_owned(),
        reason,
    };

    let path = to_path(app_root).map_err(invalid)?;
    let absolute = if path.is_absolute() {
        path
    } else {
        env::current_dir()
            .map_err(|error| invalid(format!("cannot read current directory: {error}")))?
            .join(path)
    };
    let canonical = absolute
        .canonicalize()
        .map_err(|error| invalid(format!("{}: {error}", absolute.display())))?;
    if canonical.is_dir() {
        return Ok(canonical);
    }
    canonical
        .parent()
        .filter(|parent| parent.is_dir())
        .map(Path::to_path_buf)
        .ok_or_else(|| invalid(String::from("path has no parent directory")))
}

fn to_path(app_root: &str) -> Result<PathBuf, String> {
    if app_root.trim().is_empty() {
        return Err(String::from("path is empty"));
    }
    if !app_root.starts_with("file:") {
        return Ok(PathBuf::from(app_root));
    }
    let url = Url::parse(app_root).map_err(|error| error.to_string())?;
    url.to_file_path()
        .map_err(|()| String::from("URL does not name a local file"))
}
