//! User path normalization.
//!
//! Expands the `~` home shorthand and makes paths absolute against the
//! current working directory. Symbolic links are left untouched.

use std::path::{Path, PathBuf};

use crate::error::{KpmError, Result};

/// Resolve a user-entered path to an absolute path.
pub fn resolve(path: impl AsRef<Path>) -> Result<PathBuf> {
    let home = || {
        dirs::home_dir()
            .ok_or_else(|| KpmError::PathError("Cannot determine home directory".to_string()))
    };
    let cwd = || {
        std::env::current_dir().map_err(|e| {
            KpmError::PathError(format!("Cannot determine working directory: {}", e))
        })
    };
    resolve_with(path.as_ref(), home, cwd)
}

/// Resolve `path` if given, otherwise `default`.
pub fn resolve_or_default(path: Option<&Path>, default: impl AsRef<Path>) -> Result<PathBuf> {
    match path {
        Some(p) if !p.as_os_str().is_empty() => resolve(p),
        _ => resolve(default),
    }
}

/// Core of [`resolve`] with the environment lookups injected.
///
/// The home and working-directory lookups run only when needed.
fn resolve_with(
    path: &Path,
    home: impl FnOnce() -> Result<PathBuf>,
    cwd: impl FnOnce() -> Result<PathBuf>,
) -> Result<PathBuf> {
    let expanded = match strip_home_prefix(path) {
        Some(rest) => {
            let home = home()?;
            if rest.as_os_str().is_empty() {
                home
            } else {
                home.join(rest)
            }
        }
        None => path.to_path_buf(),
    };

    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(cwd()?.join(expanded))
    }
}

/// Return the remainder after a leading `~` / `~<sep>`, if present.
fn strip_home_prefix(path: &Path) -> Option<&Path> {
    let s = path.to_str()?;
    if s == "~" {
        return Some(Path::new(""));
    }
    let rest = s.strip_prefix('~')?;
    let mut chars = rest.chars();
    match chars.next() {
        Some(c) if std::path::is_separator(c) => Some(Path::new(chars.as_str())),
        _ => None,
    }
}
