//! # chrome-locate
//!
//! Find a Chrome or Chromium binary suitable for headless printing, so that
//! users of `svg2pdf` do not need to pass a browser path by hand.
//!
//! ## How it works
//!
//! On first call to [`locate_chrome`]:
//!
//! 1. Uses `CHROME_PATH` when it points to an existing executable.
//! 2. Checks the well-known install locations for the current OS.
//! 3. Searches every directory on `PATH` for the usual binary names.
//!
//! The result is cached for the lifetime of the process.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chrome_locate::{locate_chrome, locate_chrome_from};
//!
//! // Option A: full discovery chain
//! let chrome = locate_chrome().expect("no Chrome found");
//!
//! // Option B: explicit path first, discovery as fallback
//! let chrome = locate_chrome_from(Some("/opt/chrome/chrome".as_ref())).expect("no Chrome found");
//! ```
//!
//! ## Platform support
//!
//! | OS      | Locations checked                                         |
//! |---------|-----------------------------------------------------------|
//! | Linux   | `/usr/bin/chromium`, `/usr/bin/chromium-browser`, `/usr/bin/google-chrome`, `/usr/bin/google-chrome-stable`, `/snap/bin/chromium` |
//! | macOS   | `/Applications/Google Chrome.app/…`, `/Applications/Chromium.app/…` |
//! | Windows | `%ProgramFiles%\Google\Chrome\Application\chrome.exe` and the x86 variant |
//!
//! ## Environment variable overrides
//!
//! - `CHROME_PATH` — path to an existing Chrome/Chromium binary; skips discovery.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable consulted before any discovery.
pub const CHROME_PATH_ENV: &str = "CHROME_PATH";

/// Binary names searched on `PATH`, in preference order.
pub const BINARY_NAMES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by chrome-locate operations.
#[derive(Error, Debug)]
pub enum LocateError {
    /// An explicit path was given but nothing executable lives there.
    #[error("Chrome binary not found at '{path}'")]
    NotFound { path: PathBuf },

    /// No override, no install location and nothing on `PATH`.
    #[error(
        "No Chrome or Chromium binary found.\n\
         Install chromium, or set {CHROME_PATH_ENV}=/path/to/chrome, \
         or point the renderer at a remote engine."
    )]
    NoCandidate,
}

// ── Internal: platform metadata ──────────────────────────────────────────────

fn install_locations() -> Vec<PathBuf> {
    match std::env::consts::OS {
        "linux" => [
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/snap/bin/chromium",
        ]
        .iter()
        .map(PathBuf::from)
        .collect(),
        "macos" => [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
        .iter()
        .map(PathBuf::from)
        .collect(),
        "windows" => ["ProgramFiles", "ProgramFiles(x86)", "LOCALAPPDATA"]
            .iter()
            .filter_map(|var| std::env::var_os(var))
            .map(|base| {
                PathBuf::from(base)
                    .join("Google")
                    .join("Chrome")
                    .join("Application")
                    .join("chrome.exe")
            })
            .collect(),
        _ => Vec::new(),
    }
}

// ── Thread-safe singleton path cache ─────────────────────────────────────────

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Returns `true` if a binary can be found without further setup.
pub fn is_chrome_available() -> bool {
    locate_chrome().is_ok()
}

/// Every location that discovery would check, in order, excluding `PATH`.
pub fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(p) = std::env::var_os(CHROME_PATH_ENV) {
        paths.push(PathBuf::from(p));
    }
    paths.extend(install_locations());
    paths
}

/// Locates a Chrome/Chromium binary using the full discovery chain.
///
/// # Thread safety
///
/// Safe to call from multiple threads; the first successful result is
/// cached for the process lifetime.
pub fn locate_chrome() -> Result<PathBuf, LocateError> {
    if let Some(path) = RESOLVED_PATH.get() {
        return Ok(path.clone());
    }

    let path = discover()?;
    let _ = RESOLVED_PATH.set(path.clone());
    Ok(path)
}

/// Uses `explicit` when given, falling back to [`locate_chrome`] otherwise.
///
/// An explicit path that does not exist is an error rather than a silent
/// fallback: the caller asked for that binary specifically.
pub fn locate_chrome_from(explicit: Option<&Path>) -> Result<PathBuf, LocateError> {
    match explicit {
        Some(path) if is_executable(path) => Ok(path.to_path_buf()),
        Some(path) => Err(LocateError::NotFound {
            path: path.to_path_buf(),
        }),
        None => locate_chrome(),
    }
}

/// Searches the directories of a `PATH`-style value for any of `names`.
///
/// Names are tried in order; within a name, directories are tried in order.
pub fn search_path(names: &[&str], path_var: &OsStr) -> Option<PathBuf> {
    let dirs: Vec<PathBuf> = std::env::split_paths(path_var).collect();
    names.iter().find_map(|name| {
        dirs.iter()
            .map(|dir| dir.join(executable_name(name)))
            .find(|candidate| is_executable(candidate))
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn discover() -> Result<PathBuf, LocateError> {
    // 1. Environment variable override.
    if let Some(env_path) = std::env::var_os(CHROME_PATH_ENV) {
        let p = PathBuf::from(env_path);
        if is_executable(&p) {
            return Ok(p);
        }
        // Fall through: env var set but file missing → keep searching.
    }

    // 2. Well-known install locations.
    if let Some(p) = install_locations().into_iter().find(|p| is_executable(p)) {
        return Ok(p);
    }

    // 3. PATH lookup.
    std::env::var_os("PATH")
        .and_then(|path_var| search_path(BINARY_NAMES, &path_var))
        .ok_or(LocateError::NoCandidate)
}

fn executable_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn fake_binary(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(executable_name(name));
        std::fs::write(&path, b"#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }

    #[test]
    fn search_path_finds_first_matching_name() {
        let dir = tempfile::tempdir().unwrap();
        let expected = fake_binary(dir.path(), "google-chrome");
        let path_var = std::env::join_paths([dir.path()]).unwrap();

        let found = search_path(BINARY_NAMES, &path_var);
        assert_eq!(found, Some(expected));
    }

    #[test]
    fn search_path_respects_name_preference() {
        let dir = tempfile::tempdir().unwrap();
        fake_binary(dir.path(), "google-chrome");
        let chromium = fake_binary(dir.path(), "chromium");
        let path_var = std::env::join_paths([dir.path()]).unwrap();

        assert_eq!(search_path(BINARY_NAMES, &path_var), Some(chromium));
    }

    #[test]
    fn search_path_empty_value_finds_nothing() {
        assert_eq!(search_path(BINARY_NAMES, &OsString::new()), None);
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("chromium"), b"not a program").unwrap();
        let path_var = std::env::join_paths([dir.path()]).unwrap();

        assert_eq!(search_path(&["chromium"], &path_var), None);
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = locate_chrome_from(Some(Path::new("/definitely/not/here/chrome"))).unwrap_err();
        assert!(matches!(err, LocateError::NotFound { .. }));
        assert!(err.to_string().contains("/definitely/not/here/chrome"));
    }

    #[test]
    fn explicit_existing_path_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_binary(dir.path(), "my-chrome");
        assert_eq!(locate_chrome_from(Some(&bin)).unwrap(), bin);
    }

    #[test]
    fn no_candidate_message_mentions_override() {
        assert!(LocateError::NoCandidate.to_string().contains(CHROME_PATH_ENV));
    }
}
