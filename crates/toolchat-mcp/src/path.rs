//! PATH construction and working-directory checks for MCP server processes.
//!
//! Desktop-launched processes often inherit a minimal PATH, which breaks
//! servers started through `npx`, `uvx` and similar shims. The effective PATH
//! handed to a child therefore includes:
//! 1. Directory containing the executable (so scripts find their interpreters)
//! 2. Current process PATH
//! 3. Platform-specific default paths (macOS: Homebrew, etc.)

use std::collections::HashSet;
use std::path::Path;

use crate::env::EnvProvider;

/// Platform-specific PATH separator
#[cfg(unix)]
pub const PATH_SEPARATOR: &str = ":";
#[cfg(windows)]
pub const PATH_SEPARATOR: &str = ";";

/// Default paths to include on macOS when PATH is limited (bundled apps)
#[cfg(target_os = "macos")]
const MACOS_DEFAULT_PATHS: &str = "/opt/homebrew/bin:/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";

/// Build the PATH for a child process. Entries are deduplicated, first wins.
pub fn build_effective_path(exe_path: &str, env: &dyn EnvProvider) -> String {
    let mut path_entries = Vec::new();

    if let Some(exe_dir) = Path::new(exe_path).parent() {
        if let Some(dir_str) = exe_dir.to_str() {
            if !dir_str.is_empty() {
                path_entries.push(dir_str.to_string());
            }
        }
    }

    if let Some(current_path) = env.get("PATH") {
        if let Some(current_path_str) = current_path.to_str() {
            for entry in current_path_str.split(PATH_SEPARATOR) {
                if !entry.is_empty() {
                    path_entries.push(entry.to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        for entry in MACOS_DEFAULT_PATHS.split(':') {
            path_entries.push(entry.to_string());
        }
    }

    let mut seen = HashSet::new();
    let deduped: Vec<String> = path_entries
        .into_iter()
        .filter(|entry| seen.insert(entry.clone()))
        .collect();

    deduped.join(PATH_SEPARATOR)
}

/// Validate a working directory.
///
/// Returns Ok(()) if the directory exists and is actually a directory.
pub fn validate_working_dir(cwd: &str) -> Result<(), String> {
    let path = Path::new(cwd);

    if !path.exists() {
        return Err(format!("Working directory does not exist: {cwd}"));
    }

    if !path.is_dir() {
        return Err(format!("Working directory path is not a directory: {cwd}"));
    }

    Ok(())
}
