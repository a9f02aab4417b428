// Process lookup and execution for the build tool

use fiji_install_core::{FijiInstallError, Invocation, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tracing::debug;

/// Directories searched when `PATH` is unset, as `execvp` does
#[cfg(unix)]
const DEFAULT_SEARCH_PATH: Option<&str> = Some("/bin:/usr/bin");
#[cfg(not(unix))]
const DEFAULT_SEARCH_PATH: Option<&str> = None;

/// `PATH` if set, otherwise the platform default
pub fn search_path(path: Option<OsString>) -> Option<OsString> {
    path.or_else(|| DEFAULT_SEARCH_PATH.map(OsString::from))
}

/// Locate `tool` on `PATH`. Relative paths such as `./mvnw` resolve against `cwd`.
/// The result is absolute whenever `cwd` is.
pub fn resolve_program(tool: &str, cwd: &Path) -> Result<PathBuf> {
    let path = search_path(std::env::var_os("PATH"));
    let program = which::which_in(tool, path, cwd).map_err(|e| FijiInstallError::ToolNotFound {
        tool: tool.to_string(),
        reason: e.to_string(),
    })?;

    if program.is_absolute() {
        Ok(program)
    } else {
        Ok(absolute(&program)?)
    }
}

/// Join a relative path onto the caller's current directory
pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| FijiInstallError::WorkingDirectory(e.to_string()))?;
    Ok(cwd.join(path))
}

/// Directory holding the running executable
pub fn executable_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe()
        .and_then(|p| p.canonicalize())
        .map_err(|e| FijiInstallError::WorkingDirectory(e.to_string()))?;

    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            FijiInstallError::WorkingDirectory(format!("{} has no parent directory", exe.display()))
        })
}

/// Spawn the invocation and block until it exits
pub fn run_blocking(invocation: &Invocation) -> Result<ExitStatus> {
    debug!(
        program = %invocation.program,
        working_dir = %invocation.working_dir.display(),
        "Spawning build tool"
    );

    invocation
        .to_command()
        .status()
        .map_err(|source| FijiInstallError::Spawn {
            program: invocation.program.clone(),
            source,
        })
}
