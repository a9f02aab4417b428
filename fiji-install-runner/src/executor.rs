use chrono::Utc;
use fiji_install_core::{Invocation, LaunchReport, LauncherConfig, Result};
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::process::{absolute, executable_dir, resolve_program, run_blocking};

/// Runs the build tool against a Fiji installation
#[derive(Debug, Clone, Default)]
pub struct Launcher {
    config: LauncherConfig,
}

impl Launcher {
    pub fn new(config: LauncherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    /// Directory the build tool runs in: the configured project directory,
    /// otherwise the directory of the launcher executable. Always absolute.
    pub fn working_dir(&self) -> Result<PathBuf> {
        match &self.config.project_dir {
            Some(dir) => absolute(dir),
            None => executable_dir(),
        }
    }

    /// Arguments after the program name. The target is passed through untouched.
    pub fn build_args<S: AsRef<OsStr>>(&self, target: S) -> Vec<OsString> {
        std::iter::once(self.config.property_flag(target))
            .chain(self.config.phases.iter().map(OsString::from))
            .collect()
    }

    /// Plan the call without touching `PATH`
    pub fn plan<S: AsRef<OsStr>>(&self, target: S) -> Result<Invocation> {
        Ok(Invocation {
            program: self.config.tool.clone(),
            args: self.build_args(target),
            working_dir: self.working_dir()?,
        })
    }

    /// Replace the program name with its location on `PATH`
    pub fn resolve(&self, invocation: Invocation) -> Result<Invocation> {
        let program = resolve_program(&invocation.program, &invocation.working_dir)?;
        Ok(Invocation {
            program: program.to_string_lossy().into_owned(),
            ..invocation
        })
    }

    /// Run the build and wait for it. A failing build is not an error here;
    /// it shows up in the report.
    pub fn launch<S: AsRef<OsStr>>(&self, target: S) -> Result<LaunchReport> {
        let invocation = self.resolve(self.plan(target)?)?;

        info!(
            command = %invocation.command_line(),
            working_dir = %invocation.working_dir.display(),
            "Starting build"
        );

        let started_at = Utc::now();
        let start_instant = std::time::Instant::now();

        let status = run_blocking(&invocation)?;

        let duration_ms = start_instant.elapsed().as_millis() as u64;
        let completed_at = Utc::now();
        let exit_code = status.code();

        if status.success() {
            info!(exit_code = ?exit_code, duration_ms, "Build completed");
        } else {
            warn!(exit_code = ?exit_code, duration_ms, "Build tool reported failure");
        }

        Ok(LaunchReport {
            invocation,
            success: status.success(),
            exit_code,
            duration_ms,
            started_at,
            completed_at,
        })
    }
}
