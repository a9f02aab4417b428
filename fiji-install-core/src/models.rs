use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{FijiInstallError, Result};

/// Build tool invoked when nothing else is configured
pub const DEFAULT_TOOL: &str = "mvn";

/// Property that tells the build where the Fiji installation lives
pub const DEFAULT_PROPERTY: &str = "imagej.app.directory";

/// Lifecycle phases run after the property assignment, in order
pub const DEFAULT_PHASES: [&str; 2] = ["clean", "install"];

/// What the launcher does with the build tool's exit code
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ExitPolicy {
    /// Exit 0 once the child has completed, whatever its status
    #[default]
    Ignore,
    /// Exit with the child's code, 1 if it was killed by a signal
    Propagate,
}

impl ExitPolicy {
    /// Exit code the launcher reports for a completed run
    pub fn exit_code(&self, report: &LaunchReport) -> i32 {
        match self {
            ExitPolicy::Ignore => 0,
            ExitPolicy::Propagate => match report.exit_code {
                Some(code) => code,
                None if report.success => 0,
                None => 1,
            },
        }
    }
}

/// Fixed parameters of the build invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LauncherConfig {
    pub tool: String,
    pub property: String,
    pub phases: Vec<String>,
    /// Overrides the launcher's own directory as the working directory
    pub project_dir: Option<PathBuf>,
    pub exit_policy: ExitPolicy,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            tool: DEFAULT_TOOL.to_string(),
            property: DEFAULT_PROPERTY.to_string(),
            phases: DEFAULT_PHASES.iter().map(|p| p.to_string()).collect(),
            project_dir: None,
            exit_policy: ExitPolicy::default(),
        }
    }
}

impl LauncherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool<S: Into<String>>(mut self, tool: S) -> Self {
        self.tool = tool.into();
        self
    }

    pub fn with_project_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.project_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_exit_policy(mut self, policy: ExitPolicy) -> Self {
        self.exit_policy = policy;
        self
    }

    /// `-D<property>=<target>`, with the target bytes kept as given
    pub fn property_flag<S: AsRef<OsStr>>(&self, target: S) -> OsString {
        let mut flag = OsString::from(format!("-D{}=", self.property));
        flag.push(target);
        flag
    }
}

/// A fully planned build tool call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invocation {
    pub program: String,
    /// Serialized lossily; paths need not be UTF-8
    #[serde(with = "lossy_args")]
    pub args: Vec<OsString>,
    pub working_dir: PathBuf,
}

impl Invocation {
    /// Program followed by its arguments
    pub fn argv(&self) -> Vec<OsString> {
        std::iter::once(OsString::from(&self.program))
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Space-joined command line, for display only
    pub fn command_line(&self) -> String {
        self.argv()
            .iter()
            .map(|arg| arg.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The process to spawn, with the parent's standard streams inherited
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        command
    }
}

mod lossy_args {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::ffi::OsString;

    pub fn serialize<S: Serializer>(args: &[OsString], serializer: S) -> Result<S::Ok, S::Error> {
        args.iter()
            .map(|arg| arg.to_string_lossy())
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<OsString>, D::Error> {
        let args = Vec::<String>::deserialize(deserializer)?;
        Ok(args.into_iter().map(OsString::from).collect())
    }
}

/// Outcome of one build tool run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchReport {
    pub invocation: Invocation,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl LaunchReport {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| FijiInstallError::ReportError(e.to_string()))
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
