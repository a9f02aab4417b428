use anyhow::Context;
use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use fiji_install_core::{ExitPolicy, LauncherConfig};
use fiji_install_runner::Launcher;
use std::path::PathBuf;
use std::process;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fiji-install")]
#[command(about = "Build the plugin with Maven and install it into a Fiji installation", long_about = None)]
struct Cli {
    /// Fiji installation directory, passed to the build as imagej.app.directory
    #[arg(value_name = "FIJI_DIR")]
    fiji_dir: PathBuf,

    /// Directory to run the build in (defaults to the directory of this executable)
    #[arg(long, value_name = "DIR")]
    project_dir: Option<PathBuf>,

    /// Build tool to invoke
    #[arg(long, value_name = "PROGRAM", default_value = fiji_install_core::DEFAULT_TOOL)]
    mvn: String,

    /// Print the command that would run and exit
    #[arg(long)]
    dry_run: bool,

    /// Exit with the build tool's exit code instead of 0
    #[arg(long)]
    propagate_exit_code: bool,

    /// Write a JSON report of the run to this file
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,
}

impl Cli {
    fn config(&self) -> LauncherConfig {
        let policy = if self.propagate_exit_code {
            ExitPolicy::Propagate
        } else {
            ExitPolicy::Ignore
        };

        let config = LauncherConfig::new()
            .with_tool(self.mvn.as_str())
            .with_exit_policy(policy);

        match &self.project_dir {
            Some(dir) => config.with_project_dir(dir),
            None => config,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::default().add_directive(cli.verbose.tracing_level_filter().into())
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

/// Returns the exit code for the launcher process
fn run(cli: &Cli) -> anyhow::Result<i32> {
    let config = cli.config();
    let policy = config.exit_policy;
    let launcher = Launcher::new(config);

    if cli.dry_run {
        let invocation = launcher
            .plan(&cli.fiji_dir)
            .context("Failed to plan build invocation")?;
        println!("Working directory: {}", invocation.working_dir.display());
        println!("Command: {}", invocation.command_line());
        return Ok(0);
    }

    let report = launcher
        .launch(&cli.fiji_dir)
        .with_context(|| format!("Failed to run build for {}", cli.fiji_dir.display()))?;

    // The build has already run; a lost report does not change the exit code
    if let Some(path) = &cli.report {
        if let Err(e) = report.write_json(path) {
            warn!(path = %path.display(), error = %e, "Failed to write report");
        }
    }

    if !report.success && policy == ExitPolicy::Ignore {
        warn!(
            exit_code = ?report.exit_code,
            "Build failed; exiting 0 (pass --propagate-exit-code to forward the failure)"
        );
    }

    Ok(policy.exit_code(&report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn test_missing_fiji_dir_is_rejected() {
        let err = Cli::try_parse_from(["fiji-install"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["fiji-install", "/opt/fiji"]).unwrap();
        assert_eq!(cli.fiji_dir, PathBuf::from("/opt/fiji"));

        let config = cli.config();
        assert_eq!(config, LauncherConfig::default());
        assert_eq!(cli.verbose.tracing_level_filter(), LevelFilter::WARN);
    }

    #[test]
    fn test_quiet_lowers_log_level() {
        let cli = Cli::try_parse_from(["fiji-install", "-q", "/opt/fiji"]).unwrap();
        assert_eq!(cli.verbose.tracing_level_filter(), LevelFilter::ERROR);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_fiji_dir_is_planned_verbatim() {
        use std::ffi::OsString;
        use std::os::unix::ffi::{OsStrExt, OsStringExt};

        let target = OsString::from_vec(b"/opt/fiji-\xff".to_vec());
        let cli = Cli::try_parse_from([
            OsString::from("fiji-install"),
            OsString::from("--project-dir"),
            OsString::from("/srv/plugin"),
            target.clone(),
        ])
        .unwrap();
        assert_eq!(cli.fiji_dir.as_os_str(), target.as_os_str());

        let invocation = Launcher::new(cli.config()).plan(&cli.fiji_dir).unwrap();
        assert_eq!(
            invocation.args[0].as_bytes(),
            b"-Dimagej.app.directory=/opt/fiji-\xff"
        );
    }

    #[test]
    fn test_flags_map_to_config() {
        let cli = Cli::try_parse_from([
            "fiji-install",
            "--project-dir",
            "/srv/plugin",
            "--mvn",
            "./mvnw",
            "--propagate-exit-code",
            "-vv",
            "/opt/fiji",
        ])
        .unwrap();

        let config = cli.config();
        assert_eq!(config.tool, "./mvnw");
        assert_eq!(config.project_dir, Some(PathBuf::from("/srv/plugin")));
        assert_eq!(config.exit_policy, ExitPolicy::Propagate);
        assert_eq!(cli.verbose.tracing_level_filter(), LevelFilter::DEBUG);
    }

    #[test]
    fn test_dry_run_spawns_nothing() {
        let project = tempfile::tempdir().unwrap();
        let project_dir = project.path().to_string_lossy().into_owned();
        let cli = Cli::try_parse_from([
            "fiji-install",
            "--dry-run",
            "--mvn",
            "definitely-not-a-build-tool-4711",
            "--project-dir",
            project_dir.as_str(),
            "/opt/fiji",
        ])
        .unwrap();

        assert_eq!(run(&cli).unwrap(), 0);
    }

    #[test]
    fn test_missing_tool_is_an_error() {
        let project = tempfile::tempdir().unwrap();
        let project_dir = project.path().to_string_lossy().into_owned();
        let cli = Cli::try_parse_from([
            "fiji-install",
            "--mvn",
            "definitely-not-a-build-tool-4711",
            "--project-dir",
            project_dir.as_str(),
            "/opt/fiji",
        ])
        .unwrap();

        assert!(run(&cli).is_err());
    }

    #[cfg(unix)]
    fn failing_tool(dir: &std::path::Path) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-mvn");
        std::fs::write(&path, "#!/bin/sh\nexit 4\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_build_exits_zero_by_default() {
        let project = tempfile::tempdir().unwrap();
        let tool = failing_tool(project.path());
        let project_dir = project.path().to_string_lossy().into_owned();
        let report = project.path().join("report.json");
        let report_arg = report.to_string_lossy().into_owned();

        let cli = Cli::try_parse_from([
            "fiji-install",
            "--mvn",
            tool.as_str(),
            "--project-dir",
            project_dir.as_str(),
            "--report",
            report_arg.as_str(),
            "/opt/fiji",
        ])
        .unwrap();

        assert_eq!(run(&cli).unwrap(), 0);

        let json = std::fs::read_to_string(&report).unwrap();
        assert!(json.contains("\"exit_code\": 4"));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_build_propagates_when_asked() {
        let project = tempfile::tempdir().unwrap();
        let tool = failing_tool(project.path());
        let project_dir = project.path().to_string_lossy().into_owned();

        let cli = Cli::try_parse_from([
            "fiji-install",
            "--propagate-exit-code",
            "--mvn",
            tool.as_str(),
            "--project-dir",
            project_dir.as_str(),
            "/opt/fiji",
        ])
        .unwrap();

        assert_eq!(run(&cli).unwrap(), 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_unwritable_report_keeps_exit_policy() {
        let project = tempfile::tempdir().unwrap();
        let tool = failing_tool(project.path());
        let project_dir = project.path().to_string_lossy().into_owned();
        let report = project.path().join("missing").join("report.json");
        let report_arg = report.to_string_lossy().into_owned();

        let ignore = Cli::try_parse_from([
            "fiji-install",
            "--mvn",
            tool.as_str(),
            "--project-dir",
            project_dir.as_str(),
            "--report",
            report_arg.as_str(),
            "/opt/fiji",
        ])
        .unwrap();
        assert_eq!(run(&ignore).unwrap(), 0);
        assert!(!report.exists());

        let propagate = Cli::try_parse_from([
            "fiji-install",
            "--propagate-exit-code",
            "--mvn",
            tool.as_str(),
            "--project-dir",
            project_dir.as_str(),
            "--report",
            report_arg.as_str(),
            "/opt/fiji",
        ])
        .unwrap();
        assert_eq!(run(&propagate).unwrap(), 4);
    }
}
