use thiserror::Error;

#[derive(Error, Debug)]
pub enum FijiInstallError {
    #[error("Cannot determine working directory: {0}")]
    WorkingDirectory(String),

    #[error("Build tool '{tool}' not found: {reason}")]
    ToolNotFound { tool: String, reason: String },

    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Report error: {0}")]
    ReportError(String),
}

pub type Result<T> = std::result::Result<T, FijiInstallError>;
