use camino::Utf8PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that abort a build.
///
/// Compiler diagnostics are never represented here: they are data attached to the
/// [`BuildReport`](crate::models::BuildReport), even when they make the build fail.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("{tool} not found (searched: {searched})")]
    ToolNotFound { tool: String, searched: String },

    #[error("{tool} did not answer its version probe within {timeout:?}")]
    ToolUnresponsive { tool: String, timeout: Duration },

    #[error("Failed to launch {tool} at {path}: {source}")]
    ToolInvocationError {
        tool: String,
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("No source files found under {0}")]
    NoSourceFiles(Utf8PathBuf),

    #[error("Compilation failed with {errors} error(s)")]
    CompilationFailed { errors: usize },

    #[error("Main class {0} was not produced by the compiler")]
    ManifestMainClassMissing(String),

    #[error("Failed to launch archiver at {path}: {source}")]
    ArchiverInvocationError {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Archiver exited with code {0}")]
    ArchiverFailed(i32),

    #[error("{tool} timed out after {after:?}")]
    Timeout { tool: String, after: Duration },

    #[error("A build is already in progress")]
    BuildAlreadyInProgress,

    #[error("No build is in progress")]
    NoBuildInProgress,

    #[error("Build cancelled")]
    Cancelled,

    #[error("Invalid build configuration: {0}")]
    InvalidConfiguration(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        source: std::io::Error,
    },
}

/// Copyable discriminant of [`BuildError`], carried by build reports and progress events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuildErrorKind {
    ToolNotFound,
    ToolUnresponsive,
    ToolInvocationError,
    NoSourceFiles,
    CompilationFailed,
    ManifestMainClassMissing,
    ArchiverInvocationError,
    ArchiverFailed,
    Timeout,
    BuildAlreadyInProgress,
    NoBuildInProgress,
    Cancelled,
    InvalidConfiguration,
    Io,
}

impl BuildError {
    pub fn kind(&self) -> BuildErrorKind {
        match self {
            BuildError::ToolNotFound { .. } => BuildErrorKind::ToolNotFound,
            BuildError::ToolUnresponsive { .. } => BuildErrorKind::ToolUnresponsive,
            BuildError::ToolInvocationError { .. } => BuildErrorKind::ToolInvocationError,
            BuildError::NoSourceFiles(_) => BuildErrorKind::NoSourceFiles,
            BuildError::CompilationFailed { .. } => BuildErrorKind::CompilationFailed,
            BuildError::ManifestMainClassMissing(_) => BuildErrorKind::ManifestMainClassMissing,
            BuildError::ArchiverInvocationError { .. } => BuildErrorKind::ArchiverInvocationError,
            BuildError::ArchiverFailed(_) => BuildErrorKind::ArchiverFailed,
            BuildError::Timeout { .. } => BuildErrorKind::Timeout,
            BuildError::BuildAlreadyInProgress => BuildErrorKind::BuildAlreadyInProgress,
            BuildError::NoBuildInProgress => BuildErrorKind::NoBuildInProgress,
            BuildError::Cancelled => BuildErrorKind::Cancelled,
            BuildError::InvalidConfiguration(_) => BuildErrorKind::InvalidConfiguration,
            BuildError::Io { .. } => BuildErrorKind::Io,
        }
    }

    /// Wrap an IO error with the path it happened at
    pub fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type BuildResult<T> = Result<T, BuildError>;
