use crate::error::BuildErrorKind;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime};

/// Severity of a compiler or archiver diagnostic.
///
/// Ordered from least to most severe so `max()` over a diagnostic list yields the worst one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn is_error(self) -> bool {
        self == Severity::Error
    }

    /// Map a severity word as printed by javac/jar (`error`, `Warning`, `Note`, ...)
    pub fn from_tool_word(word: &str) -> Self {
        match word.to_ascii_lowercase().as_str() {
            "error" | "fatal" => Severity::Error,
            "warning" | "warn" => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A structured record of one compiler/archiver message.
///
/// Tool output may be file-less (`warning: [options] ...`), so every location
/// component is optional.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub file: Option<Utf8PathBuf>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            file: None,
            line: None,
            column: None,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// A diagnostic that points at `file:line`
    pub fn located(
        severity: Severity,
        file: impl Into<Utf8PathBuf>,
        line: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            file: Some(file.into()),
            line: Some(line),
            column: None,
            message: message.into(),
        }
    }

    pub fn with_column(mut self, column: u32) -> Self {
        self.column = Some(column);
        self
    }

    /// First line of the message (context lines are appended after a newline).
    pub fn headline(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}", file)?;
            if let Some(line) = self.line {
                write!(f, ":{}", line)?;
                if let Some(column) = self.column {
                    write!(f, ":{}", column)?;
                }
            }
            write!(f, ": ")?;
        }
        write!(f, "{}: {}", self.severity, self.headline())
    }
}

/// A compilable source file found by the [`SourceCollector`](crate::services::SourceCollector).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path on disk
    pub path: Utf8PathBuf,
    /// Path relative to the source root (mirrors the package directory layout)
    pub relative_path: Utf8PathBuf,
    pub modified: SystemTime,
}

impl SourceFile {
    /// Package-qualified class name implied by the file location (`com/example/Foo.java` → `com.example.Foo`).
    pub fn class_name(&self) -> Option<String> {
        let stem = self.relative_path.file_stem()?;
        let package: Vec<&str> = self
            .relative_path
            .parent()
            .map(|p| p.components().map(|c| c.as_str()).collect())
            .unwrap_or_default();

        if package.is_empty() {
            Some(stem.to_string())
        } else {
            Some(format!("{}.{}", package.join("."), stem))
        }
    }
}

/// Which standard stream of a child process a line came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamSource {
    Stdout,
    Stderr,
}

/// One line of child-process output, tagged with its stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    pub source: StreamSource,
    pub text: String,
}

impl OutputLine {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            source: StreamSource::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            source: StreamSource::Stderr,
            text: text.into(),
        }
    }
}

/// Exit status of a compiler run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompileStatus {
    Success,
    Failure,
    Cancelled,
}

/// Raw result of one compiler invocation.
///
/// Owned by the [`CompileInvoker`](crate::services::CompileInvoker) until it is handed to the
/// [`DiagnosticParser`](crate::services::DiagnosticParser).
#[derive(Clone, Debug)]
pub struct CompileResult {
    pub status: CompileStatus,
    pub lines: Vec<OutputLine>,
    pub duration: Duration,
    /// Process exit code, `None` when the process was killed
    pub exit_code: Option<i32>,
}

/// Overall outcome of a build
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

impl fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildOutcome::Succeeded => write!(f, "succeeded"),
            BuildOutcome::Failed => write!(f, "failed"),
            BuildOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Terminal value of one build. Immutable once emitted.
#[derive(Clone, Debug)]
pub struct BuildReport {
    pub outcome: BuildOutcome,
    /// Kind of the error that ended the build, if any
    pub error: Option<BuildErrorKind>,
    /// Human-readable error text, surfaced verbatim to the UI
    pub error_message: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub artifact: Option<Utf8PathBuf>,
    pub artifact_size: u64,
    pub duration: Duration,
    pub timestamp: DateTime<Local>,
}

impl BuildReport {
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    pub fn is_success(&self) -> bool {
        self.outcome == BuildOutcome::Succeeded
    }

    /// Diagnostics that reference the given file
    pub fn diagnostics_for<'a>(&'a self, file: &'a Utf8Path) -> impl Iterator<Item = &'a Diagnostic> {
        self.diagnostics
            .iter()
            .filter(move |d| d.file.as_deref() == Some(file))
    }

    /// One-line summary shown in the status bar and at the end of the console output
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Build {} in {:.2}s: {} error(s), {} warning(s)",
            self.outcome,
            self.duration.as_secs_f64(),
            self.error_count(),
            self.warning_count()
        );

        if let Some(artifact) = &self.artifact {
            summary.push_str(&format!(
                " - {} ({})",
                artifact,
                format_file_size(self.artifact_size)
            ));
        } else if let Some(message) = &self.error_message {
            summary.push_str(&format!(" - {}", message));
        }

        summary
    }
}

/// Format a byte count the way the IDE status bar shows it (`0 B`, `1.5 KB`, `12.0 MB`).
pub fn format_file_size(size_bytes: u64) -> String {
    if size_bytes == 0 {
        return "0 B".to_string();
    }

    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = size_bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{:.1} {}", size, UNITS[unit])
}
