//! Discovery and validation of the external JDK tools.
//!
//! Both `javac` and `jar` are looked up in this order:
//! 1. `<tool home>/bin/<tool>` and `<tool home>/<tool>` when a tool home is configured
//! 2. `$JAVA_HOME/bin/<tool>`
//! 3. each directory on `PATH`
//!
//! A located tool is then probed (`javac -version`, `jar --version`) so a broken
//! installation is reported before any build work starts.

use super::process::{self, ProcessExit, ProcessLimits};
use crate::error::{BuildError, BuildResult};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::watch;

pub const COMPILER: &str = "javac";
pub const ARCHIVER: &str = "jar";

/// Grace period for a probe that overran its timeout
const PROBE_GRACE: Duration = Duration::from_millis(500);

/// Read-only view of the process environment and filesystem used for tool lookup
#[cfg_attr(test, mockall::automock)]
pub trait Environment: Send + Sync {
    /// Value of an environment variable, if set and valid UTF-8
    fn var(&self, key: &str) -> Option<String>;

    /// Whether `path` is an existing executable file
    fn is_executable(&self, path: &Utf8Path) -> bool;
}

impl<T: Environment + ?Sized> Environment for Arc<T> {
    fn var(&self, key: &str) -> Option<String> {
        (**self).var(key)
    }

    fn is_executable(&self, path: &Utf8Path) -> bool {
        (**self).is_executable(path)
    }
}

/// The real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    #[cfg(unix)]
    fn is_executable(&self, path: &Utf8Path) -> bool {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    fn is_executable(&self, path: &Utf8Path) -> bool {
        path.is_file()
    }
}

/// A located and probed tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTool {
    pub name: String,
    pub path: Utf8PathBuf,
    /// First line the version probe printed
    pub version: Option<String>,
}

/// The compiler and archiver used for one build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub compiler: ResolvedTool,
    pub archiver: ResolvedTool,
}

/// Finds `javac` and `jar` and checks that they respond
pub struct ToolLocator<E: Environment = SystemEnvironment> {
    env: E,
    tool_home: Option<Utf8PathBuf>,
    probe_timeout: Duration,
}

impl ToolLocator<SystemEnvironment> {
    pub fn new(tool_home: Option<Utf8PathBuf>, probe_timeout: Duration) -> Self {
        Self::with_environment(SystemEnvironment, tool_home, probe_timeout)
    }
}

impl<E: Environment> ToolLocator<E> {
    pub fn with_environment(env: E, tool_home: Option<Utf8PathBuf>, probe_timeout: Duration) -> Self {
        Self {
            env,
            tool_home,
            probe_timeout,
        }
    }

    /// Every path `tool` is looked for at, in resolution order
    pub fn candidates(&self, tool: &str) -> Vec<Utf8PathBuf> {
        let file_name = executable_name(tool);
        let mut candidates = Vec::new();

        if let Some(home) = &self.tool_home {
            candidates.push(home.join("bin").join(&file_name));
            candidates.push(home.join(&file_name));
        }

        if let Some(java_home) = self.env.var("JAVA_HOME").filter(|v| !v.trim().is_empty()) {
            candidates.push(Utf8PathBuf::from(java_home).join("bin").join(&file_name));
        }

        if let Some(path_var) = self.env.var("PATH") {
            for dir in std::env::split_paths(&path_var) {
                match Utf8PathBuf::from_path_buf(dir) {
                    Ok(dir) if !dir.as_str().is_empty() => candidates.push(dir.join(&file_name)),
                    Ok(_) => {}
                    Err(dir) => tracing::debug!("Skipping non-UTF-8 PATH entry: {}", dir.display()),
                }
            }
        }

        candidates
    }

    /// Resolve `tool` to the first executable candidate
    pub fn find(&self, tool: &str) -> BuildResult<Utf8PathBuf> {
        let candidates = self.candidates(tool);

        if let Some(path) = candidates.iter().find(|p| self.env.is_executable(p)) {
            tracing::debug!("Resolved {} to {}", tool, path);
            return Ok(path.clone());
        }

        let searched = if candidates.is_empty() {
            "no tool home, JAVA_HOME or PATH configured".to_string()
        } else {
            candidates
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };

        Err(BuildError::ToolNotFound {
            tool: tool.to_string(),
            searched,
        })
    }

    /// Run the tool's version probe and return the first line it printed.
    ///
    /// # Errors
    ///
    /// - [`BuildError::ToolUnresponsive`] if the probe outlives the timeout
    /// - [`BuildError::ToolInvocationError`] if the tool cannot be started
    /// - [`BuildError::Cancelled`] if `cancel_rx` fires during the probe
    pub async fn probe(
        &self,
        tool: &str,
        path: &Utf8Path,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> BuildResult<Option<String>> {
        let mut command = Command::new(path.as_std_path());
        command.arg(probe_argument(tool));

        tracing::debug!("Probing {}", process::describe_command(&command));

        let output = process::run_streaming(
            command,
            |_| {},
            cancel_rx,
            ProcessLimits {
                timeout: self.probe_timeout,
                grace: PROBE_GRACE,
            },
        )
        .await
        .map_err(|source| BuildError::ToolInvocationError {
            tool: tool.to_string(),
            path: path.to_path_buf(),
            source,
        })?;

        match output.exit {
            ProcessExit::TimedOut => Err(BuildError::ToolUnresponsive {
                tool: tool.to_string(),
                timeout: self.probe_timeout,
            }),
            ProcessExit::Cancelled => Err(BuildError::Cancelled),
            ProcessExit::Exited(code) => {
                if code != Some(0) {
                    tracing::warn!("{} version probe exited with {:?}", tool, code);
                }
                Ok(output
                    .lines
                    .iter()
                    .map(|l| l.text.trim())
                    .find(|l| !l.is_empty())
                    .map(str::to_string))
            }
        }
    }

    /// Resolve and probe both tools.
    ///
    /// Both tools are located before either is probed, so a missing archiver is reported
    /// without running anything.
    pub async fn locate(&self, cancel_rx: &mut watch::Receiver<bool>) -> BuildResult<Toolchain> {
        let compiler_path = self.find(COMPILER)?;
        let archiver_path = self.find(ARCHIVER)?;

        let compiler_version = self.probe(COMPILER, &compiler_path, cancel_rx).await?;
        let archiver_version = self.probe(ARCHIVER, &archiver_path, cancel_rx).await?;

        tracing::info!(
            "Using {} ({}) and {} ({})",
            compiler_path,
            compiler_version.as_deref().unwrap_or("unknown version"),
            archiver_path,
            archiver_version.as_deref().unwrap_or("unknown version")
        );

        Ok(Toolchain {
            compiler: ResolvedTool {
                name: COMPILER.to_string(),
                path: compiler_path,
                version: compiler_version,
            },
            archiver: ResolvedTool {
                name: ARCHIVER.to_string(),
                path: archiver_path,
                version: archiver_version,
            },
        })
    }
}

fn executable_name(tool: &str) -> String {
    format!("{}{}", tool, std::env::consts::EXE_SUFFIX)
}

fn probe_argument(tool: &str) -> &'static str {
    if tool == COMPILER {
        "-version"
    } else {
        "--version"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locator(env: MockEnvironment, home: Option<&str>) -> ToolLocator<MockEnvironment> {
        ToolLocator::with_environment(env, home.map(Utf8PathBuf::from), Duration::from_secs(1))
    }

    #[test]
    fn test_tool_home_bin_wins() {
        let mut env = MockEnvironment::new();
        env.expect_var().returning(|_| None);
        let expected = Utf8PathBuf::from("/jdk").join("bin").join(executable_name("javac"));
        let wanted = expected.clone();
        env.expect_is_executable()
            .returning(move |p| p == wanted.as_path());

        let locator = locator(env, Some("/jdk"));
        assert_eq!(locator.find("javac").unwrap(), expected);
    }

    #[test]
    fn test_falls_back_to_java_home() {
        let mut env = MockEnvironment::new();
        env.expect_var()
            .returning(|key| (key == "JAVA_HOME").then(|| "/usr/lib/jvm/java-17".to_string()));
        env.expect_is_executable()
            .returning(|p| p.starts_with("/usr/lib/jvm/java-17/bin"));

        let locator = locator(env, Some("/broken-home"));
        let path = locator.find("jar").unwrap();
        assert_eq!(
            path,
            Utf8PathBuf::from("/usr/lib/jvm/java-17/bin").join(executable_name("jar"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_searches_path_in_order() {
        let mut env = MockEnvironment::new();
        env.expect_var()
            .returning(|key| (key == "PATH").then(|| "/usr/local/bin:/opt/jdk/bin:/usr/bin".to_string()));
        env.expect_is_executable()
            .returning(|p| p.as_str() == "/opt/jdk/bin/javac" || p.as_str() == "/usr/bin/javac");

        let locator = locator(env, None);
        assert_eq!(locator.find("javac").unwrap(), Utf8PathBuf::from("/opt/jdk/bin/javac"));
    }

    #[test]
    fn test_not_found_lists_searched_locations() {
        let mut env = MockEnvironment::new();
        env.expect_var().returning(|_| None);
        env.expect_is_executable().returning(|_| false);

        let locator = locator(env, Some("/jdk"));
        match locator.find("javac") {
            Err(BuildError::ToolNotFound { tool, searched }) => {
                assert_eq!(tool, "javac");
                assert!(searched.contains("/jdk"));
            }
            other => panic!("expected ToolNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_not_found_without_any_search_location() {
        let mut env = MockEnvironment::new();
        env.expect_var().returning(|_| None);
        env.expect_is_executable().never();

        let locator = locator(env, None);
        let err = locator.find("jar").unwrap_err();
        assert!(err.to_string().contains("no tool home"));
    }

    #[test]
    fn test_locate_reports_missing_archiver_before_probing() {
        let mut env = MockEnvironment::new();
        env.expect_var().returning(|_| None);
        // javac exists at a path that cannot run; jar does not exist at all
        env.expect_is_executable()
            .returning(|p| p.file_stem() == Some("javac"));

        let locator = locator(env, Some("/nonexistent-jdk"));
        let (_tx, mut rx) = watch::channel(false);
        let err = tokio_test::block_on(locator.locate(&mut rx)).unwrap_err();
        assert!(matches!(err, BuildError::ToolNotFound { ref tool, .. } if tool == "jar"));
    }

    #[test]
    fn test_probe_arguments() {
        assert_eq!(probe_argument("javac"), "-version");
        assert_eq!(probe_argument("jar"), "--version");
    }
}
