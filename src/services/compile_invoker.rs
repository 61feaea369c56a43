//! Invocation of the external Java compiler.

use super::process::{self, ProcessExit, ProcessLimits};
use super::tool_locator::COMPILER;
use crate::error::{BuildError, BuildResult};
use crate::models::{CompileResult, CompileStatus, Diagnostic, IdeSettings, OutputLine, SourceFile};
use camino::{Utf8Path, Utf8PathBuf};
use std::io::Write;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio::sync::watch;

/// Fully built compiler arguments.
///
/// When the source list went into an argument file, the file lives as long as this value.
#[derive(Debug)]
pub struct CompilerArguments {
    pub args: Vec<String>,
    pub argfile: Option<NamedTempFile>,
}

/// Runs `javac` over a set of sources
pub struct CompileInvoker {
    compiler: Utf8PathBuf,
    encoding: String,
    argfile_threshold: usize,
    limits: ProcessLimits,
}

impl CompileInvoker {
    pub fn new(compiler: impl Into<Utf8PathBuf>, settings: &IdeSettings) -> Self {
        Self {
            compiler: compiler.into(),
            encoding: settings.source_encoding.clone(),
            argfile_threshold: settings.argfile_threshold,
            limits: ProcessLimits {
                timeout: settings.compile_timeout(),
                grace: settings.cancel_grace(),
            },
        }
    }

    /// Keep the classpath entries that exist, in order and without duplicates.
    ///
    /// Every skipped entry yields a warning diagnostic; a missing library is never fatal on
    /// its own, the compiler reports the symbols it could not resolve.
    pub fn resolve_classpath<'a, I>(entries: I) -> (Vec<Utf8PathBuf>, Vec<Diagnostic>)
    where
        I: IntoIterator<Item = &'a Utf8PathBuf>,
    {
        let mut resolved: Vec<Utf8PathBuf> = Vec::new();
        let mut warnings = Vec::new();

        for entry in entries {
            if resolved.contains(entry) {
                continue;
            }
            if entry.exists() {
                resolved.push(entry.clone());
            } else {
                tracing::warn!("Classpath entry not found, skipping: {}", entry);
                warnings.push(Diagnostic::warning(format!(
                    "Classpath entry not found, skipping: {}",
                    entry
                )));
            }
        }

        (resolved, warnings)
    }

    /// Build the compiler argument list, moving the sources into an `@argfile` when the
    /// command line would exceed the configured threshold.
    pub fn build_arguments(
        &self,
        sources: &[SourceFile],
        classpath: &[Utf8PathBuf],
        output_dir: &Utf8Path,
    ) -> BuildResult<CompilerArguments> {
        let mut args = vec![
            "-d".to_string(),
            output_dir.to_string(),
            "-encoding".to_string(),
            self.encoding.clone(),
        ];

        if !classpath.is_empty() {
            args.push("-cp".to_string());
            args.push(join_classpath(classpath));
        }

        let source_args: Vec<String> = sources.iter().map(|s| s.path.to_string()).collect();
        let length = self.compiler.as_str().len()
            + args.iter().chain(&source_args).map(|a| a.len() + 1).sum::<usize>();

        if length <= self.argfile_threshold {
            args.extend(source_args);
            return Ok(CompilerArguments { args, argfile: None });
        }

        let argfile = write_argfile(&source_args)?;
        let argfile_path = Utf8Path::from_path(argfile.path())
            .ok_or_else(|| {
                BuildError::io(
                    output_dir,
                    std::io::Error::other("argument file path is not valid UTF-8"),
                )
            })?
            .to_string();

        tracing::debug!(
            "Command line is {} characters, passing {} sources via @{}",
            length,
            sources.len(),
            argfile_path
        );
        args.push(format!("@{}", argfile_path));

        Ok(CompilerArguments {
            args,
            argfile: Some(argfile),
        })
    }

    /// Compile `sources` into `output_dir`.
    ///
    /// Each output line is passed to `on_line` while the compiler runs. A non-zero exit is a
    /// [`CompileStatus::Failure`], not an error; cancellation yields [`CompileStatus::Cancelled`].
    ///
    /// # Errors
    ///
    /// - [`BuildError::ToolInvocationError`] if `javac` cannot be started
    /// - [`BuildError::Timeout`] if it runs longer than the compile timeout
    /// - [`BuildError::Io`] if the output directory or argument file cannot be created
    pub async fn compile<F>(
        &self,
        sources: &[SourceFile],
        classpath: &[Utf8PathBuf],
        output_dir: &Utf8Path,
        on_line: F,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> BuildResult<CompileResult>
    where
        F: FnMut(&OutputLine),
    {
        std::fs::create_dir_all(output_dir).map_err(|e| BuildError::io(output_dir, e))?;

        // Keep the argfile alive until the compiler is done with it
        let arguments = self.build_arguments(sources, classpath, output_dir)?;

        let mut command = Command::new(self.compiler.as_std_path());
        command.args(&arguments.args);

        tracing::info!("Compiling {} source file(s) into {}", sources.len(), output_dir);
        tracing::debug!("Compiler command: {}", process::describe_command(&command));

        let output = process::run_streaming(command, on_line, cancel_rx, self.limits)
            .await
            .map_err(|source| BuildError::ToolInvocationError {
                tool: COMPILER.to_string(),
                path: self.compiler.clone(),
                source,
            })?;

        drop(arguments);

        let status = match output.exit {
            ProcessExit::TimedOut => {
                return Err(BuildError::Timeout {
                    tool: COMPILER.to_string(),
                    after: self.limits.timeout,
                });
            }
            ProcessExit::Cancelled => CompileStatus::Cancelled,
            exit if exit.success() => CompileStatus::Success,
            _ => CompileStatus::Failure,
        };

        tracing::info!(
            "Compiler finished with {:?} (exit code {:?}) in {:.2}s",
            status,
            output.exit.code(),
            output.duration.as_secs_f64()
        );

        Ok(CompileResult {
            status,
            lines: output.lines,
            duration: output.duration,
            exit_code: output.exit.code(),
        })
    }
}

/// Join classpath entries with the platform separator (`:` or `;`)
pub fn join_classpath(entries: &[Utf8PathBuf]) -> String {
    let separator = if cfg!(windows) { ";" } else { ":" };
    entries
        .iter()
        .map(|e| e.as_str())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Quote an argument for a javac `@argfile`
fn quote_argfile_entry(arg: &str) -> String {
    format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
}

fn write_argfile(args: &[String]) -> BuildResult<NamedTempFile> {
    let temp_dir = std::env::temp_dir();
    let io_err = |e| BuildError::io(Utf8PathBuf::from(temp_dir.to_string_lossy().as_ref()), e);

    let mut file = tempfile::Builder::new()
        .prefix("modide-sources-")
        .suffix(".txt")
        .tempfile()
        .map_err(io_err)?;

    for arg in args {
        writeln!(file, "{}", quote_argfile_entry(arg)).map_err(io_err)?;
    }
    file.flush().map_err(io_err)?;

    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn source(path: &str) -> SourceFile {
        SourceFile {
            path: Utf8PathBuf::from(path),
            relative_path: Utf8PathBuf::from(Utf8Path::new(path).file_name().unwrap()),
            modified: SystemTime::UNIX_EPOCH,
        }
    }

    fn invoker(threshold: usize) -> CompileInvoker {
        let settings = IdeSettings {
            argfile_threshold: threshold,
            ..IdeSettings::default()
        };
        CompileInvoker::new("/jdk/bin/javac", &settings)
    }

    #[test]
    fn test_resolve_classpath_skips_missing_entries() {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let lib = root.join("forge.jar");
        std::fs::write(&lib, b"PK").unwrap();
        let missing = root.join("missing.jar");

        let entries = vec![lib.clone(), missing.clone(), lib.clone()];
        let (resolved, warnings) = CompileInvoker::resolve_classpath(&entries);

        assert_eq!(resolved, vec![lib]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity, crate::models::Severity::Warning);
        assert!(warnings[0].message.contains("missing.jar"));
        assert!(warnings[0].file.is_none());
    }

    #[test]
    fn test_arguments_inline() {
        let args = invoker(8000)
            .build_arguments(
                &[source("/p/src/A.java"), source("/p/src/B.java")],
                &[Utf8PathBuf::from("/libs/a.jar"), Utf8PathBuf::from("/libs/b.jar")],
                Utf8Path::new("/p/build/classes"),
            )
            .unwrap();

        assert!(args.argfile.is_none());
        assert_eq!(&args.args[..4], ["-d", "/p/build/classes", "-encoding", "UTF-8"]);
        assert_eq!(args.args[4], "-cp");
        assert_eq!(args.args[5], join_classpath(&[
            Utf8PathBuf::from("/libs/a.jar"),
            Utf8PathBuf::from("/libs/b.jar"),
        ]));
        assert_eq!(&args.args[6..], ["/p/src/A.java", "/p/src/B.java"]);
    }

    #[test]
    fn test_empty_classpath_omits_flag() {
        let args = invoker(8000)
            .build_arguments(&[source("/p/A.java")], &[], Utf8Path::new("/out"))
            .unwrap();
        assert!(!args.args.contains(&"-cp".to_string()));
    }

    #[test]
    fn test_long_command_uses_argfile() {
        let sources: Vec<_> = (0..50)
            .map(|i| source(&format!("/project/src/main/java/com/example/Generated{}.java", i)))
            .collect();

        let args = invoker(200)
            .build_arguments(&sources, &[], Utf8Path::new("/out"))
            .unwrap();

        let argfile = args.argfile.as_ref().expect("argfile expected");
        let last = args.args.last().unwrap();
        assert!(last.starts_with('@'));
        assert!(!args.args.iter().any(|a| a.ends_with(".java")));

        let content = std::fs::read_to_string(argfile.path()).unwrap();
        assert_eq!(content.lines().count(), 50);
        assert!(content.lines().all(|l| l.starts_with('"') && l.ends_with('"')));
    }

    #[test]
    fn test_argfile_quoting() {
        assert_eq!(quote_argfile_entry("/a b/C.java"), "\"/a b/C.java\"");
        assert_eq!(
            quote_argfile_entry(r"C:\mods\My Mod\A.java"),
            r#""C:\\mods\\My Mod\\A.java""#
        );
    }
}
