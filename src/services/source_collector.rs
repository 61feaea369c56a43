//! Enumeration of compilable source files under a project's source root.

use crate::error::{BuildError, BuildResult};
use crate::models::{IdeSettings, SourceFile};
use camino::{Utf8Path, Utf8PathBuf};
use ignore::WalkBuilder;
use regex::Regex;
use std::time::SystemTime;
use tokio::sync::watch;

/// Walks a source tree and returns the files the compiler should see.
///
/// The walk follows symbolic links; link cycles are detected and skipped. Top-level directories
/// whose name is in the exclude list, and any directory added with
/// [`exclude_path`](Self::exclude_path), are never descended into. A package directory deeper
/// in the tree is walked even when it shares a name with an excluded directory
/// (`com/example/build`). Results are sorted by path and recomputed on every call.
pub struct SourceCollector {
    extensions: Vec<String>,

    /// Directory names skipped directly below the walk root
    exclude_dirs: Vec<String>,

    /// Directories skipped wherever they appear, e.g. the project's build output
    exclude_paths: Vec<Utf8PathBuf>,

    /// Detects `public static void main(` declarations
    main_pattern: Regex,

    /// Captures the package declaration of a Java source
    package_pattern: Regex,

    /// Captures the name of the first public class
    class_pattern: Regex,
}

impl SourceCollector {
    pub fn new(extensions: Vec<String>, exclude_dirs: Vec<String>) -> Self {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_string())
                .collect(),
            exclude_dirs,
            exclude_paths: Vec::new(),
            main_pattern: Regex::new(r"public\s+static\s+void\s+main\s*\(").expect("Invalid main regex"),
            package_pattern: Regex::new(r"(?m)^\s*package\s+([\w.]+)\s*;").expect("Invalid package regex"),
            class_pattern: Regex::new(r"public\s+(?:(?:final|abstract)\s+)*class\s+(\w+)")
                .expect("Invalid class regex"),
        }
    }

    pub fn from_settings(settings: &IdeSettings) -> Self {
        Self::new(settings.source_extensions.clone(), settings.exclude_dirs.clone())
    }

    /// Never descend into `path`. Relative paths are resolved against the working directory.
    pub fn exclude_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        let path = path.into();
        self.exclude_paths.push(absolute(&path).unwrap_or(path));
        self
    }

    /// Collect every matching source file under `root`.
    ///
    /// A missing root yields an empty list; deciding whether that is fatal is up to the caller.
    /// The cancellation flag is checked before each entry.
    ///
    /// # Errors
    ///
    /// - [`BuildError::Cancelled`] if `cancel_rx` holds `true`
    /// - [`BuildError::Io`] for unreadable directories inside the tree
    pub fn collect(&self, root: &Utf8Path, cancel_rx: &watch::Receiver<bool>) -> BuildResult<Vec<SourceFile>> {
        if !root.is_dir() {
            tracing::warn!("Source root does not exist: {}", root);
            return Ok(Vec::new());
        }

        let root = absolute(root)?;
        let excluded_names = self.exclude_dirs.clone();
        let excluded_paths = self.exclude_paths.clone();

        let walker = WalkBuilder::new(&root)
            .standard_filters(false)
            .follow_links(true)
            .filter_entry(move |entry| {
                if entry.depth() == 0 || !entry.file_type().is_some_and(|ft| ft.is_dir()) {
                    return true;
                }
                if excluded_paths.iter().any(|p| p.as_std_path() == entry.path()) {
                    tracing::debug!("Skipping excluded directory {}", entry.path().display());
                    return false;
                }
                if entry.depth() != 1 {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                !excluded_names.iter().any(|dir| dir == name.as_ref())
            })
            .sort_by_file_name(Ord::cmp)
            .build();

        let mut sources = Vec::new();

        for result in walker {
            if *cancel_rx.borrow() {
                tracing::info!("Source collection cancelled");
                return Err(BuildError::Cancelled);
            }

            let entry = match result {
                Ok(entry) => entry,
                Err(err) if is_symlink_loop(&err) => {
                    tracing::warn!("Skipping symbolic link cycle: {}", err);
                    continue;
                }
                Err(err) => {
                    let path = error_path(&err).unwrap_or_else(|| root.clone());
                    let source = err
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
                    return Err(BuildError::io(path, source));
                }
            };

            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let Some(path) = Utf8Path::from_path(entry.path()) else {
                tracing::warn!("Skipping non-UTF-8 path: {}", entry.path().display());
                continue;
            };

            if !self.matches_extension(path) {
                continue;
            }

            let relative_path = path
                .strip_prefix(&root)
                .map(Utf8Path::to_path_buf)
                .unwrap_or_else(|_| Utf8PathBuf::from(path.file_name().unwrap_or_default()));
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);

            sources.push(SourceFile {
                path: path.to_path_buf(),
                relative_path,
                modified,
            });
        }

        sources.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::debug!("Collected {} source file(s) under {}", sources.len(), root);
        Ok(sources)
    }

    /// Fully qualified names of classes declaring `public static void main(`
    pub fn find_main_classes(&self, root: &Utf8Path) -> BuildResult<Vec<String>> {
        let (_never_cancel, cancel_rx) = watch::channel(false);
        let mut classes = Vec::new();

        for source in self.collect(root, &cancel_rx)? {
            let content = match std::fs::read_to_string(&source.path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::debug!("Could not read {}: {}", source.path, e);
                    continue;
                }
            };

            if let Some(class) = self.main_class_of(&content, &source) {
                classes.push(class);
            }
        }

        classes.sort();
        classes.dedup();
        Ok(classes)
    }

    fn main_class_of(&self, content: &str, source: &SourceFile) -> Option<String> {
        if !self.main_pattern.is_match(content) {
            return None;
        }

        let class = self
            .class_pattern
            .captures(content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .or_else(|| source.path.file_stem().map(str::to_string))?;

        match self.package_pattern.captures(content).and_then(|c| c.get(1)) {
            Some(package) => Some(format!("{}.{}", package.as_str(), class)),
            None => Some(class),
        }
    }

    fn matches_extension(&self, path: &Utf8Path) -> bool {
        path.extension()
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

impl Default for SourceCollector {
    fn default() -> Self {
        Self::from_settings(&IdeSettings::default())
    }
}

fn absolute(path: &Utf8Path) -> BuildResult<Utf8PathBuf> {
    let absolute = std::path::absolute(path).map_err(|e| BuildError::io(path, e))?;
    Utf8PathBuf::from_path_buf(absolute).map_err(|p| {
        BuildError::io(
            path,
            std::io::Error::other(format!("path is not valid UTF-8: {}", p.display())),
        )
    })
}

fn is_symlink_loop(err: &ignore::Error) -> bool {
    match err {
        ignore::Error::Loop { .. } => true,
        ignore::Error::WithPath { err, .. }
        | ignore::Error::WithDepth { err, .. }
        | ignore::Error::WithLineNumber { err, .. } => is_symlink_loop(err),
        ignore::Error::Partial(errs) => errs.iter().any(is_symlink_loop),
        _ => false,
    }
}

fn error_path(err: &ignore::Error) -> Option<Utf8PathBuf> {
    match err {
        ignore::Error::WithPath { path, .. } => Utf8PathBuf::from_path_buf(path.clone()).ok(),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => error_path(err),
        _ => None,
    }
}
