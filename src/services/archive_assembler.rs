//! Manifest generation and JAR packaging.
//!
//! The archive is first written into a staging directory created inside the output
//! directory and only renamed to its final name after `jar` succeeded, so a failed or
//! cancelled build never leaves a partial archive behind.

use super::diagnostic_parser::DiagnosticParser;
use super::process::{self, ProcessExit, ProcessLimits};
use super::tool_locator::ARCHIVER;
use crate::error::{BuildError, BuildResult};
use crate::models::{Diagnostic, IdeSettings, OutputLine, ProjectDescriptor};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use ignore::WalkBuilder;
use indexmap::IndexMap;
use tokio::process::Command;
use tokio::sync::watch;

/// Manifest file name inside the staging directory
const MANIFEST_FILE: &str = "MANIFEST.MF";

/// What to package and where
#[derive(Debug, Clone)]
pub struct ArchiveRequest<'a> {
    pub project: &'a ProjectDescriptor,
    pub classes_dir: &'a Utf8Path,
    pub main_class: Option<&'a str>,
    /// Final location of the archive
    pub archive_path: Utf8PathBuf,
}

/// A successfully written archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: Utf8PathBuf,
    pub size: u64,
}

/// Packages compiled classes and resources with `jar`
pub struct ArchiveAssembler {
    archiver: Utf8PathBuf,
    limits: ProcessLimits,
    parser: DiagnosticParser,
    extra_attributes: IndexMap<String, String>,
}

impl ArchiveAssembler {
    pub fn new(archiver: impl Into<Utf8PathBuf>, settings: &IdeSettings) -> Self {
        Self {
            archiver: archiver.into(),
            limits: ProcessLimits {
                timeout: settings.archive_timeout(),
                grace: settings.cancel_grace(),
            },
            parser: DiagnosticParser::jar(),
            extra_attributes: IndexMap::new(),
        }
    }

    /// Add a manifest attribute written after the standard ones
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_attributes.insert(key.into(), value.into());
        self
    }

    /// Ensure the class output directory exists; a clean build empties it first.
    pub fn prepare_class_dir(dir: &Utf8Path, clean: bool) -> BuildResult<()> {
        if clean && dir.exists() {
            tracing::info!("Clean build: removing {}", dir);
            std::fs::remove_dir_all(dir).map_err(|e| BuildError::io(dir, e))?;
        }
        std::fs::create_dir_all(dir).map_err(|e| BuildError::io(dir, e))
    }

    /// Every `.class` file under `classes_dir`, relative to it and sorted
    pub fn discover_classes(classes_dir: &Utf8Path) -> BuildResult<Vec<Utf8PathBuf>> {
        if !classes_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut classes = Vec::new();
        let walker = WalkBuilder::new(classes_dir)
            .standard_filters(false)
            .sort_by_file_name(Ord::cmp)
            .build();

        for entry in walker {
            let entry = entry.map_err(|e| {
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("class directory walk failed"));
                BuildError::io(classes_dir, source)
            })?;

            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let Some(path) = Utf8Path::from_path(entry.path()) else {
                continue;
            };
            if path.extension() != Some("class") {
                continue;
            }
            if let Ok(relative) = path.strip_prefix(classes_dir) {
                classes.push(relative.to_path_buf());
            }
        }

        classes.sort();
        Ok(classes)
    }

    /// Fail unless `main_class` was produced by the compiler
    pub fn check_main_class(main_class: &str, classes: &[Utf8PathBuf]) -> BuildResult<()> {
        let mut expected: Utf8PathBuf = main_class.split('.').collect();
        expected.set_extension("class");

        if classes.iter().any(|c| c == &expected) {
            Ok(())
        } else {
            Err(BuildError::ManifestMainClassMissing(main_class.to_string()))
        }
    }

    /// Warning for a Forge/Fabric/Bukkit project whose loader descriptor is missing
    pub fn check_descriptor(project: &ProjectDescriptor) -> Option<Diagnostic> {
        if !project.module_type.requires_descriptor() {
            return None;
        }

        let descriptor = project.resource_root.join(project.module_type.descriptor_resource());
        if descriptor.is_file() {
            return None;
        }

        let mut diagnostic = Diagnostic::warning(format!(
            "{} mod descriptor not found; the loader will not recognize this JAR",
            project.module_type
        ));
        diagnostic.file = Some(descriptor);
        Some(diagnostic)
    }

    /// Manifest attributes in the order they are written
    pub fn build_manifest(&self, project: &ProjectDescriptor, main_class: Option<&str>) -> IndexMap<String, String> {
        let mut attributes = IndexMap::new();
        attributes.insert("Manifest-Version".to_string(), "1.0".to_string());
        if let Some(main_class) = main_class {
            attributes.insert("Main-Class".to_string(), main_class.to_string());
        }
        attributes.insert(
            "Created-By".to_string(),
            format!("{} {}", crate::APP_NAME, crate::VERSION),
        );
        attributes.insert("Build-Date".to_string(), Local::now().to_rfc3339());
        attributes.insert("Specification-Title".to_string(), "Minecraft Mod".to_string());
        attributes.insert("Specification-Version".to_string(), "1.0".to_string());

        let title = if project.package_name.trim().is_empty() {
            project.name().to_string()
        } else {
            project.package_name.clone()
        };
        attributes.insert("Implementation-Title".to_string(), title);
        attributes.insert("Implementation-Version".to_string(), "1.0.0".to_string());
        attributes.insert("Modide-Module-Type".to_string(), project.module_type.to_string());

        for (key, value) in &self.extra_attributes {
            attributes.insert(key.clone(), value.clone());
        }
        attributes
    }

    /// Serialize attributes as a manifest file; the trailing newline is required by `jar`
    pub fn render_manifest(attributes: &IndexMap<String, String>) -> String {
        let mut manifest = String::new();
        for (key, value) in attributes {
            let value = value.replace(['\r', '\n'], " ");
            manifest.push_str(&format!("{}: {}\n", key, value));
        }
        manifest
    }

    /// Write the archive described by `request`.
    ///
    /// Warnings and archiver diagnostics are appended to `diagnostics` whether or not the
    /// archive could be written.
    ///
    /// # Errors
    ///
    /// - [`BuildError::ManifestMainClassMissing`] if the main class was not compiled
    /// - [`BuildError::ArchiverInvocationError`] if `jar` cannot be started
    /// - [`BuildError::ArchiverFailed`] if `jar` exits with a non-zero code
    /// - [`BuildError::Timeout`] / [`BuildError::Cancelled`] when the run is cut short
    /// - [`BuildError::Io`] for staging and rename failures
    pub async fn assemble<F>(
        &self,
        request: &ArchiveRequest<'_>,
        diagnostics: &mut Vec<Diagnostic>,
        on_line: F,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> BuildResult<Artifact>
    where
        F: FnMut(&OutputLine),
    {
        let classes = Self::discover_classes(request.classes_dir)?;
        if classes.is_empty() {
            diagnostics.push(Diagnostic::warning(format!(
                "No class files found in {}",
                request.classes_dir
            )));
        }

        if let Some(main_class) = request.main_class {
            Self::check_main_class(main_class, &classes)?;
        }

        if let Some(warning) = Self::check_descriptor(request.project) {
            tracing::warn!("{}", warning);
            diagnostics.push(warning);
        }

        let output_dir = request
            .archive_path
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|| Utf8PathBuf::from("."));
        let file_name = request.archive_path.file_name().ok_or_else(|| {
            BuildError::InvalidConfiguration(format!("archive path has no file name: {}", request.archive_path))
        })?;

        std::fs::create_dir_all(&output_dir).map_err(|e| BuildError::io(&output_dir, e))?;

        // Removed on drop, taking any partial archive with it
        let staging = tempfile::Builder::new()
            .prefix(".modide-staging-")
            .tempdir_in(&output_dir)
            .map_err(|e| BuildError::io(&output_dir, e))?;
        let staging_dir = Utf8Path::from_path(staging.path())
            .ok_or_else(|| {
                BuildError::io(
                    &output_dir,
                    std::io::Error::other("staging directory path is not valid UTF-8"),
                )
            })?
            .to_path_buf();

        let manifest_path = staging_dir.join(MANIFEST_FILE);
        let manifest = Self::render_manifest(&self.build_manifest(request.project, request.main_class));
        std::fs::write(&manifest_path, manifest).map_err(|e| BuildError::io(&manifest_path, e))?;

        let staged_archive = staging_dir.join(file_name);

        let mut command = Command::new(self.archiver.as_std_path());
        command
            .arg("cfm")
            .arg(staged_archive.as_std_path())
            .arg(manifest_path.as_std_path())
            .arg("-C")
            .arg(request.classes_dir.as_std_path())
            .arg(".");
        if request.project.resource_root.is_dir() {
            command
                .arg("-C")
                .arg(request.project.resource_root.as_std_path())
                .arg(".");
        }

        tracing::info!("Creating {}", request.archive_path);
        tracing::debug!("Archiver command: {}", process::describe_command(&command));

        let output = process::run_streaming(command, on_line, cancel_rx, self.limits)
            .await
            .map_err(|source| BuildError::ArchiverInvocationError {
                path: self.archiver.clone(),
                source,
            })?;

        diagnostics.extend(self.parser.parse_output(&output.lines).diagnostics);

        match output.exit {
            ProcessExit::TimedOut => {
                return Err(BuildError::Timeout {
                    tool: ARCHIVER.to_string(),
                    after: self.limits.timeout,
                });
            }
            ProcessExit::Cancelled => return Err(BuildError::Cancelled),
            ProcessExit::Exited(Some(0)) => {}
            ProcessExit::Exited(code) => return Err(BuildError::ArchiverFailed(code.unwrap_or(-1))),
        }

        if !staged_archive.is_file() {
            return Err(BuildError::io(
                &staged_archive,
                std::io::Error::new(std::io::ErrorKind::NotFound, "archiver produced no archive"),
            ));
        }

        // rename replaces an existing archive in one step
        std::fs::rename(&staged_archive, &request.archive_path)
            .map_err(|e| BuildError::io(&request.archive_path, e))?;

        let size = std::fs::metadata(&request.archive_path)
            .map_err(|e| BuildError::io(&request.archive_path, e))?
            .len();

        tracing::info!(
            "Created {} ({})",
            request.archive_path,
            crate::models::format_file_size(size)
        );

        Ok(Artifact {
            path: request.archive_path.clone(),
            size,
        })
    }
}
