//! Project opening: turns a project directory into a [`ProjectDescriptor`].
//!
//! This module provides functions to detect the module type (Basic, Forge, Fabric, Bukkit)
//! and package name of a mod project based on:
//! - Loader descriptor resources materialized by the project template
//!   (`fabric.mod.json` → Fabric, `plugin.yml` → Bukkit, `META-INF/mods.toml` → Forge)
//! - Source imports (`import net.minecraftforge...` → Forge)
//! - The package directory layout under the source root
//!
//! Anything detected can be overridden by a `modide.yaml` file in the project root.
//!
//! # Examples
//!
//! ```ignore
//! use modide::services::open_project;
//! use camino::Utf8Path;
//!
//! let project = open_project(Utf8Path::new("/home/me/mods/CoolMod"))?;
//! println!("{} ({})", project.package_name, project.module_type);
//! ```

use super::source_collector::SourceCollector;
use crate::models::{ModuleType, ProjectDescriptor, ProjectOverrides};
use anyhow::{bail, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};

/// Name of the per-project override file
pub const PROJECT_FILE: &str = "modide.yaml";

/// Number of sources inspected for Forge imports
const FORGE_SCAN_LIMIT: usize = 64;

/// Opens the project at `root`.
///
/// # Arguments
///
/// * `root` - Project directory
///
/// # Returns
///
/// A descriptor using the template layout (`src/main/java`, `src/main/resources`, `build/`),
/// falling back to the project root as source root when `src/main/java` does not exist,
/// with detected module type and package name and any `modide.yaml` overrides applied.
///
/// # Errors
///
/// Returns an error if `root` is not a directory or `modide.yaml` cannot be parsed
pub fn open_project(root: &Utf8Path) -> Result<ProjectDescriptor> {
    if !root.is_dir() {
        bail!("Project directory does not exist: {}", root);
    }

    let root = absolute(root)?;
    let overrides = read_overrides(&root)?.unwrap_or_default();

    let mut project = ProjectDescriptor::new(&root, String::new(), ModuleType::Basic);
    if !project.source_root.is_dir() {
        tracing::debug!("No src/main/java in {}, using the project root as source root", root);
        project.source_root = root.clone();
    }

    let module_type_fixed = overrides.module_type.is_some();
    let package_fixed = overrides.package_name.is_some();
    project.apply_overrides(overrides);

    if !module_type_fixed {
        project.module_type = detect_module_type(&project);
    }

    if !package_fixed {
        project.package_name = infer_package_name(&project.source_root)
            .unwrap_or_else(|| project.name().to_lowercase());
    }

    tracing::info!(
        "Opened {} project {} (package {})",
        project.module_type,
        project.root,
        project.package_name
    );
    Ok(project)
}

/// Reads `<root>/modide.yaml`.
///
/// # Returns
///
/// `None` when the file does not exist
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed
pub fn read_overrides(root: &Utf8Path) -> Result<Option<ProjectOverrides>> {
    let path = root.join(PROJECT_FILE);
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read project file: {}", path))?;

    if content.trim().is_empty() {
        return Ok(Some(ProjectOverrides::default()));
    }

    let overrides = serde_yaml_ng::from_str(&content)
        .with_context(|| format!("Failed to parse project file: {}", path))?;

    tracing::debug!("Loaded project overrides from {}", path);
    Ok(Some(overrides))
}

/// Detects the module type from loader descriptors and source imports.
///
/// Descriptors are looked up in the resource root first and the project root second.
/// Without any descriptor, a source importing `net.minecraftforge` marks a Forge project.
pub fn detect_module_type(project: &ProjectDescriptor) -> ModuleType {
    let candidates = [ModuleType::Fabric, ModuleType::Bukkit, ModuleType::Forge];

    for module_type in candidates {
        let resource = module_type.descriptor_resource();
        if project.resource_root.join(resource).is_file() || project.root.join(resource).is_file() {
            tracing::info!("Detected {} project from {}", module_type, resource);
            return module_type;
        }
    }

    if imports_forge(&project.source_root) {
        tracing::info!("Detected Forge project from source imports");
        return ModuleType::Forge;
    }

    tracing::debug!("Could not detect a mod loader, assuming a basic project");
    ModuleType::Basic
}

/// Infers the base package from the directory layout under `source_root`.
///
/// Follows the chain of single subdirectories (`com/example/coolmod`) until a directory
/// holds files or branches out. Returns `None` for sources in the default package.
pub fn infer_package_name(source_root: &Utf8Path) -> Option<String> {
    let mut segments = Vec::new();
    let mut current = source_root.to_path_buf();

    loop {
        let entries: Vec<_> = current.read_dir_utf8().ok()?.flatten().collect();

        let has_files = entries.iter().any(|e| e.file_type().is_ok_and(|ft| ft.is_file()));
        let dirs: Vec<Utf8PathBuf> = entries
            .iter()
            .filter(|e| e.file_type().is_ok_and(|ft| ft.is_dir()))
            .filter(|e| !e.file_name().starts_with('.'))
            .map(|e| e.path().to_path_buf())
            .collect();

        if has_files || dirs.len() != 1 {
            break;
        }

        let dir = dirs.into_iter().next()?;
        segments.push(dir.file_name()?.to_string());
        current = dir;
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("."))
    }
}

fn imports_forge(source_root: &Utf8Path) -> bool {
    let (_never_cancel, cancel_rx) = tokio::sync::watch::channel(false);
    let sources = match SourceCollector::default().collect(source_root, &cancel_rx) {
        Ok(sources) => sources,
        Err(e) => {
            tracing::debug!("Could not scan sources for Forge imports: {}", e);
            return false;
        }
    };

    sources.iter().take(FORGE_SCAN_LIMIT).any(|source| {
        std::fs::read_to_string(&source.path)
            .map(|content| content.contains("import net.minecraftforge"))
            .unwrap_or(false)
    })
}

fn absolute(path: &Utf8Path) -> Result<Utf8PathBuf> {
    let absolute = std::path::absolute(path)
        .with_context(|| format!("Failed to resolve project path: {}", path))?;
    Utf8PathBuf::from_path_buf(absolute)
        .map_err(|p| anyhow::anyhow!("Project path is not valid UTF-8: {}", p.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn utf8(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_infer_package_name() {
        let dir = TempDir::new().unwrap();
        let root = utf8(&dir);
        fs::create_dir_all(root.join("com/example/coolmod")).unwrap();
        fs::write(root.join("com/example/coolmod/CoolMod.java"), "").unwrap();

        assert_eq!(infer_package_name(&root), Some("com.example.coolmod".to_string()));
    }

    #[test]
    fn test_infer_package_name_default_package() {
        let dir = TempDir::new().unwrap();
        let root = utf8(&dir);
        fs::write(root.join("Main.java"), "").unwrap();

        assert_eq!(infer_package_name(&root), None);
    }

    #[test]
    fn test_infer_package_name_stops_at_branch() {
        let dir = TempDir::new().unwrap();
        let root = utf8(&dir);
        fs::create_dir_all(root.join("com/example/a")).unwrap();
        fs::create_dir_all(root.join("com/example/b")).unwrap();

        assert_eq!(infer_package_name(&root), Some("com.example".to_string()));
    }

    #[test]
    fn test_missing_project_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(open_project(&utf8(&dir).join("nope")).is_err());
    }
}
