use crate::error::{BuildError, BuildResult};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of mod (or plugin) a project produces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleType {
    #[default]
    Basic,
    Forge,
    Fabric,
    Bukkit,
}

impl ModuleType {
    /// Metadata resource the project template materializes for this module type,
    /// relative to the resource root.
    pub fn descriptor_resource(self) -> &'static str {
        match self {
            ModuleType::Basic => "mcmod.info",
            ModuleType::Forge => "META-INF/mods.toml",
            ModuleType::Fabric => "fabric.mod.json",
            ModuleType::Bukkit => "plugin.yml",
        }
    }

    /// Whether the loader refuses to load a JAR without the descriptor resource
    pub fn requires_descriptor(self) -> bool {
        !matches!(self, ModuleType::Basic)
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleType::Basic => write!(f, "Basic"),
            ModuleType::Forge => write!(f, "Forge"),
            ModuleType::Fabric => write!(f, "Fabric"),
            ModuleType::Bukkit => write!(f, "Bukkit"),
        }
    }
}

/// An opened mod project.
///
/// Created at project-open time (see [`open_project`](crate::services::open_project)) and
/// immutable for the duration of a build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectDescriptor {
    pub root: Utf8PathBuf,
    pub package_name: String,
    pub module_type: ModuleType,
    pub source_root: Utf8PathBuf,
    /// Build directory; compiled classes land in `<output_root>/classes`
    pub output_root: Utf8PathBuf,
    pub resource_root: Utf8PathBuf,
    pub main_class: Option<String>,
    pub classpath: Vec<Utf8PathBuf>,
}

impl ProjectDescriptor {
    /// Create a descriptor using the standard template layout under `root`.
    pub fn new(root: impl Into<Utf8PathBuf>, package_name: impl Into<String>, module_type: ModuleType) -> Self {
        let root = root.into();
        Self {
            source_root: root.join("src").join("main").join("java"),
            output_root: root.join("build"),
            resource_root: root.join("src").join("main").join("resources"),
            root,
            package_name: package_name.into(),
            module_type,
            main_class: None,
            classpath: Vec::new(),
        }
    }

    pub fn with_source_root(mut self, source_root: impl Into<Utf8PathBuf>) -> Self {
        self.source_root = source_root.into();
        self
    }

    pub fn with_main_class(mut self, main_class: impl Into<String>) -> Self {
        self.main_class = Some(main_class.into());
        self
    }

    pub fn with_classpath(mut self, classpath: Vec<Utf8PathBuf>) -> Self {
        self.classpath = classpath;
        self
    }

    /// Directory compiled `.class` files are written to
    pub fn classes_dir(&self) -> Utf8PathBuf {
        self.output_root.join("classes")
    }

    /// Directory name of the project root, used for default archive names
    pub fn name(&self) -> &str {
        self.root.file_name().unwrap_or("project")
    }

    /// Apply the fields present in a project's `modide.yaml`
    pub fn apply_overrides(&mut self, overrides: ProjectOverrides) {
        let root = self.root.clone();
        let resolve = |path: Utf8PathBuf| if path.is_absolute() { path } else { root.join(path) };

        if let Some(package_name) = overrides.package_name {
            self.package_name = package_name;
        }
        if let Some(module_type) = overrides.module_type {
            self.module_type = module_type;
        }
        if let Some(source_root) = overrides.source_root {
            self.source_root = resolve(source_root);
        }
        if let Some(output_root) = overrides.output_root {
            self.output_root = resolve(output_root);
        }
        if let Some(resource_root) = overrides.resource_root {
            self.resource_root = resolve(resource_root);
        }
        if overrides.main_class.is_some() {
            self.main_class = overrides.main_class;
        }
        if !overrides.classpath.is_empty() {
            self.classpath = overrides.classpath.into_iter().map(resolve).collect();
        }
    }
}

/// Optional per-project overrides read from `<project>/modide.yaml`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectOverrides {
    #[serde(default)]
    pub package_name: Option<String>,
    #[serde(default)]
    pub module_type: Option<ModuleType>,
    #[serde(default)]
    pub source_root: Option<Utf8PathBuf>,
    #[serde(default)]
    pub output_root: Option<Utf8PathBuf>,
    #[serde(default)]
    pub resource_root: Option<Utf8PathBuf>,
    #[serde(default)]
    pub main_class: Option<String>,
    #[serde(default)]
    pub classpath: Vec<Utf8PathBuf>,
}

/// Per-build options. Supplied with each `submit` and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildConfiguration {
    /// Directory the final archive is written to
    pub output_dir: Utf8PathBuf,
    pub archive_name: String,
    pub clean: bool,
    pub extra_classpath: Vec<Utf8PathBuf>,
    /// Overrides the project's main class when set
    pub main_class: Option<String>,
}

impl BuildConfiguration {
    /// Defaults used by "Quick Build": `<root>/dist/<project>.jar`
    pub fn for_project(project: &ProjectDescriptor) -> Self {
        Self {
            output_dir: project.root.join("dist"),
            archive_name: format!("{}.jar", project.name()),
            clean: false,
            extra_classpath: Vec::new(),
            main_class: None,
        }
    }

    /// Archive name with a guaranteed `.jar` extension
    pub fn normalized_archive_name(&self) -> String {
        let name = self.archive_name.trim();
        if name.to_ascii_lowercase().ends_with(".jar") {
            name.to_string()
        } else {
            format!("{}.jar", name)
        }
    }

    pub fn archive_path(&self) -> Utf8PathBuf {
        self.output_dir.join(self.normalized_archive_name())
    }

    /// The main class to record in the manifest, if any
    pub fn effective_main_class<'a>(&'a self, project: &'a ProjectDescriptor) -> Option<&'a str> {
        self.main_class
            .as_deref()
            .or(project.main_class.as_deref())
            .map(str::trim)
            .filter(|class| !class.is_empty())
    }

    pub fn validate(&self) -> BuildResult<()> {
        if self.output_dir.as_str().trim().is_empty() {
            return Err(BuildError::InvalidConfiguration(
                "output directory is empty".to_string(),
            ));
        }

        let name = self.archive_name.trim();
        if name.is_empty() || name == ".jar" {
            return Err(BuildError::InvalidConfiguration(
                "archive name is empty".to_string(),
            ));
        }

        if Utf8Path::new(name).components().count() != 1 {
            return Err(BuildError::InvalidConfiguration(format!(
                "archive name must be a plain file name: {}",
                name
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> ProjectDescriptor {
        ProjectDescriptor::new("/work/CoolMod", "com.example.coolmod", ModuleType::Fabric)
    }

    #[test]
    fn test_default_layout() {
        let project = project();
        assert_eq!(project.source_root, Utf8PathBuf::from("/work/CoolMod/src/main/java"));
        assert_eq!(project.classes_dir(), Utf8PathBuf::from("/work/CoolMod/build/classes"));
        assert_eq!(project.name(), "CoolMod");
    }

    #[test]
    fn test_quick_build_configuration() {
        let config = BuildConfiguration::for_project(&project());
        assert_eq!(config.archive_path(), Utf8PathBuf::from("/work/CoolMod/dist/CoolMod.jar"));
        assert!(!config.clean);
    }

    #[test]
    fn test_archive_name_gets_jar_extension() {
        let mut config = BuildConfiguration::for_project(&project());
        config.archive_name = "release".to_string();
        assert_eq!(config.normalized_archive_name(), "release.jar");

        config.archive_name = "Release.JAR".to_string();
        assert_eq!(config.normalized_archive_name(), "Release.JAR");
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        let mut config = BuildConfiguration::for_project(&project());
        config.archive_name = "   ".to_string();
        assert!(matches!(config.validate(), Err(BuildError::InvalidConfiguration(_))));

        config.archive_name = "nested/out.jar".to_string();
        assert!(matches!(config.validate(), Err(BuildError::InvalidConfiguration(_))));

        config.archive_name = "ok.jar".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_main_class_override_wins() {
        let project = project().with_main_class("com.example.coolmod.Main");
        let mut config = BuildConfiguration::for_project(&project);
        assert_eq!(config.effective_main_class(&project), Some("com.example.coolmod.Main"));

        config.main_class = Some("com.example.coolmod.Other".to_string());
        assert_eq!(config.effective_main_class(&project), Some("com.example.coolmod.Other"));

        config.main_class = Some("  ".to_string());
        assert_eq!(config.effective_main_class(&project), None);
    }

    #[test]
    fn test_apply_overrides_resolves_relative_paths() {
        let mut project = project();
        project.apply_overrides(ProjectOverrides {
            module_type: Some(ModuleType::Bukkit),
            source_root: Some(Utf8PathBuf::from("src")),
            classpath: vec![Utf8PathBuf::from("libs/spigot.jar")],
            ..ProjectOverrides::default()
        });

        assert_eq!(project.module_type, ModuleType::Bukkit);
        assert_eq!(project.source_root, Utf8PathBuf::from("/work/CoolMod/src"));
        assert_eq!(project.classpath, vec![Utf8PathBuf::from("/work/CoolMod/libs/spigot.jar")]);
    }

    #[test]
    fn test_descriptor_resources() {
        assert_eq!(ModuleType::Fabric.descriptor_resource(), "fabric.mod.json");
        assert!(ModuleType::Bukkit.requires_descriptor());
        assert!(!ModuleType::Basic.requires_descriptor());
    }
}
