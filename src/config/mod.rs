use crate::models::{IdeSettings, ProjectOverrides};
use crate::services::PROJECT_FILE;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Name of the settings file inside the configuration directory
pub const SETTINGS_FILE: &str = "settings.yaml";

/// Prefix of environment variables overriding settings (`MODIDE__COMPILE_TIMEOUT_SECS=60`)
pub const ENV_PREFIX: &str = "MODIDE";

/// Configuration manager for loading and saving IDE settings.
///
/// Settings are layered: defaults, then `settings.yaml` in the configuration directory,
/// then `MODIDE__<FIELD>` environment variables.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,

    /// Replaces the process environment as the source of overrides when set
    env_source: Option<config::Map<String, String>>,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory holding `settings.yaml`; created if missing
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE),
            config_dir,
            env_source: None,
        })
    }

    /// Read environment overrides from `vars` instead of the process environment
    pub fn with_env_source(mut self, vars: config::Map<String, String>) -> Self {
        self.env_source = Some(vars);
        self
    }

    /// Load the IDE settings.
    ///
    /// # Returns
    /// The layered settings; defaults when neither the file nor any override exists
    pub fn load_settings(&self) -> Result<IdeSettings> {
        if !self.settings_path.exists() {
            tracing::warn!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
        }

        let layered = config::Config::builder()
            .add_source(
                config::File::from(self.settings_path.as_std_path())
                    .format(config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .source(self.env_source.clone()),
            )
            .build()
            .with_context(|| format!("Failed to load settings: {}", self.settings_path))?;

        let settings: IdeSettings = layered
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::info!("Loaded settings from {}", self.settings_path);
        Ok(settings)
    }

    /// Save the IDE settings.
    ///
    /// # Arguments
    /// * `settings` - The settings to write to `settings.yaml`
    pub fn save_settings(&self, settings: &IdeSettings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    /// Save per-project overrides to `<project_root>/modide.yaml`.
    pub fn save_project_overrides(&self, project_root: &Utf8Path, overrides: &ProjectOverrides) -> Result<()> {
        let path = project_root.join(PROJECT_FILE);
        let yaml_string = serde_yaml_ng::to_string(overrides)
            .context("Failed to serialize project overrides to YAML")?;

        fs::write(&path, yaml_string)
            .with_context(|| format!("Failed to write project file: {}", path))?;

        tracing::info!("Saved project overrides to {}", path);
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }
}
