use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// IDE settings from `settings.yaml`.
///
/// Read once per build at submission time; edits made while a build runs only affect the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdeSettings {
    /// JDK home directory; `None` falls back to `JAVA_HOME` and `PATH`
    #[serde(default)]
    pub tool_home: Option<Utf8PathBuf>,

    /// Classpath entries added to every project
    #[serde(default)]
    pub default_classpath: Vec<Utf8PathBuf>,

    /// Output directory used instead of `<project>/dist` when set
    #[serde(default)]
    pub default_output_dir: Option<Utf8PathBuf>,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_compile_timeout")]
    pub compile_timeout_secs: u64,

    #[serde(default = "default_archive_timeout")]
    pub archive_timeout_secs: u64,

    /// How long a cancelled child process gets to exit before it is killed
    #[serde(default = "default_cancel_grace")]
    pub cancel_grace_ms: u64,

    /// Serialized command-line length above which sources go into an `@argfile`
    #[serde(default = "default_argfile_threshold")]
    pub argfile_threshold: usize,

    #[serde(default = "default_source_extensions")]
    pub source_extensions: Vec<String>,

    /// Directory names never descended into when collecting sources
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,

    #[serde(default = "default_encoding")]
    pub source_encoding: String,

    /// Capacity of the progress event channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    #[serde(default)]
    pub debug_mode: bool,
}

impl Default for IdeSettings {
    fn default() -> Self {
        Self {
            tool_home: None,
            default_classpath: Vec::new(),
            default_output_dir: None,
            probe_timeout_secs: default_probe_timeout(),
            compile_timeout_secs: default_compile_timeout(),
            archive_timeout_secs: default_archive_timeout(),
            cancel_grace_ms: default_cancel_grace(),
            argfile_threshold: default_argfile_threshold(),
            source_extensions: default_source_extensions(),
            exclude_dirs: default_exclude_dirs(),
            source_encoding: default_encoding(),
            event_capacity: default_event_capacity(),
            debug_mode: false,
        }
    }
}

impl IdeSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }

    pub fn archive_timeout(&self) -> Duration {
        Duration::from_secs(self.archive_timeout_secs)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_compile_timeout() -> u64 {
    300
}

fn default_archive_timeout() -> u64 {
    120
}

fn default_cancel_grace() -> u64 {
    3000
}

fn default_argfile_threshold() -> usize {
    8000
}

fn default_source_extensions() -> Vec<String> {
    vec!["java".to_string()]
}

fn default_exclude_dirs() -> Vec<String> {
    ["build", "target", "dist", "out", ".git", ".idea", ".gradle"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_encoding() -> String {
    "UTF-8".to_string()
}

fn default_event_capacity() -> usize {
    1024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = IdeSettings::default();
        assert_eq!(settings.compile_timeout(), Duration::from_secs(300));
        assert_eq!(settings.archive_timeout(), Duration::from_secs(120));
        assert_eq!(settings.cancel_grace(), Duration::from_secs(3));
        assert_eq!(settings.source_extensions, vec!["java".to_string()]);
        assert!(settings.exclude_dirs.contains(&"build".to_string()));
        assert!(settings.tool_home.is_none());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "tool_home: /opt/jdk-17\ncompile_timeout_secs: 60\n";
        let settings: IdeSettings = serde_yaml_ng::from_str(yaml).unwrap();

        assert_eq!(settings.tool_home, Some(Utf8PathBuf::from("/opt/jdk-17")));
        assert_eq!(settings.compile_timeout_secs, 60);
        assert_eq!(settings.argfile_threshold, 8000);
        assert_eq!(settings.source_encoding, "UTF-8");
    }
}
