// modide - Build pipeline of a Minecraft mod IDE
//
// This is the library crate containing the build pipeline and its data structures.
// The binary crate (main.rs) provides the command-line entry point.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use error::{BuildError, BuildErrorKind, BuildResult};
pub use metrics::BuildMetrics;
pub use models::{
    BuildConfiguration, BuildOutcome, BuildPhase, BuildReport, Diagnostic, IdeSettings,
    ModuleType, ProjectDescriptor, Severity,
};
pub use orchestrator::{BuildHandle, BuildOrchestrator};
pub use state::{BuildEvent, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
