//! Data models for the modide build pipeline.
//!
//! This module contains all the core data structures used throughout the pipeline:
//! - [`ProjectDescriptor`]: An opened mod project (roots, module type, classpath)
//! - [`BuildConfiguration`]: Per-build options supplied by the UI collaborator
//! - [`SourceFile`], [`CompileResult`], [`Diagnostic`]: Intermediate pipeline values
//! - [`BuildReport`]: The terminal, immutable result of one build
//! - [`BuildState`] / [`BuildPhase`]: The single-build-at-a-time state machine
//! - [`IdeSettings`]: Settings loaded from `settings.yaml`
//!
//! # Architecture Note
//!
//! The models are designed to be:
//! - **Serializable**: Settings and project overrides derive `Serialize`/`Deserialize` for YAML
//! - **Cloneable**: BuildState is wrapped in `Arc<RwLock<>>` by [`StateManager`](crate::state::StateManager)
//! - **Immutable once emitted**: A [`BuildReport`] is never mutated after the orchestrator sends it

pub mod build;
pub mod build_state;
pub mod project;
pub mod settings;

pub use build::{
    BuildOutcome, BuildReport, CompileResult, CompileStatus, Diagnostic, OutputLine, Severity,
    SourceFile, StreamSource, format_file_size,
};
pub use build_state::{BuildPhase, BuildState};
pub use project::{BuildConfiguration, ModuleType, ProjectDescriptor, ProjectOverrides};
pub use settings::IdeSettings;
