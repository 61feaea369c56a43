use camino::Utf8PathBuf;
use chrono::{DateTime, Local};
use std::fmt;

/// Phases of the build state machine.
///
/// ```text
/// Idle → CollectingSources → Compiling → ParsingDiagnostics → Assembling → Completed
///                 └──────────────┴──────────────┴──────────────┴──→ Failed | Cancelled
/// ```
///
/// `Completed`, `Failed` and `Cancelled` are terminal: the orchestrator emits them and then
/// resets the state back to `Idle`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BuildPhase {
    #[default]
    Idle,
    CollectingSources,
    Compiling,
    ParsingDiagnostics,
    Assembling,
    Completed,
    Failed,
    Cancelled,
}

impl BuildPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BuildPhase::Completed | BuildPhase::Failed | BuildPhase::Cancelled
        )
    }

    /// A build occupies the state machine from `CollectingSources` until it reaches a terminal phase.
    pub fn is_active(self) -> bool {
        !self.is_terminal() && self != BuildPhase::Idle
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: BuildPhase) -> bool {
        use BuildPhase::*;

        if next == Failed || next == Cancelled {
            return self.is_active();
        }

        matches!(
            (self, next),
            (Idle, CollectingSources)
                | (CollectingSources, Compiling)
                | (Compiling, ParsingDiagnostics)
                | (ParsingDiagnostics, Assembling)
                | (Assembling, Completed)
                | (Completed | Failed | Cancelled, Idle)
        )
    }

    /// Human-readable phase label for progress displays
    pub fn label(self) -> &'static str {
        match self {
            BuildPhase::Idle => "Idle",
            BuildPhase::CollectingSources => "Scanning for Java files",
            BuildPhase::Compiling => "Compiling Java source files",
            BuildPhase::ParsingDiagnostics => "Analyzing compiler output",
            BuildPhase::Assembling => "Creating JAR file",
            BuildPhase::Completed => "Build complete",
            BuildPhase::Failed => "Build failed",
            BuildPhase::Cancelled => "Build cancelled",
        }
    }

    /// Rough completion percentage for the progress bar
    pub fn progress_percent(self) -> u8 {
        match self {
            BuildPhase::Idle => 0,
            BuildPhase::CollectingSources => 10,
            BuildPhase::Compiling => 30,
            BuildPhase::ParsingDiagnostics => 70,
            BuildPhase::Assembling => 80,
            BuildPhase::Completed | BuildPhase::Failed | BuildPhase::Cancelled => 100,
        }
    }
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The single build state owned by one [`BuildOrchestrator`](crate::orchestrator::BuildOrchestrator).
///
/// Never mutate this directly; go through [`StateManager`](crate::state::StateManager) so that
/// phase changes are broadcast to the UI in order.
#[derive(Clone, Debug, Default)]
pub struct BuildState {
    pub phase: BuildPhase,

    /// Monotonic id of the current (or last) build
    pub build_id: u64,

    pub project_root: Option<Utf8PathBuf>,
    pub started_at: Option<DateTime<Local>>,

    /// Message shown next to the phase label
    pub current_operation: String,

    // Progress counters for the running build
    pub source_count: usize,
    pub output_lines: usize,
}

impl BuildState {
    pub fn is_active(&self) -> bool {
        self.phase.is_active()
    }

    /// Return to `Idle`, keeping the build id so the next build gets a fresh one.
    pub fn reset(&mut self) {
        *self = BuildState {
            build_id: self.build_id,
            ..BuildState::default()
        };
    }
}
