// State management module
//
// This module provides the StateManager which wraps BuildState with thread-safe access
// using Arc<RwLock<T>> and emits ordered build events for the UI collaborator.

use crate::error::{BuildError, BuildResult};
use crate::models::{BuildPhase, BuildReport, BuildState, OutputLine};
use camino::Utf8PathBuf;
use chrono::{DateTime, Local};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Events emitted to the UI collaborator while a build runs
///
/// Events are sent on a single broadcast channel, so every subscriber sees them in the
/// exact order the state transitions and output lines happened.
#[derive(Clone, Debug)]
pub enum BuildEvent {
    /// The state machine entered a new phase
    PhaseChanged {
        phase: BuildPhase,
        message: String,
        percent: u8,
        timestamp: DateTime<Local>,
    },

    /// A live line of compiler or archiver output
    Output { line: OutputLine },

    /// The build reached a terminal state; the report is final
    Finished { report: Box<BuildReport> },
}

impl BuildEvent {
    pub fn phase(&self) -> Option<BuildPhase> {
        match self {
            BuildEvent::PhaseChanged { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

/// Thread-safe holder of the single [`BuildState`] with event emission
///
/// This is the central state component of a [`BuildOrchestrator`](crate::orchestrator::BuildOrchestrator):
/// - Provides thread-safe access to [`BuildState`] via `Arc<RwLock<T>>`
/// - Enforces the one-build-at-a-time rule in [`try_begin`](Self::try_begin)
/// - Validates phase transitions and emits [`BuildEvent::PhaseChanged`]
/// - Supports subscribing to events via a tokio broadcast channel
pub struct StateManager {
    state: Arc<RwLock<BuildState>>,

    /// Broadcast channel for build events. Lagging subscribers lose the oldest events
    /// but never see them out of order.
    event_tx: broadcast::Sender<BuildEvent>,
}

impl StateManager {
    /// Create a new StateManager whose event channel buffers `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(16));
        Self {
            state: Arc::new(RwLock::new(BuildState::default())),
            event_tx,
        }
    }

    /// Clone the current state
    pub fn snapshot(&self) -> BuildState {
        self.read(BuildState::clone)
    }

    /// Execute a function with read access to the state
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&BuildState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Current phase of the state machine
    pub fn phase(&self) -> BuildPhase {
        self.read(|s| s.phase)
    }

    /// Subscribe to build events
    ///
    /// Returns a receiver that will get all future events. Multiple subscribers can listen
    /// simultaneously.
    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.event_tx.subscribe()
    }

    /// Claim the state machine for a new build.
    ///
    /// Fails with [`BuildError::BuildAlreadyInProgress`] when a build is active; the running
    /// build is not touched. On success the phase is `CollectingSources`.
    pub fn try_begin(&self, project_root: Utf8PathBuf) -> BuildResult<u64> {
        let build_id = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if state.phase != BuildPhase::Idle {
                return Err(BuildError::BuildAlreadyInProgress);
            }

            state.reset();
            state.build_id += 1;
            state.phase = BuildPhase::CollectingSources;
            state.project_root = Some(project_root);
            state.started_at = Some(Local::now());
            state.current_operation = "Starting build...".to_string();
            state.build_id
        };

        self.emit_phase(BuildPhase::CollectingSources, "Starting build...");
        Ok(build_id)
    }

    /// Move to `phase` and broadcast the change.
    ///
    /// Illegal transitions are refused and logged; the current phase is returned unchanged.
    pub fn transition(&self, phase: BuildPhase, message: impl Into<String>) -> BuildPhase {
        let message = message.into();
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if !state.phase.can_transition_to(phase) {
                tracing::warn!("Refusing build transition {:?} -> {:?}", state.phase, phase);
                return state.phase;
            }
            state.phase = phase;
            state.current_operation = message.clone();
        }

        tracing::info!("Build phase: {} - {}", phase, message);
        self.emit_phase(phase, message);
        phase
    }

    /// Update the operation text without changing phase
    pub fn set_operation(&self, message: impl Into<String>) {
        let message = message.into();
        let phase = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.current_operation = message.clone();
            state.phase
        };
        self.emit_phase(phase, message);
    }

    pub fn set_source_count(&self, count: usize) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.source_count = count;
    }

    /// Forward a live output line to subscribers
    pub fn push_output(&self, line: OutputLine) {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.output_lines += 1;
        }
        // Ignore send errors - it's OK if no one is listening
        let _ = self.event_tx.send(BuildEvent::Output { line });
    }

    /// Emit the terminal report and return the state machine to `Idle`.
    pub fn finish(&self, report: BuildReport) {
        let _ = self.event_tx.send(BuildEvent::Finished {
            report: Box::new(report),
        });

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.reset();
    }

    fn emit_phase(&self, phase: BuildPhase, message: impl Into<String>) {
        let _ = self.event_tx.send(BuildEvent::PhaseChanged {
            phase,
            message: message.into(),
            percent: phase.progress_percent(),
            timestamp: Local::now(),
        });
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new(1024)
    }
}

// Clones share the same state and channel
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            event_tx: self.event_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BuildOutcome, Diagnostic};
    use std::time::Duration;

    fn report() -> BuildReport {
        BuildReport {
            outcome: BuildOutcome::Succeeded,
            error: None,
            error_message: None,
            diagnostics: vec![Diagnostic::info("done")],
            artifact: None,
            artifact_size: 0,
            duration: Duration::from_millis(5),
            timestamp: Local::now(),
        }
    }

    #[test]
    fn test_new_state_manager_is_idle() {
        let manager = StateManager::default();
        assert_eq!(manager.phase(), BuildPhase::Idle);
        assert!(!manager.snapshot().is_active());
    }

    #[test]
    fn test_try_begin_claims_state() {
        let manager = StateManager::default();
        let id = manager.try_begin(Utf8PathBuf::from("/p")).unwrap();

        assert_eq!(id, 1);
        let state = manager.snapshot();
        assert_eq!(state.phase, BuildPhase::CollectingSources);
        assert_eq!(state.project_root, Some(Utf8PathBuf::from("/p")));
        assert!(state.started_at.is_some());
    }

    #[test]
    fn test_second_begin_is_rejected() {
        let manager = StateManager::default();
        manager.try_begin(Utf8PathBuf::from("/p")).unwrap();

        let err = manager.try_begin(Utf8PathBuf::from("/p")).unwrap_err();
        assert!(matches!(err, BuildError::BuildAlreadyInProgress));
        assert_eq!(manager.phase(), BuildPhase::CollectingSources);
    }

    #[test]
    fn test_illegal_transition_is_refused() {
        let manager = StateManager::default();
        manager.try_begin(Utf8PathBuf::from("/p")).unwrap();

        let phase = manager.transition(BuildPhase::Assembling, "skip ahead");
        assert_eq!(phase, BuildPhase::CollectingSources);
    }

    #[test]
    fn test_events_arrive_in_order() {
        let manager = StateManager::default();
        let mut rx = manager.subscribe();

        manager.try_begin(Utf8PathBuf::from("/p")).unwrap();
        manager.transition(BuildPhase::Compiling, "Compiling 2 files");
        manager.push_output(OutputLine::stderr("warning: x"));
        manager.transition(BuildPhase::ParsingDiagnostics, "Parsing");

        let phases: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(phases.len(), 4);
        assert_eq!(phases[0].phase(), Some(BuildPhase::CollectingSources));
        assert_eq!(phases[1].phase(), Some(BuildPhase::Compiling));
        assert!(matches!(phases[2], BuildEvent::Output { .. }));
        assert_eq!(phases[3].phase(), Some(BuildPhase::ParsingDiagnostics));
    }

    #[test]
    fn test_finish_resets_to_idle() {
        let manager = StateManager::default();
        let mut rx = manager.subscribe();
        manager.try_begin(Utf8PathBuf::from("/p")).unwrap();
        manager.transition(BuildPhase::Failed, "boom");

        manager.finish(report());

        assert_eq!(manager.phase(), BuildPhase::Idle);
        let last = std::iter::from_fn(|| rx.try_recv().ok()).last().unwrap();
        assert!(matches!(last, BuildEvent::Finished { .. }));

        // A new build can start and gets a fresh id
        assert_eq!(manager.try_begin(Utf8PathBuf::from("/p")).unwrap(), 2);
    }

    #[test]
    fn test_output_lines_counted() {
        let manager = StateManager::default();
        manager.try_begin(Utf8PathBuf::from("/p")).unwrap();
        manager.push_output(OutputLine::stdout("a"));
        manager.push_output(OutputLine::stdout("b"));
        assert_eq!(manager.read(|s| s.output_lines), 2);
    }

    #[test]
    fn test_clone_shares_state() {
        let manager1 = StateManager::default();
        let manager2 = manager1.clone();
        manager1.try_begin(Utf8PathBuf::from("/p")).unwrap();
        assert_eq!(manager2.phase(), BuildPhase::CollectingSources);
    }
}
