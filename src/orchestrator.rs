//! Build orchestration: sequences the pipeline stages and owns the build state.
//!
//! ```text
//! Idle → CollectingSources → Compiling → ParsingDiagnostics → Assembling → Completed
//!              └──────────────┴───────────────┴────────────────┴──→ Failed | Cancelled
//! ```
//!
//! One orchestrator serves one project at a time. A build runs on its own tokio task; the
//! caller gets a [`BuildHandle`] and follows progress through [`BuildOrchestrator::subscribe`].
//! Whatever happens, the task emits exactly one [`BuildEvent::Finished`] and returns the state
//! machine to `Idle`.

use crate::error::{BuildError, BuildResult};
use crate::metrics::BuildMetrics;
use crate::models::{
    BuildConfiguration, BuildOutcome, BuildPhase, BuildReport, BuildState, CompileStatus, Diagnostic, IdeSettings,
    OutputLine, ProjectDescriptor,
};
use crate::services::{
    ArchiveAssembler, ArchiveRequest, Artifact, CompileInvoker, DiagnosticParser, Environment, SourceCollector,
    SystemEnvironment, ToolLocator,
};
use crate::state::{BuildEvent, StateManager};
use chrono::Local;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Cancellation sender of the running build, tagged with its build id
type CancelSlot = Option<(u64, watch::Sender<bool>)>;

/// Handle to a submitted build
pub struct BuildHandle {
    build_id: u64,
    task: JoinHandle<BuildReport>,
}

impl BuildHandle {
    pub fn id(&self) -> u64 {
        self.build_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the build to finish and return its report.
    ///
    /// A build task that panicked has already been finished by its [`FinishGuard`]; the
    /// report returned here mirrors the one it emitted.
    pub async fn wait(self) -> BuildReport {
        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("Build task {} failed: {}", self.build_id, e);
                aborted_report(Duration::ZERO)
            }
        }
    }
}

/// Finishes a build exactly once: records metrics, frees the cancel slot and returns the
/// state machine to `Idle`.
///
/// Lives inside the build task, so a task that panics or is aborted still releases the
/// orchestrator when the guard is dropped.
struct FinishGuard {
    build_id: u64,
    state: StateManager,
    metrics: Arc<BuildMetrics>,
    cancel: Arc<Mutex<CancelSlot>>,
    started: Instant,
    finished: bool,
}

impl FinishGuard {
    fn complete(mut self, report: BuildReport) -> BuildReport {
        self.release(&report);
        self.finished = true;
        report
    }

    fn release(&self, report: &BuildReport) {
        self.metrics.record_report(report);

        {
            let mut slot = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.as_ref().is_some_and(|(id, _)| *id == self.build_id) {
                *slot = None;
            }
        }

        tracing::info!("{}", report.summary());
        self.state.finish(report.clone());
    }
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::error!("Build task {} ended without a report", self.build_id);
        let report = aborted_report(self.started.elapsed());
        self.release(&report);
    }
}

fn aborted_report(duration: Duration) -> BuildReport {
    BuildReport {
        outcome: BuildOutcome::Failed,
        error: None,
        error_message: Some("Build task ended unexpectedly".to_string()),
        diagnostics: Vec::new(),
        artifact: None,
        artifact_size: 0,
        duration,
        timestamp: Local::now(),
    }
}

/// Runs builds for one project, one at a time
///
/// Clones share the same state, event channel and metrics, so a UI can keep one clone for
/// `cancel()` while another awaits the build.
#[derive(Clone)]
pub struct BuildOrchestrator {
    settings: Arc<RwLock<IdeSettings>>,
    state: StateManager,
    cancel: Arc<Mutex<CancelSlot>>,
    metrics: Arc<BuildMetrics>,
    env: Arc<dyn Environment>,
}

impl BuildOrchestrator {
    pub fn new(settings: IdeSettings) -> Self {
        Self::with_environment(settings, Arc::new(SystemEnvironment))
    }

    /// Create an orchestrator that looks up tools through `env`
    pub fn with_environment(settings: IdeSettings, env: Arc<dyn Environment>) -> Self {
        Self {
            state: StateManager::new(settings.event_capacity),
            settings: Arc::new(RwLock::new(settings)),
            cancel: Arc::new(Mutex::new(None)),
            metrics: Arc::new(BuildMetrics::new()),
            env,
        }
    }

    /// Start a build on a new tokio task.
    ///
    /// Settings are captured here; changes made while the build runs apply to the next one.
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`BuildError::BuildAlreadyInProgress`] if a build is active; it is left untouched
    /// - [`BuildError::InvalidConfiguration`] if `config` is unusable
    pub fn submit(&self, project: ProjectDescriptor, config: BuildConfiguration) -> BuildResult<BuildHandle> {
        config.validate()?;
        let settings = self.settings();

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let build_id = {
            let mut slot = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
            let build_id = self.state.try_begin(project.root.clone())?;
            *slot = Some((build_id, cancel_tx));
            build_id
        };

        tracing::info!("Build {} submitted for {}", build_id, project.root);

        let run = BuildRun {
            settings,
            project,
            config,
            state: self.state.clone(),
            metrics: Arc::clone(&self.metrics),
            env: Arc::clone(&self.env),
            started: Instant::now(),
            diagnostics: Vec::new(),
            artifact: None,
        };

        let guard = FinishGuard {
            build_id,
            state: self.state.clone(),
            metrics: Arc::clone(&self.metrics),
            cancel: Arc::clone(&self.cancel),
            started: Instant::now(),
            finished: false,
        };

        let task = tokio::spawn(async move {
            let report = run.run(cancel_rx).await;
            guard.complete(report)
        });

        Ok(BuildHandle { build_id, task })
    }

    /// Request cancellation of the active build.
    ///
    /// A running compiler or archiver is asked to terminate and killed after the grace period.
    ///
    /// # Errors
    ///
    /// [`BuildError::NoBuildInProgress`] if no build is active
    pub fn cancel(&self) -> BuildResult<()> {
        let slot = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some((build_id, tx)) => {
                tracing::warn!("Cancelling build {}", build_id);
                let _ = tx.send(true);
                Ok(())
            }
            None => Err(BuildError::NoBuildInProgress),
        }
    }

    pub fn current_state(&self) -> BuildState {
        self.state.snapshot()
    }

    /// Whether a build holds the state machine, including the short window between its
    /// terminal phase and the final report
    pub fn is_building(&self) -> bool {
        self.state.phase() != BuildPhase::Idle
    }

    /// Subscribe to progress events of all future builds
    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.state.subscribe()
    }

    pub fn metrics(&self) -> Arc<BuildMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Current settings snapshot
    pub fn settings(&self) -> IdeSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the settings used by future builds
    pub fn update_settings(&self, settings: IdeSettings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }
}

/// Everything one build owns while it runs
struct BuildRun {
    settings: IdeSettings,
    project: ProjectDescriptor,
    config: BuildConfiguration,
    state: StateManager,
    metrics: Arc<BuildMetrics>,
    env: Arc<dyn Environment>,
    started: Instant,
    diagnostics: Vec<Diagnostic>,
    artifact: Option<Artifact>,
}

impl BuildRun {
    async fn run(mut self, mut cancel_rx: watch::Receiver<bool>) -> BuildReport {
        let result = self.execute(&mut cancel_rx).await;
        self.into_report(result)
    }

    async fn execute(&mut self, cancel_rx: &mut watch::Receiver<bool>) -> BuildResult<()> {
        // CollectingSources: tools first, so a missing JDK aborts before anything else runs
        self.state.set_operation("Locating Java tools...");
        let locator = ToolLocator::with_environment(
            Arc::clone(&self.env),
            self.settings.tool_home.clone(),
            self.settings.probe_timeout(),
        );
        let toolchain = locator.locate(cancel_rx).await?;
        check_cancelled(cancel_rx)?;

        self.state.set_operation("Scanning for Java files...");
        // Build output may live under the source root when the project is flat
        let collector = SourceCollector::from_settings(&self.settings)
            .exclude_path(self.project.output_root.clone())
            .exclude_path(self.config.output_dir.clone());
        let source_root = self.project.source_root.clone();
        let walk_root = source_root.clone();
        let walk_cancel = cancel_rx.clone();
        let sources = tokio::task::spawn_blocking(move || collector.collect(&walk_root, &walk_cancel))
            .await
            .map_err(|e| BuildError::io(&source_root, std::io::Error::other(e.to_string())))??;

        if sources.is_empty() {
            return Err(BuildError::NoSourceFiles(source_root));
        }
        self.state.set_source_count(sources.len());
        tracing::info!("Found {} Java source file(s)", sources.len());

        let entries: Vec<_> = self
            .project
            .classpath
            .iter()
            .chain(&self.settings.default_classpath)
            .chain(&self.config.extra_classpath)
            .cloned()
            .collect();
        let (classpath, warnings) = CompileInvoker::resolve_classpath(&entries);
        self.diagnostics.extend(warnings);

        let classes_dir = self.project.classes_dir();
        ArchiveAssembler::prepare_class_dir(&classes_dir, self.config.clean)?;

        // Compiling
        self.state.transition(
            BuildPhase::Compiling,
            format!("Compiling {} Java source file(s)...", sources.len()),
        );
        let invoker = CompileInvoker::new(&toolchain.compiler.path, &self.settings);
        let compile = invoker
            .compile(
                &sources,
                &classpath,
                &classes_dir,
                output_sink(self.state.clone(), Arc::clone(&self.metrics)),
                cancel_rx,
            )
            .await?;

        // ParsingDiagnostics
        self.state
            .transition(BuildPhase::ParsingDiagnostics, "Analyzing compiler output...");
        let parsed = DiagnosticParser::javac().parse(&compile);
        let errors = parsed.error_count();
        let reported_errors = parsed.reported_errors;
        self.diagnostics.extend(parsed.diagnostics);

        match compile.status {
            CompileStatus::Cancelled => return Err(BuildError::Cancelled),
            CompileStatus::Failure => {
                return Err(BuildError::CompilationFailed {
                    errors: errors.max(reported_errors).max(1),
                });
            }
            CompileStatus::Success if errors > 0 => {
                return Err(BuildError::CompilationFailed { errors });
            }
            CompileStatus::Success => {}
        }
        check_cancelled(cancel_rx)?;

        // Assembling
        self.state.transition(BuildPhase::Assembling, "Creating JAR file...");
        let assembler = ArchiveAssembler::new(&toolchain.archiver.path, &self.settings);
        let request = ArchiveRequest {
            project: &self.project,
            classes_dir: &classes_dir,
            main_class: self.config.effective_main_class(&self.project),
            archive_path: self.config.archive_path(),
        };
        let sink = output_sink(self.state.clone(), Arc::clone(&self.metrics));
        let artifact = assembler
            .assemble(&request, &mut self.diagnostics, sink, cancel_rx)
            .await?;
        self.artifact = Some(artifact);

        self.state
            .transition(BuildPhase::Completed, "Build completed successfully");
        Ok(())
    }

    fn into_report(self, result: BuildResult<()>) -> BuildReport {
        let (outcome, error) = match result {
            Ok(()) => (BuildOutcome::Succeeded, None),
            Err(BuildError::Cancelled) => {
                self.state
                    .transition(BuildPhase::Cancelled, "Build cancelled");
                (BuildOutcome::Cancelled, Some(BuildError::Cancelled))
            }
            Err(e) => {
                tracing::error!("Build failed: {}", e);
                self.state.transition(BuildPhase::Failed, e.to_string());
                (BuildOutcome::Failed, Some(e))
            }
        };

        let (artifact, artifact_size) = match self.artifact {
            Some(artifact) => (Some(artifact.path), artifact.size),
            None => (None, 0),
        };

        BuildReport {
            outcome,
            error: error.as_ref().map(BuildError::kind),
            error_message: error.as_ref().map(ToString::to_string),
            diagnostics: self.diagnostics,
            artifact,
            artifact_size,
            duration: self.started.elapsed(),
            timestamp: Local::now(),
        }
    }
}

/// Forward each live output line to subscribers and count it
fn output_sink(state: StateManager, metrics: Arc<BuildMetrics>) -> impl FnMut(&OutputLine) {
    move |line| {
        metrics.record_output_line();
        state.push_output(line.clone());
    }
}

fn check_cancelled(cancel_rx: &watch::Receiver<bool>) -> BuildResult<()> {
    if *cancel_rx.borrow() {
        Err(BuildError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModuleType;

    #[test]
    fn test_cancel_without_build() {
        let orchestrator = BuildOrchestrator::new(IdeSettings::default());
        assert!(matches!(orchestrator.cancel(), Err(BuildError::NoBuildInProgress)));
        assert!(!orchestrator.is_building());
    }

    #[test]
    fn test_invalid_configuration_is_rejected_before_starting() {
        let orchestrator = BuildOrchestrator::new(IdeSettings::default());
        let project = ProjectDescriptor::new("/w/CoolMod", "com.example", ModuleType::Basic);
        let mut config = BuildConfiguration::for_project(&project);
        config.archive_name = String::new();

        let result = orchestrator.submit(project, config);
        assert!(matches!(result, Err(BuildError::InvalidConfiguration(_))));
        assert_eq!(orchestrator.current_state().phase, BuildPhase::Idle);
    }

    fn claim(orchestrator: &BuildOrchestrator) -> FinishGuard {
        let build_id = orchestrator.state.try_begin("/w/CoolMod".into()).unwrap();
        let (cancel_tx, _cancel_rx) = watch::channel(false);
        *orchestrator.cancel.lock().unwrap() = Some((build_id, cancel_tx));
        FinishGuard {
            build_id,
            state: orchestrator.state.clone(),
            metrics: orchestrator.metrics(),
            cancel: Arc::clone(&orchestrator.cancel),
            started: Instant::now(),
            finished: false,
        }
    }

    #[tokio::test]
    async fn test_panicked_build_task_releases_orchestrator() {
        let orchestrator = BuildOrchestrator::new(IdeSettings::default());
        let mut rx = orchestrator.subscribe();
        let guard = claim(&orchestrator);
        assert!(orchestrator.is_building());

        let task = tokio::spawn(async move {
            let _guard = guard;
            let report: Option<BuildReport> = None;
            report.expect("compiler crashed")
        });
        assert!(task.await.unwrap_err().is_panic());

        assert!(!orchestrator.is_building());
        assert_eq!(orchestrator.current_state().phase, BuildPhase::Idle);
        assert!(matches!(orchestrator.cancel(), Err(BuildError::NoBuildInProgress)));
        assert_eq!(orchestrator.metrics().total_builds(), 1);

        let last = std::iter::from_fn(|| rx.try_recv().ok()).last().unwrap();
        match last {
            BuildEvent::Finished { report } => assert_eq!(report.outcome, BuildOutcome::Failed),
            other => panic!("expected Finished, got {:?}", other),
        }
    }

    #[test]
    fn test_completed_guard_finishes_once() {
        let orchestrator = BuildOrchestrator::new(IdeSettings::default());
        let mut rx = orchestrator.subscribe();
        let guard = claim(&orchestrator);

        guard.complete(aborted_report(Duration::ZERO));

        let finished = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| matches!(e, BuildEvent::Finished { .. }))
            .count();
        assert_eq!(finished, 1);
        assert_eq!(orchestrator.metrics().total_builds(), 1);
    }

    #[test]
    fn test_building_until_final_report() {
        let orchestrator = BuildOrchestrator::new(IdeSettings::default());
        let guard = claim(&orchestrator);
        orchestrator.state.transition(BuildPhase::Failed, "javac not found");

        // Terminal phase, report not yet emitted: still occupied, as submit agrees
        assert!(orchestrator.is_building());
        let project = ProjectDescriptor::new("/w/CoolMod", "com.example", ModuleType::Basic);
        let config = BuildConfiguration::for_project(&project);
        assert!(matches!(
            orchestrator.submit(project, config),
            Err(BuildError::BuildAlreadyInProgress)
        ));

        guard.complete(aborted_report(Duration::ZERO));
        assert!(!orchestrator.is_building());
    }

    #[test]
    fn test_update_settings() {
        let orchestrator = BuildOrchestrator::new(IdeSettings::default());
        let settings = IdeSettings {
            compile_timeout_secs: 42,
            ..IdeSettings::default()
        };
        orchestrator.update_settings(settings);
        assert_eq!(orchestrator.settings().compile_timeout_secs, 42);
    }
}
