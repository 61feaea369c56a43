// ConsoleReporter - Renders build events for the command-line front end
//
// The reporter is the terminal counterpart of the IDE's build panel: it prints phase
// changes with a percentage, echoes compiler/archiver output as it arrives, and finishes
// with the diagnostics list and the report summary.

use crate::models::{BuildPhase, BuildReport, StreamSource};
use crate::state::BuildEvent;
use std::io::{self, Write};
use tokio::sync::broadcast;

/// Writes [`BuildEvent`]s to a terminal (or any writer)
pub struct ConsoleReporter<W: Write> {
    out: W,

    /// Echo live tool output; off in quiet mode where only diagnostics are shown
    show_output: bool,

    last_phase: Option<BuildPhase>,
}

impl ConsoleReporter<io::Stdout> {
    pub fn stdout(show_output: bool) -> Self {
        Self::new(io::stdout(), show_output)
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W, show_output: bool) -> Self {
        Self {
            out,
            show_output,
            last_phase: None,
        }
    }

    /// Render one event.
    ///
    /// # Returns
    /// The final report once a [`BuildEvent::Finished`] has been rendered
    pub fn handle(&mut self, event: &BuildEvent) -> io::Result<Option<BuildReport>> {
        match event {
            BuildEvent::PhaseChanged {
                phase,
                message,
                percent,
                ..
            } => {
                if self.last_phase != Some(*phase) {
                    writeln!(self.out, "[{:>3}%] {}", percent, phase)?;
                    self.last_phase = Some(*phase);
                }
                if !message.is_empty() && message != phase.label() {
                    writeln!(self.out, "       {}", message)?;
                }
            }
            BuildEvent::Output { line } => {
                if self.show_output {
                    match line.source {
                        StreamSource::Stdout => writeln!(self.out, "  | {}", line.text)?,
                        StreamSource::Stderr => writeln!(self.out, "  ! {}", line.text)?,
                    }
                }
            }
            BuildEvent::Finished { report } => {
                self.render_report(report)?;
                self.out.flush()?;
                return Ok(Some((**report).clone()));
            }
        }

        Ok(None)
    }

    fn render_report(&mut self, report: &BuildReport) -> io::Result<()> {
        if !report.diagnostics.is_empty() {
            writeln!(self.out)?;
            for diagnostic in &report.diagnostics {
                writeln!(self.out, "{}", diagnostic)?;
            }
        }

        writeln!(self.out)?;
        writeln!(self.out, "{}", report.summary())
    }

    /// Render events until the build finishes.
    ///
    /// Lagging behind the channel only drops intermediate lines; the final report is
    /// always the newest event, so it is still received.
    ///
    /// # Returns
    /// The final report, or `None` if the channel closed before the build finished
    pub async fn run(mut self, mut rx: broadcast::Receiver<BuildEvent>) -> io::Result<Option<BuildReport>> {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(report) = self.handle(&event)? {
                        return Ok(Some(report));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Console output fell behind, skipped {} event(s)", skipped);
                    writeln!(self.out, "  ... {} line(s) skipped", skipped)?;
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
            }
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
