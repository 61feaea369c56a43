//! Services module - The build pipeline stages.
//!
//! Each service covers one step of turning a mod project into a JAR. The services hold no
//! build state of their own and have no dependencies on the UI layer; the
//! [`BuildOrchestrator`](crate::orchestrator::BuildOrchestrator) sequences them.
//!
//! # Components
//!
//! - [`ToolLocator`]: Finds `javac` and `jar` (tool home, `JAVA_HOME`, `PATH`) and probes them
//! - [`SourceCollector`]: Walks the source root, skipping build output and VCS directories
//! - [`CompileInvoker`]: Runs `javac` with the resolved classpath, falling back to an `@argfile`
//!   for long command lines
//! - [`DiagnosticParser`]: Turns compiler and archiver output into [`Diagnostic`](crate::models::Diagnostic)s
//! - [`ArchiveAssembler`]: Writes the manifest and packages classes and resources with `jar`
//! - [`open_project`]: Builds a [`ProjectDescriptor`](crate::models::ProjectDescriptor) for a
//!   project directory
//!
//! All child processes go through [`process::run_streaming`], which merges stdout and stderr
//! into one ordered line stream and handles timeouts and cancellation.
//!
//! # Usage Example
//!
//! ```ignore
//! use modide::services::{CompileInvoker, DiagnosticParser, SourceCollector, ToolLocator};
//!
//! let toolchain = ToolLocator::new(None, settings.probe_timeout()).locate(&mut cancel_rx).await?;
//! let sources = SourceCollector::from_settings(&settings).collect(&project.source_root, &cancel_rx)?;
//!
//! let invoker = CompileInvoker::new(&toolchain.compiler.path, &settings);
//! let result = invoker
//!     .compile(&sources, &project.classpath, &project.classes_dir(), |line| println!("{}", line.text), &mut cancel_rx)
//!     .await?;
//!
//! let parsed = DiagnosticParser::javac().parse(&result);
//! ```

pub mod archive_assembler;
pub mod compile_invoker;
pub mod diagnostic_parser;
pub mod process;
pub mod project_detection;
pub mod source_collector;
pub mod tool_locator;

pub use archive_assembler::{ArchiveAssembler, ArchiveRequest, Artifact};
pub use compile_invoker::{join_classpath, CompileInvoker, CompilerArguments};
pub use diagnostic_parser::{
    DiagnosticDialect, DiagnosticParser, JarDialect, JavacDialect, LineKind, ParsedOutput,
};
pub use process::{ProcessExit, ProcessLimits, ProcessOutput};
pub use project_detection::{detect_module_type, infer_package_name, open_project, read_overrides, PROJECT_FILE};
pub use source_collector::SourceCollector;
pub use tool_locator::{Environment, ResolvedTool, SystemEnvironment, ToolLocator, Toolchain};
