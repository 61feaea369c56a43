//! modide - Build pipeline of a Minecraft mod IDE
//!
//! Main entry point for the command-line front end.
//!
//! # Overview
//!
//! This binary drives the same [`BuildOrchestrator`] the IDE's build panel uses. It initializes:
//! - Logging infrastructure (daily file rotation, optional console output)
//! - Configuration loading ([`ConfigManager`])
//! - A tokio runtime for the compiler and archiver child processes
//! - A [`ConsoleReporter`] that renders build progress events
//!
//! # Commands
//!
//! - `modide build <project>`: compile the project and package it into a JAR
//! - `modide tools`: show which `javac` and `jar` a build would use
//! - `modide main-classes <project>`: list classes declaring `public static void main`
//!
//! Pressing Ctrl-C during a build cancels it; the running tool is terminated and the
//! partial output is discarded.

use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use modide::services::{SourceCollector, ToolLocator, open_project};
use modide::ui::ConsoleReporter;
use modide::{APP_NAME, BuildConfiguration, BuildOrchestrator, ConfigManager, IdeSettings, VERSION};
use std::process::ExitCode;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "modide", version, about = "Build Minecraft mod projects into JAR files")]
struct Cli {
    /// Directory holding settings.yaml
    #[arg(long, global = true, default_value = "modide-config")]
    config_dir: Utf8PathBuf,

    /// Directory for log files
    #[arg(long, global = true, default_value = "logs")]
    log_dir: Utf8PathBuf,

    /// Enable debug logging and mirror the log to stderr
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a project and package it into a JAR
    Build {
        /// Project root directory
        project: Utf8PathBuf,

        /// Directory the JAR is written to (default: settings, then <project>/dist)
        #[arg(short, long)]
        output_dir: Option<Utf8PathBuf>,

        /// File name of the JAR (default: <project name>.jar)
        #[arg(short, long)]
        jar_name: Option<String>,

        /// Fully qualified main class recorded in the manifest
        #[arg(short, long)]
        main_class: Option<String>,

        /// Additional classpath entries (repeatable)
        #[arg(long = "classpath", value_name = "PATH")]
        classpath: Vec<Utf8PathBuf>,

        /// Delete previously compiled classes before compiling
        #[arg(long)]
        clean: bool,

        /// Only show diagnostics, not the live tool output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show the compiler and archiver a build would use
    Tools,

    /// List the classes of a project that declare a main method
    MainClasses {
        /// Project root directory
        project: Utf8PathBuf,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Load configuration, set up logging and dispatch the subcommand
///
/// # Errors
///
/// This function can fail if:
/// - The configuration directory cannot be created or settings.yaml is invalid
/// - Logging initialization fails (disk space, permissions)
/// - Tokio runtime creation fails (system resources)
/// - The project directory cannot be opened
fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let mut settings = config_manager.load_settings()?;
    settings.debug_mode |= cli.debug;

    let _guard = modide::logging::setup_logging(&cli.log_dir, settings.debug_mode, cli.debug)?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("modide-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let result = runtime.block_on(async {
        match cli.command {
            Command::Build {
                project,
                output_dir,
                jar_name,
                main_class,
                classpath,
                clean,
                quiet,
            } => {
                let options = BuildOptions {
                    output_dir,
                    jar_name,
                    main_class,
                    classpath,
                    clean,
                    quiet,
                };
                build(project, options, settings).await
            }
            Command::Tools => tools(&settings).await,
            Command::MainClasses { project } => main_classes(project),
        }
    });

    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    tracing::info!("Shutdown complete");
    result
}

struct BuildOptions {
    output_dir: Option<Utf8PathBuf>,
    jar_name: Option<String>,
    main_class: Option<String>,
    classpath: Vec<Utf8PathBuf>,
    clean: bool,
    quiet: bool,
}

async fn build(project_root: Utf8PathBuf, options: BuildOptions, settings: IdeSettings) -> Result<ExitCode> {
    let project = open_project(&project_root)?;

    let mut config = BuildConfiguration::for_project(&project);
    if let Some(dir) = options.output_dir.or_else(|| settings.default_output_dir.clone()) {
        config.output_dir = dir;
    }
    if let Some(name) = options.jar_name {
        config.archive_name = name;
    }
    config.main_class = options.main_class;
    config.extra_classpath = options.classpath;
    config.clean = options.clean;

    let orchestrator = BuildOrchestrator::new(settings);
    let reporter = ConsoleReporter::stdout(!options.quiet);
    let events = orchestrator.subscribe();
    let render = tokio::spawn(reporter.run(events));

    let handle = orchestrator.submit(project, config)?;

    let canceller = orchestrator.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling build...");
            if let Err(e) = canceller.cancel() {
                tracing::debug!("Ctrl-C after build finished: {}", e);
            }
        }
    });

    let report = handle.wait().await;
    ctrl_c.abort();

    match render.await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => tracing::warn!("Failed to write build output: {}", e),
        Err(e) => tracing::warn!("Console reporter task failed: {}", e),
    }

    orchestrator.metrics().log_summary();

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn tools(settings: &IdeSettings) -> Result<ExitCode> {
    let locator = ToolLocator::new(settings.tool_home.clone(), settings.probe_timeout());
    let (_cancel_tx, mut cancel_rx) = watch::channel(false);
    let toolchain = locator.locate(&mut cancel_rx).await?;

    for tool in [&toolchain.compiler, &toolchain.archiver] {
        println!(
            "{:<6} {} ({})",
            tool.name,
            tool.path,
            tool.version.as_deref().unwrap_or("unknown version")
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn main_classes(project_root: Utf8PathBuf) -> Result<ExitCode> {
    let project = open_project(&project_root)?;
    let classes = SourceCollector::default().find_main_classes(&project.source_root)?;

    if classes.is_empty() {
        bail!("No main class found under {}", project.source_root);
    }
    for class in classes {
        println!("{}", class);
    }
    Ok(ExitCode::SUCCESS)
}
