use anyhow::Result;
use clap::{Parser, Subcommand};
use extindex::{
    config::Config,
    coordinator::{select_modules, CoordinatorOptions, ScanCoordinator},
    error::CoordinatorError,
    frontend::{fixture::FixtureWorkspace, ModuleProvider},
    model::ReportModel,
    output::{format_result_to_string, print_result, OutputFormat},
    DuplicatePolicy,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::future::Future;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const DUPLICATE_DEFINITION: u8 = 2;
    pub const MODULE_FAILURES: u8 = 3;
}

#[derive(Parser)]
#[command(name = "extindex")]
#[command(
    author,
    version,
    about = "Index extension points, their implementations and UI actions across a core and its plugins"
)]
struct Cli {
    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a workspace and report its extension points
    Scan {
        /// Workspace description: a JSON file or a directory of module JSON files
        workspace: PathBuf,

        /// Only scan these plugins (artifact ids). The core is always scanned
        modules: Vec<String>,

        /// Output format (table, json)
        #[arg(short, long)]
        format: Option<String>,

        /// Write output to file
        #[arg(short, long)]
        output: Option<String>,

        /// Number of modules scanned concurrently
        #[arg(short, long)]
        workers: Option<usize>,

        /// Scan one module at a time
        #[arg(long)]
        sequential: bool,

        /// Abandon a module after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Duplicate extension point definitions: fail or flag
        #[arg(long)]
        on_duplicate: Option<DuplicatePolicy>,

        /// Exit with an error if any module could not be scanned
        #[arg(long)]
        strict: bool,
    },

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

/// How long shutdown waits for front-end work that outlived its timeout.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn main() -> ExitCode {
    let result = block_on(run(), SHUTDOWN_GRACE)
        .map_err(anyhow::Error::from)
        .and_then(|r| r);
    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

/// Runs `future` to completion, then gives blocking tasks still in flight
/// at most `grace` before the process moves on.
fn block_on<F: Future>(future: F, grace: Duration) -> std::io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(grace);
    Ok(output)
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn run() -> Result<u8> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(Config::config_path);
    let mut config = Config::load_from(&config_path)?;
    debug!("Loaded configuration from {}", config_path.display());

    match cli.command {
        Commands::Scan {
            workspace,
            modules,
            format,
            output,
            workers,
            sequential,
            timeout,
            on_duplicate,
            strict,
        } => {
            if workers.is_some() {
                config.workers = workers;
            }
            if sequential {
                config.resource_constrained = true;
            }
            if timeout.is_some() {
                config.module_timeout_secs = timeout;
            }
            if let Some(policy) = on_duplicate {
                config.on_duplicate_definition = policy;
            }
            let format_str = format.unwrap_or(config.default_format.clone());

            run_scan(&config, workspace, modules, format_str, output, strict).await
        }
        Commands::Config { init, path } => {
            handle_config(&config_path, init, path)?;
            Ok(exit_codes::SUCCESS)
        }
    }
}

async fn run_scan(
    config: &Config,
    workspace: PathBuf,
    only: Vec<String>,
    format: String,
    output_file: Option<String>,
    strict: bool,
) -> Result<u8> {
    let format = OutputFormat::from_str(&format).map_err(|e| anyhow::anyhow!(e))?;
    let is_interactive = format == OutputFormat::Table;

    let provider = Arc::new(FixtureWorkspace::load(&workspace, &config.contracts())?);
    let descriptors = select_modules(provider.modules().await?, &only, &config.skip_modules);
    info!(
        "Loaded {} modules from {} via {}",
        descriptors.len(),
        workspace.display(),
        provider.name()
    );

    let options = CoordinatorOptions::from_config(config);
    let mut coordinator = ScanCoordinator::new(provider, options);

    let progress = if is_interactive {
        let pb = ProgressBar::new(descriptors.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} Scanning modules...")?
                .progress_chars("#>-"),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        let pb = Arc::new(pb);
        coordinator = coordinator.with_progress(Arc::clone(&pb));
        Some(pb)
    } else {
        None
    };

    let result = coordinator.run(descriptors).await;

    if let Some(pb) = progress {
        match &result {
            Ok(report) => pb.finish_with_message(format!(
                "Found {} extension points",
                report.defined_extension_points().count()
            )),
            Err(_) => pb.abandon(),
        }
    }

    let report = match result {
        Ok(report) => report,
        Err(CoordinatorError::Aggregate(e)) => {
            eprintln!("Error: {}", e);
            return Ok(exit_codes::DUPLICATE_DEFINITION);
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(path) = output_file {
        let content = format_result_to_string(&report, format)?;
        std::fs::write(&path, content)?;
        if is_interactive {
            println!("Results written to: {}", path);
        }
    } else {
        print_result(&report, format)?;
    }

    Ok(determine_exit_code(&report, strict))
}

/// Determine the exit code based on module failures and --strict
fn determine_exit_code(report: &ReportModel, strict: bool) -> u8 {
    if strict && !report.failures.is_empty() {
        exit_codes::MODULE_FAILURES
    } else {
        exit_codes::SUCCESS
    }
}

fn handle_config(config_path: &Path, init: bool, show_path: bool) -> Result<()> {
    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        let config = Config::default();
        config.save_to(config_path)?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    // Show current config
    if config_path.exists() {
        let content = std::fs::read_to_string(config_path)?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'extindex config --init' to create one.");
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}
