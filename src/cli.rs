//! The command line interface for the program.
use crate::input::load_model;
use crate::log;
use crate::model::ModelVariant;
use crate::optimisation::RebalanceRun;
use crate::output::{DataWriter, create_output_directory, get_output_dir};
use crate::settings::Settings;
use ::log::{info, warn};
use anyhow::{Context, Result, ensure};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

pub mod example;
use example::ExampleSubcommands;

pub mod settings;
use settings::SettingsSubcommands;

/// The command line interface for the program.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options for the `run` command
#[derive(Args, Default)]
pub struct RunOpts {
    /// Directory for output files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Whether to overwrite the output directory if it already exists
    #[arg(long)]
    pub overwrite: bool,
    /// Which formulation to solve, overriding the model file
    #[arg(long, value_enum)]
    pub variant: Option<ModelVariant>,
    /// Number of reserve bikes available each hour, overriding the model file
    #[arg(long, value_name = "BIKES")]
    pub reserve_size: Option<f64>,
    /// Time limit for the solver in seconds, overriding the model file
    #[arg(long, value_name = "SECS")]
    pub time_limit: Option<f64>,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Solve a rebalancing model.
    Run {
        /// Path to the model directory.
        model_dir: PathBuf,
        /// Other run options
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Manage example models.
    Example {
        /// The available subcommands for managing example models.
        #[command(subcommand)]
        subcommand: ExampleSubcommands,
    },
    /// Validate a model.
    Validate {
        /// The path to the model directory.
        model_dir: PathBuf,
    },
    /// Manage settings file.
    Settings {
        /// The subcommands for managing the settings file.
        #[command(subcommand)]
        subcommand: SettingsSubcommands,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Run { model_dir, opts } => handle_run_command(&model_dir, &opts, None),
            Self::Example { subcommand } => subcommand.execute(),
            Self::Validate { model_dir } => handle_validate_command(&model_dir, None),
            Self::Settings { subcommand } => subcommand.execute(),
        }
    }
}

/// Parse CLI arguments and run the requested command
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    if let Some(command) = cli.command {
        command.execute()?;
    } else {
        // No command provided. Show help.
        Cli::command().print_long_help()?;
    }

    Ok(())
}

/// Load settings, unless they were provided by the caller
fn load_settings(settings: Option<Settings>) -> Result<Settings> {
    if let Some(settings) = settings {
        Ok(settings)
    } else {
        Settings::load().context("Failed to load settings.")
    }
}

/// Handle the `run` command.
pub fn handle_run_command(
    model_path: &Path,
    opts: &RunOpts,
    settings: Option<Settings>,
) -> Result<()> {
    let mut settings = load_settings(settings)?;

    // This setting can be overridden by command-line arguments
    if opts.overwrite {
        settings.overwrite = true;
    }

    // Get path to output folder
    let pathbuf: PathBuf;
    let output_path = if let Some(p) = opts.output_dir.as_deref() {
        p
    } else {
        pathbuf = get_output_dir(model_path, settings.results_root)?;
        &pathbuf
    };

    let overwrite =
        create_output_directory(output_path, settings.overwrite).with_context(|| {
            format!(
                "Failed to create output directory: {}",
                output_path.display()
            )
        })?;

    log::init(&settings.log_level, Some(output_path)).context("Failed to initialise logging.")?;

    info!("Starting rebalance v{}", env!("CARGO_PKG_VERSION"));

    let model = load_model(model_path).context("Failed to load model.")?;
    info!("Loaded model from {}", model_path.display());
    info!("Output folder: {}", output_path.display());

    // NB: We have to wait until the logger is initialised to display this warning
    if overwrite {
        warn!("Output folder will be overwritten");
    }

    let mut run = RebalanceRun::new(&model);
    if let Some(variant) = opts.variant {
        run = run.with_variant(variant);
    }
    if let Some(reserve_size) = opts.reserve_size {
        ensure!(
            reserve_size.is_finite() && reserve_size >= 0.0,
            "Reserve size must be a finite, non-negative number"
        );
        run = run.with_reserve_size(reserve_size);
    }
    if let Some(time_limit) = opts.time_limit {
        ensure!(
            time_limit.is_finite() && time_limit > 0.0,
            "Time limit must be a finite, positive number"
        );
        run = run.with_time_limit(time_limit);
    }

    let solution = run.run()?.into_optimal()?;
    info!(
        "Optimal solution found: objective {}, total lost sales {}, transfers {}",
        solution.objective_value(),
        solution.total_loss(),
        solution.total_transfers()
    );

    let mut writer = DataWriter::create(output_path, model_path)?;
    writer.write_solution(&solution)?;
    writer.flush()?;
    info!("Results saved to {}", output_path.display());

    Ok(())
}

/// Handle the `validate` command.
pub fn handle_validate_command(model_path: &Path, settings: Option<Settings>) -> Result<()> {
    let settings = load_settings(settings)?;

    // We don't save log files when running the validate command
    log::init(&settings.log_level, None).context("Failed to initialise logging.")?;

    load_model(model_path).context("Failed to validate model.")?;
    info!("Model validation successful!");

    Ok(())
}
