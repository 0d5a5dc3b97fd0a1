use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use alphapickle::config::{Config, ConfigLoader};
use alphapickle::domain::SourceKind;
use alphapickle::error::AlphaPickleError;
use alphapickle::output::{JsonOutput, OutputMode, TextOutput};
use alphapickle::runner::Runner;

#[derive(Parser)]
#[command(name = "alphapickle")]
#[command(
    about = "Extract pLDDT and PAE metadata from AlphaFold/ColabFold outputs into CSV, ChimeraX attribute files and SVG plots",
    long_about = "Extract pLDDT and PAE metadata from AlphaFold/ColabFold outputs.\n\n\
        Each source gets <name>_pLDDT.csv, <name>_pLDDT.defattr and <name>_PAE.csv where the data \
        exists. Plots are written as SVG (<name>_pLDDT.svg, <name>_PAE.svg), not PNG."
)]
#[command(version, author)]
struct Cli {
    /// Print JSON summaries instead of progress and coloured text.
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Config file (default: ./alphapickle.json, then the user config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    plot: PlotArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PlotArgs {
    /// Plot size in inches.
    #[arg(long, global = true)]
    plot_size: Option<f64>,

    /// Residue spacing of axis labels.
    #[arg(long, global = true)]
    plot_increment: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Process every ranked model listed in <DIR>/ranking_debug.json")]
    Batch(BatchArgs),
    #[command(about = "Process a single results container, PDB file or PAE JSON file")]
    File(FileArgs),
}

#[derive(Args)]
struct BatchArgs {
    directory: PathBuf,

    /// Worker threads (default: 1, sequential).
    #[arg(long, short)]
    jobs: Option<usize>,
}

#[derive(Args)]
struct FileArgs {
    path: PathBuf,

    #[arg(long, value_enum)]
    kind: SourceKind,

    /// Name outputs `ranked_<RANK>` instead of after the file.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    rank: Option<u32>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<AlphaPickleError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &AlphaPickleError) -> u8 {
    match error {
        AlphaPickleError::ManifestNotFound(_) | AlphaPickleError::ConfigRead(_) => 2,
        AlphaPickleError::BatchFailed { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let file_config = ConfigLoader::resolve(cli.config.as_deref())?;
    let overrides = Config {
        plot_size: cli.plot.plot_size,
        plot_increment: cli.plot.plot_increment,
        jobs: match &cli.command {
            Commands::Batch(args) => args.jobs,
            Commands::File(_) => None,
        },
    };
    let options = ConfigLoader::resolve_options(file_config.merge(overrides))?;
    let runner = Runner::new(options)?;

    match cli.command {
        Commands::Batch(args) => run_batch(&runner, args, output_mode),
        Commands::File(args) => run_file(&runner, args, output_mode),
    }
}

fn run_batch(runner: &Runner, args: BatchArgs, output_mode: OutputMode) -> miette::Result<()> {
    let result = match output_mode {
        OutputMode::NonInteractive => {
            let result = runner.process_directory(&args.directory, &JsonOutput)?;
            JsonOutput::print_batch(&result.report()).into_diagnostic()?;
            result
        }
        OutputMode::Interactive => {
            let result = runner.process_directory(&args.directory, &TextOutput)?;
            TextOutput::print_batch(&result.report());
            result
        }
    };
    result.ensure_success()?;
    Ok(())
}

fn run_file(runner: &Runner, args: FileArgs, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = runner.process_file(args.kind, &args.path, args.rank, &JsonOutput)?;
            JsonOutput::print_process(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let result = runner.process_file(args.kind, &args.path, args.rank, &TextOutput)?;
            TextOutput::print_process(&result);
        }
    }
    Ok(())
}
