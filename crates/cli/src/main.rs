use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pfa_event::EventStore;
use pfa_pipeline::{AlgorithmRegistry, Pipeline, PipelineConfig};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "pfa-reco")]
#[command(about = "Merge calorimeter cluster fragments into track-anchored parents", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for reports)
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured algorithms over an event file
    Run(RunArgs),

    /// List registered algorithm names
    Algorithms,

    /// Parse and validate a pipeline configuration without running it
    CheckConfig(CheckConfigArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Event file (JSON)
    #[arg(long)]
    event: PathBuf,

    /// Pipeline configuration (TOML); defaults to fragment removal only
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the reconstructed event here
    #[arg(long)]
    output: Option<PathBuf>,

    /// Print per-algorithm reports as JSON
    #[arg(long)]
    report: bool,
}

#[derive(Args)]
struct CheckConfigArgs {
    /// Pipeline configuration (TOML)
    #[arg(long)]
    config: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let registry = AlgorithmRegistry::with_builtins();
    match cli.command {
        Commands::Run(args) => run(&registry, args),
        Commands::Algorithms => {
            for name in registry.names() {
                println!("{name}");
            }
            Ok(())
        }
        Commands::CheckConfig(args) => check_config(&registry, &args.config),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load pipeline config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn run(registry: &AlgorithmRegistry, args: RunArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let pipeline = Pipeline::from_config(registry, &config).context("Failed to build pipeline")?;

    let mut store = EventStore::load(&args.event)
        .with_context(|| format!("Failed to load event {}", args.event.display()))?;
    let reports = pipeline.run(&mut store).context("Reconstruction failed")?;

    if let Some(output) = &args.output {
        store
            .save(output)
            .with_context(|| format!("Failed to write event {}", output.display()))?;
        log::info!("wrote {}", output.display());
    }

    if args.report {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            println!(
                "{}: {} merges, {} -> {} clusters",
                report.name,
                report.merges.len(),
                report.clusters_before,
                report.clusters_after
            );
        }
    }
    Ok(())
}

fn check_config(registry: &AlgorithmRegistry, path: &Path) -> Result<()> {
    let config = load_config(Some(path))?;
    let pipeline = Pipeline::from_config(registry, &config).context("Invalid pipeline")?;
    println!("ok: {}", pipeline.stage_names().join(", "));
    Ok(())
}
