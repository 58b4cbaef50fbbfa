#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;

use nimbus::config::PipelineConfig;
use nimbus::pipeline::{self, PipelineError};
use nimbus::report;

/// Settings shared by every subcommand that reads a configuration.
#[derive(Args)]
struct ConfigArgs {
    /// TOML configuration file (see configs/aqi.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Name of the target column; required when no configuration file is given
    #[arg(long)]
    target: Option<String>,

    /// Additional feature to drop after the initial VIF report (repeatable)
    #[arg(long = "drop", value_name = "COLUMN")]
    drop: Vec<String>,
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Delimited data file with a header row
    data: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,

    /// Seed for the train/test split
    #[arg(long)]
    seed: Option<u64>,

    /// Fraction of rows held out for testing
    #[arg(long)]
    test_fraction: Option<f64>,

    /// Cumulative explained variance the principal components must reach
    #[arg(long)]
    variance_threshold: Option<f64>,

    /// L2 penalty of the ridge model
    #[arg(long)]
    ridge_alpha: Option<f64>,

    /// Number of cross-validation folds
    #[arg(long)]
    folds: Option<usize>,

    /// Directory for the tab-separated artifacts (created if missing)
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
}

#[derive(Args)]
struct VifArgs {
    /// Delimited data file with a header row
    data: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,

    /// Number of most correlated feature pairs to list
    #[arg(long, default_value = "10")]
    top_pairs: usize,
}

#[derive(Parser)]
#[command(
    name = "nimbus",
    about = "Air-quality regression analysis",
    long_about = "Cleans a tabular air-quality dataset, screens its predictors for \
                 multicollinearity, reduces them with PCA, and compares linear and ridge \
                 regression on a held-out split and by k-fold cross-validation."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis
    #[command(about = "Run the full analysis and print the metrics report")]
    Analyze(AnalyzeArgs),
    /// Print variance inflation factors for the cleaned features
    #[command(about = "Print VIF and correlation diagnostics to guide column dropping")]
    Vif(VifArgs),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Commands::Analyze(args)) => analyze(args),
        Some(Commands::Vif(args)) => vif(args),
        None => {
            if let Err(e) = Cli::command().print_help() {
                eprintln!("Error: {e}");
            }
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error ({}): {e}", e.kind());
        process::exit(1);
    }
}

fn resolve_config(args: &ConfigArgs) -> Result<PipelineConfig, PipelineError> {
    let mut config = match (&args.config, &args.target) {
        (Some(path), _) => {
            println!("Loading configuration from: {}", path.display());
            PipelineConfig::load(path)?
        }
        (None, Some(target)) => PipelineConfig::for_target(target.clone()),
        (None, None) => return Err(nimbus::config::ConfigError::MissingTarget.into()),
    };
    if let Some(target) = &args.target {
        config.data.target = target.clone();
    }
    for column in &args.drop {
        if !config.collinearity.drop.contains(column) {
            config.collinearity.drop.push(column.clone());
        }
    }
    Ok(config)
}

fn analyze(args: AnalyzeArgs) -> Result<(), PipelineError> {
    let mut config = resolve_config(&args.config)?;
    if let Some(seed) = args.seed {
        config.split.seed = seed;
    }
    if let Some(fraction) = args.test_fraction {
        config.split.test_fraction = fraction;
    }
    if let Some(threshold) = args.variance_threshold {
        config.transform.variance_threshold = threshold;
    }
    if let Some(alpha) = args.ridge_alpha {
        config.model.ridge_alpha = alpha;
    }
    if let Some(folds) = args.folds {
        config.evaluation.folds = folds;
    }

    println!("Analyzing: {}", args.data.display());
    let run = pipeline::run(&args.data, &config)?;
    println!("{}", report::render_summary(&run));

    if let Some(dir) = &args.output_dir {
        let written = report::write_artifacts(dir, &run)?;
        println!("Artifacts saved to: {}", dir.display());
        for path in written {
            println!("  {}", file_label(&path));
        }
    }
    Ok(())
}

fn vif(args: VifArgs) -> Result<(), PipelineError> {
    let config = resolve_config(&args.config)?;
    config.validate()?;

    let prepared = pipeline::prepare(&args.data, &config)?;
    let (features, _) = prepared.features_and_target(&config)?;
    let screen = pipeline::screen_collinearity(&features, &config.collinearity)?;

    println!("VIF Data:\n{}", screen.initial);
    if screen.matrix.n_features() < features.n_features() {
        println!("VIF Data (reduced):\n{}", screen.reduced);
    }

    let pairs = pipeline::strongest_pairs(&screen, args.top_pairs);
    if !pairs.is_empty() {
        println!("Strongest correlations:");
        for (a, b, r) in pairs {
            println!("  {a} ~ {b}: {r:+.4}");
        }
    }
    Ok(())
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
