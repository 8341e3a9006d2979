#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use genepi::config::PipelineConfig;
use genepi::data::load_feature_table;
use genepi::fit::model::PersistedClassifier;
use genepi::progress::ConsoleProgress;
use genepi::report::output::{PREDICTION_FILE, write_predictions};
use genepi::run::{CrossGenePipeline, PipelineOutcome, RunPaths};

#[derive(Args)]
pub struct RunArgs {
    /// Directory holding the per-gene `*Feature.csv` tables
    pub feature_dir: PathBuf,

    /// Header-less phenotype CSV; the last column is the binary outcome
    pub phenotype: PathBuf,

    /// Single-gene score file [default: first `All_Logistic*` file in the feature directory]
    #[arg(long, value_name = "FILE")]
    pub score: Option<PathBuf>,

    /// Output directory [default: `crossGeneResult` next to the feature directory]
    #[arg(long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// TOML file with run settings; flags given here take precedence
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of outer cross-validation folds
    #[arg(long, value_name = "K")]
    pub k_fold: Option<usize>,

    /// Worker threads for the grid search and stability selection
    #[arg(long, value_name = "N")]
    pub n_jobs: Option<usize>,

    /// Seed of the row permutation applied before model fitting
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Classifier written by `genepi run`
    #[arg(long, value_name = "FILE")]
    pub model: PathBuf,

    /// Feature table whose header matches the classifier's features
    pub features: PathBuf,

    /// Destination of the predictions
    #[arg(long, default_value = PREDICTION_FILE)]
    pub output: PathBuf,
}

#[derive(Parser)]
#[command(
    name = "genepi",
    about = "Cross-gene epistasis detection",
    long_about = "Screens per-gene variant features, expands them into cross-gene interactions \
                 and fits an L1 logistic model of the surviving interactions."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Detect cross-gene epistasis (outputs: Result.csv, Feature.csv, Classifier.toml, plots)")]
    Run(RunArgs),
    #[command(about = "Apply a saved classifier to a feature table (outputs: predictions.tsv)")]
    Apply(ApplyArgs),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Run(args)) => run(args),
        Some(Commands::Apply(args)) => apply(args),
        None => {
            if let Err(e) = Cli::command().print_help() {
                eprintln!("Error: {e}");
            }
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn load_config(args: &RunArgs) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => {
            println!("Loading settings from: {}", path.display());
            PipelineConfig::load(path)?
        }
        None => PipelineConfig::default(),
    };
    if let Some(k_fold) = args.k_fold {
        config.k_fold = k_fold;
    }
    if let Some(n_jobs) = args.n_jobs {
        config.n_jobs = n_jobs;
    }
    if let Some(seed) = args.seed {
        config.shuffle_seed = seed;
    }
    config.validate()?;
    Ok(config)
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&args)?;
    let paths = RunPaths {
        feature_dir: args.feature_dir,
        phenotype: args.phenotype,
        score_file: args.score,
        output_dir: args.output,
    };
    let pipeline = CrossGenePipeline::from_config(config)?;
    let outcome = pipeline.run(&paths, &mut ConsoleProgress::new())?;
    if let PipelineOutcome::Completed(summary) = &outcome {
        println!(
            "{} features written to: {}",
            summary.n_features,
            paths.output_dir()?.display()
        );
    }
    Ok(())
}

pub fn apply(args: ApplyArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading classifier from: {}", args.model.display());
    let classifier = PersistedClassifier::load(&args.model)?;
    println!("Classifier expects {} features", classifier.feature_ids.len());

    let (header, genotype) = load_feature_table(&args.features)?;
    classifier.check_header(&header)?;
    println!("Loaded {} subjects from: {}", genotype.nrows(), args.features.display());

    let design = genotype.mapv(f64::from);
    let probability = classifier.predict_proba(design.view())?;
    let labels = classifier.predict(design.view())?;
    write_predictions(&args.output, &probability.to_vec(), &labels.to_vec())?;
    println!("Predictions saved to: {}", args.output.display());
    Ok(())
}
