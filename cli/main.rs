#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process;

use scenario_ate::scenario::{OutputFormat, ScenarioConfig, load_rows, write_results};
use scenario_ate::{ModelCollection, rank_by_effect, run_scenario, validate_model_data};

#[derive(Clone, Copy, ValueEnum)]
enum FormatCli {
    Tsv,
    Json,
}

impl From<FormatCli> for OutputFormat {
    fn from(format: FormatCli) -> Self {
        match format {
            FormatCli::Tsv => OutputFormat::Tsv,
            FormatCli::Json => OutputFormat::Json,
        }
    }
}

#[derive(Args)]
struct ComputeArgs {
    /// JSON file mapping activity ids to fitted ordered models
    #[arg(long)]
    models: PathBuf,

    /// Survey rows (.csv, .tsv, or .json array of objects)
    #[arg(long)]
    rows: PathBuf,

    /// Scenario TOML naming the treatment contrast and per-activity rules
    #[arg(long)]
    scenario: PathBuf,

    /// Output path; results go to stdout when omitted
    #[arg(long)]
    out: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = FormatCli::Tsv)]
    format: FormatCli,

    /// Order activities by largest absolute effect instead of file order
    #[arg(long)]
    rank: bool,
}

#[derive(Parser)]
#[command(
    name = "scenario-ate",
    about = "Average treatment effects of a hypothetical exposure on ordered survey outcomes",
    long_about = "Applies pre-fitted ordered logit/probit models to survey respondents and \
                 reports how the predicted outcome distribution of each activity shifts when \
                 one covariate moves from a control to a treatment value."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Check a model collection for structural defects")]
    Validate {
        #[arg(long)]
        models: PathBuf,
    },
    #[command(about = "Compute per-activity effects (outputs: TSV or JSON table)")]
    Compute(ComputeArgs),
    #[command(about = "Display version information")]
    Version,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Validate { models }) => validate(models),
        Some(Commands::Compute(args)) => compute(args),
        Some(Commands::Version) => {
            println!("scenario-ate {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => {
            Cli::command().print_help().expect("print help");
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn validate(models: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let collection = ModelCollection::load(&models)?;
    if validate_model_data(&collection) {
        println!(
            "{}: {} activities, all structurally valid",
            models.display(),
            collection.len()
        );
        Ok(())
    } else {
        Err(format!("{} failed validation; see warnings above", models.display()).into())
    }
}

fn compute(args: ComputeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = ScenarioConfig::load(&args.scenario)?;
    let models = config.apply_rules(ModelCollection::load(&args.models)?);
    let rows = load_rows(&args.rows, &config.load_options())?;

    let results = run_scenario(
        &models,
        &rows,
        &config.treatment_contrast(),
        &config.engine_options(),
    )?;
    let results = if args.rank {
        rank_by_effect(&results)
    } else {
        results
    };

    write_results(&results, args.out.as_deref(), args.format.into())?;
    Ok(())
}
