use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use genedocs::app::{self, App, ProgressSink};
use genedocs::config::ConfigLoader;
use genedocs::error::PipelineError;
use genedocs::output::{JsonOutput, OutputMode, TextOutput};

#[derive(Parser)]
#[command(name = "genedocs")]
#[command(about = "Stage gene flat files into identifier-resolved documents")]
#[command(version, author)]
struct Cli {
    /// Config file (default: genedocs.json in the current directory)
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run configured sections and write their output")]
    Stage(StageArgs),
    #[command(about = "Resolve gene ids to stable ids")]
    Resolve(ResolveArgs),
    #[command(about = "Validate the config and list planned sections")]
    Check,
}

#[derive(Args)]
struct StageArgs {
    /// Only run these sections (repeatable)
    #[arg(long = "section")]
    sections: Vec<String>,
}

#[derive(Args)]
struct ResolveArgs {
    #[arg(required = true)]
    ids: Vec<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<PipelineError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PipelineError) -> u8 {
    match error {
        PipelineError::MissingConfig
        | PipelineError::ConfigRead(_)
        | PipelineError::ConfigParse(_)
        | PipelineError::InvalidConfig(_)
        | PipelineError::UnknownAction(_)
        | PipelineError::UnknownSection(_)
        | PipelineError::InvalidChunkSize
        | PipelineError::InputNotFound(_) => 2,
        PipelineError::ElasticHttp(_)
        | PipelineError::ElasticStatus { .. }
        | PipelineError::BulkRejected { .. } => 3,
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
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Stage(args) => {
            let sections = config.select(&args.sections)?;
            let app = App::from_config(&config)?;
            let sink: &dyn ProgressSink = match output_mode {
                OutputMode::Json => &JsonOutput,
                OutputMode::Text => &TextOutput,
            };
            let report = app.stage(&sections, sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_run(&report).into_diagnostic(),
                OutputMode::Text => TextOutput::print_run(&report).into_diagnostic(),
            }
        }
        Commands::Resolve(args) => {
            let app = App::from_config(&config)?;
            let result = app.resolve(&args.ids)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_resolve(&result).into_diagnostic(),
                OutputMode::Text => TextOutput::print_resolve(&result).into_diagnostic(),
            }
        }
        Commands::Check => {
            let result = app::check(&config);
            match output_mode {
                OutputMode::Json => JsonOutput::print_check(&result).into_diagnostic(),
                OutputMode::Text => TextOutput::print_check(&result).into_diagnostic(),
            }
        }
    }
}
