use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use guideline_stager::config::{ConfigLoader, ResolvedConfig};
use guideline_stager::error::StagerError;
use guideline_stager::input::read_identifiers;
use guideline_stager::ledger::Ledger;
use guideline_stager::oa::OaHttpClient;
use guideline_stager::output::{JsonOutput, OutputMode, TextOutput};
use guideline_stager::pipeline::{App, Overwrite, ProgressSink, RunOptions};
use guideline_stager::store::Store;

#[derive(Parser)]
#[command(name = "guideline-stager")]
#[command(about = "Fetch and unpack PubMed Central open-access packages for a list of identifiers")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Resolve, download and extract every identifier in the input table")]
    Fetch(FetchArgs),
    #[command(about = "Summarize the ledger of the last run")]
    Status(StatusArgs),
}

#[derive(Args)]
struct FetchArgs {
    #[arg(long, short)]
    input: PathBuf,

    #[arg(long)]
    output_dir: Option<Utf8PathBuf>,

    #[arg(long)]
    id_column: Option<String>,

    #[arg(long)]
    delay_ms: Option<u64>,

    #[arg(long, conflicts_with = "retry_failed")]
    overwrite: bool,

    #[arg(long)]
    retry_failed: bool,
}

#[derive(Args)]
struct StatusArgs {
    #[arg(long)]
    output_dir: Option<Utf8PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<StagerError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &StagerError) -> u8 {
    match error {
        StagerError::ConfigRead(_)
        | StagerError::ConfigParse(_)
        | StagerError::InputRead(_)
        | StagerError::InputParse(_)
        | StagerError::MissingIdColumn(_)
        | StagerError::LedgerNotFound(_) => 2,
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
        Commands::Fetch(args) => run_fetch(args, config, output_mode),
        Commands::Status(args) => run_status(args, config, output_mode),
    }
}

fn run_fetch(
    args: FetchArgs,
    mut config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let FetchArgs {
        input,
        output_dir,
        id_column,
        delay_ms,
        overwrite,
        retry_failed,
    } = args;

    if let Some(output_dir) = output_dir {
        config.output_dir = output_dir;
    }
    if let Some(id_column) = id_column {
        config.id_column = id_column;
    }
    if let Some(delay_ms) = delay_ms {
        config.delay = Duration::from_millis(delay_ms);
    }

    let store = Store::new(config.output_dir.clone());
    let raw_ids = read_identifiers(&input, &config.id_column)?;
    tracing::info!(count = raw_ids.len(), input = %input.display(), "read identifiers");

    let overwrite = if overwrite {
        Overwrite::All
    } else if retry_failed {
        let previous = Ledger::load(&store.ledger_path())?;
        Overwrite::failed_in(&previous)
    } else {
        Overwrite::None
    };
    let options = RunOptions {
        overwrite,
        delay: config.delay,
    };

    let client = OaHttpClient::new(&config.http)?;
    let app = App::new(store, client);

    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Text => &TextOutput,
    };
    let result = app.run(&raw_ids, &options, sink)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_run(&result).into_diagnostic(),
        OutputMode::Text => TextOutput::print_run(&result).into_diagnostic(),
    }
}

fn run_status(
    args: StatusArgs,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let store = Store::new(args.output_dir.unwrap_or(config.output_dir));
    let report = Ledger::report(&store.ledger_path())?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_report(&report).into_diagnostic(),
        OutputMode::Text => TextOutput::print_report(&report).into_diagnostic(),
    }
}
