use std::fs;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_sample_reconciler::app::{App, normalize_matrix_file};
use kira_sample_reconciler::config::{ConfigLoader, DisambiguationPolicy, ResolvedConfig};
use kira_sample_reconciler::error::KiraError;
use kira_sample_reconciler::fuzzy::{
    Disambiguator, FirstOption, LabelMatcher, MatchOutcome, PromptDisambiguator, SecondOption,
};
use kira_sample_reconciler::geo::GeoHttpClient;
use kira_sample_reconciler::ncbi::NcbiHttp;
use kira_sample_reconciler::output::{
    JsonOutput, LogSink, OutputMode, TextOutput, write_atomic, write_samples,
};
use kira_sample_reconciler::srr::SraHttpClient;
use kira_sample_reconciler::table::DirTableSource;

#[derive(Parser)]
#[command(name = "kira-sr")]
#[command(about = "Reconcile study samples with GEO and SRA and infer raw read file names")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Join study tables, resolve series and map read files")]
    Reconcile(ReconcileArgs),
    #[command(about = "Normalize a count matrix to a numeric, identifier-indexed table")]
    Normalize(NormalizeArgs),
    #[command(about = "Match a label against candidate labels by longest common substring")]
    Match(MatchArgs),
}

#[derive(Args)]
struct ReconcileArgs {
    #[arg(long)]
    study_dir: Option<Utf8PathBuf>,

    #[arg(long)]
    output: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct NormalizeArgs {
    matrix: Utf8PathBuf,

    #[arg(long)]
    output: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct MatchArgs {
    query: String,

    /// One candidate per line; blank lines are missing labels.
    #[arg(long)]
    candidates: Utf8PathBuf,

    #[arg(long)]
    disambiguation: Option<DisambiguationPolicy>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::MissingTable(_) | KiraError::ConfigRead(_) => 2,
        KiraError::NcbiHttp(_)
        | KiraError::NcbiStatus { .. }
        | KiraError::GeoHttp(_)
        | KiraError::GeoStatus { .. }
        | KiraError::Transient(_) => 3,
        KiraError::NoRepositoryData { .. } | KiraError::UnresolvableIdentifier { .. } => 4,
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
        Commands::Reconcile(args) => run_reconcile(args, config, output_mode),
        Commands::Normalize(args) => run_normalize(args, &config),
        Commands::Match(args) => run_match(args, &config),
    }
}

fn run_reconcile(
    args: ReconcileArgs,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let study_dir = args
        .study_dir
        .or_else(|| config.study_dir.clone())
        .ok_or_else(|| miette::Report::msg("--study-dir is required (or set study_dir in config)"))?;
    let output = args.output.unwrap_or_else(|| config.output.clone());

    let http = NcbiHttp::new()?;
    let app = App::new(
        GeoHttpClient::new(http.clone()),
        SraHttpClient::new(http),
        config,
    );
    let source = DirTableSource::new(study_dir);
    let reconciliation = app.reconcile(&source, &LogSink)?;

    write_atomic(&output, |file| {
        write_samples(reconciliation.table.records(), &mut *file)
    })?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_report(&reconciliation.report).into_diagnostic()?,
        OutputMode::Text => TextOutput::print_report(&reconciliation.report, &output),
    }
    Ok(())
}

fn run_normalize(args: NormalizeArgs, config: &ResolvedConfig) -> miette::Result<()> {
    let (matrix, rule) = normalize_matrix_file(args.matrix.as_std_path(), config)?;
    match args.output {
        Some(output) => {
            write_atomic(&output, |file| matrix.write_tsv(&mut *file))?;
            eprintln!(
                "normalized {} rows x {} samples ({rule:?}) -> {output}",
                matrix.n_rows(),
                matrix.columns.len()
            );
        }
        None => matrix.write_tsv(std::io::stdout().lock())?,
    }
    Ok(())
}

fn run_match(args: MatchArgs, config: &ResolvedConfig) -> miette::Result<()> {
    let text = fs::read_to_string(args.candidates.as_std_path()).into_diagnostic()?;
    let candidates = text
        .lines()
        .map(|line| {
            let line = line.trim();
            (!line.is_empty()).then(|| line.to_string())
        })
        .collect::<Vec<_>>();

    let outcome = match args.disambiguation.unwrap_or(config.disambiguation) {
        DisambiguationPolicy::First => match_with(FirstOption, &args.query, &candidates)?,
        DisambiguationPolicy::Second => match_with(SecondOption, &args.query, &candidates)?,
        DisambiguationPolicy::Prompt => {
            match_with(PromptDisambiguator::stdio(), &args.query, &candidates)?
        }
    };
    match outcome {
        MatchOutcome::Matched(index) => println!("{index}\t{}", candidates[index].as_deref().unwrap_or_default()),
        MatchOutcome::NoMatch => println!("NO_MATCH"),
    }
    Ok(())
}

fn match_with<D: Disambiguator>(
    disambiguator: D,
    query: &str,
    candidates: &[Option<String>],
) -> Result<MatchOutcome, KiraError> {
    LabelMatcher::new(disambiguator).match_label(query, candidates)
}
