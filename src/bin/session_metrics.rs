//! session-metrics CLI - Command-line driver for the decision metrics engine
//!
//! Commands:
//! - compute: Score a session input document and export the metrics
//! - validate: Check a session input document without exporting metrics

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use decision_metrics::encoder::MetricsEncoder;
use decision_metrics::pipeline::{parse_input, MetricsProcessor, SessionInput};
use decision_metrics::{AnalyticsError, EngineConfig, ENGINE_VERSION};

/// Score ethical-decision study sessions
#[derive(Parser)]
#[command(name = "session-metrics")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Compute session analytics from a decision event log", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a session and export its metrics
    Compute {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        format: OutputFormat,

        /// Engine configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Exit with failure when data-quality warnings were raised
        #[arg(long)]
        strict: bool,
    },

    /// Validate a session input document
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Single-line JSON document
    Json,
    /// Pretty-printed JSON document
    JsonPretty,
    /// CSV header and one row per session
    Csv,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), MetricsCliError> {
    match cli.command {
        Commands::Compute {
            input,
            output,
            format,
            config,
            strict,
        } => cmd_compute(&input, &output, format, config.as_deref(), strict),

        Commands::Validate { input, json } => cmd_validate(&input, json),
    }
}

fn cmd_compute(
    input: &Path,
    output: &Path,
    format: OutputFormat,
    config: Option<&Path>,
    strict: bool,
) -> Result<(), MetricsCliError> {
    let processor = match config {
        Some(path) => {
            let config = EngineConfig::from_json(&fs::read_to_string(path)?)?;
            MetricsProcessor::with_config(config)?
        }
        None => MetricsProcessor::new(),
    };

    let session = read_input(input)?;
    let analysis = processor.compute_input(&session)?;

    let output_data = match format {
        OutputFormat::Json => MetricsEncoder::compact().encode_to_json(&analysis)?,
        OutputFormat::JsonPretty => MetricsEncoder::new().encode_to_json(&analysis)?,
        OutputFormat::Csv => MetricsEncoder::encode_csv(&analysis.metrics),
    };

    if output.to_string_lossy() == "-" {
        println!("{}", output_data.trim_end());
    } else {
        fs::write(output, output_data)?;
    }

    if strict && analysis.has_warnings() {
        return Err(MetricsCliError::WarningsRaised(analysis.warnings.len()));
    }
    Ok(())
}

fn cmd_validate(input: &Path, json: bool) -> Result<(), MetricsCliError> {
    let session = read_input(input)?;
    let analysis = MetricsProcessor::new().compute_input(&session)?;

    let report = ValidationReport {
        session_id: session.session_id.clone(),
        total_events: session.events.len(),
        finalized_scenarios: analysis.metrics.finalized_scenario_count,
        pending_scenarios: analysis.metrics.pending_scenario_ids.len(),
        warnings: analysis
            .warnings
            .iter()
            .map(|w| serde_json::to_value(w).map_err(MetricsCliError::Json))
            .collect::<Result<_, _>>()?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Session Validation Report");
        println!("=========================");
        println!("Session:   {}", report.session_id);
        println!("Events:    {}", report.total_events);
        println!("Finalized: {}", report.finalized_scenarios);
        println!("Pending:   {}", report.pending_scenarios);
        if report.warnings.is_empty() {
            println!("\nNo data-quality warnings");
        } else {
            println!("\nWarnings:");
            for warning in &report.warnings {
                println!("  [WARN] {}", warning);
            }
        }
    }

    Ok(())
}

fn read_input(input: &Path) -> Result<SessionInput, MetricsCliError> {
    let data = if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            return Err(MetricsCliError::NoInput);
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    if data.trim().is_empty() {
        return Err(MetricsCliError::NoInput);
    }
    Ok(parse_input(&data)?)
}

// Error handling

#[derive(Debug)]
enum MetricsCliError {
    Io(io::Error),
    Engine(AnalyticsError),
    Json(serde_json::Error),
    NoInput,
    WarningsRaised(usize),
}

impl From<io::Error> for MetricsCliError {
    fn from(e: io::Error) -> Self {
        MetricsCliError::Io(e)
    }
}

impl From<AnalyticsError> for MetricsCliError {
    fn from(e: AnalyticsError) -> Self {
        MetricsCliError::Engine(e)
    }
}

impl From<serde_json::Error> for MetricsCliError {
    fn from(e: serde_json::Error) -> Self {
        MetricsCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<MetricsCliError> for CliError {
    fn from(e: MetricsCliError) -> Self {
        match e {
            MetricsCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            MetricsCliError::Engine(e) => {
                let (code, hint) = match e {
                    AnalyticsError::MalformedLog(_) => (
                        "MALFORMED_LOG",
                        "Every event must follow its scenario's presentation",
                    ),
                    AnalyticsError::InvalidRanking(_) => (
                        "INVALID_RANKING",
                        "Rankings list all five values exactly once",
                    ),
                    AnalyticsError::InvalidOutcome(_) => (
                        "INVALID_OUTCOME",
                        "Counts must be >= 0 and percentages within [-100, 100]",
                    ),
                    AnalyticsError::ConfigError(_) => {
                        ("CONFIG_ERROR", "Reference maxima must be positive")
                    }
                    AnalyticsError::ParseError(_) | AnalyticsError::JsonError(_) => {
                        ("PARSE_ERROR", "Ensure input matches the session input schema")
                    }
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            MetricsCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            MetricsCliError::NoInput => CliError {
                code: "NO_INPUT".to_string(),
                message: "No session input provided".to_string(),
                hint: Some("Pass --input <file> or pipe a document on stdin".to_string()),
            },
            MetricsCliError::WarningsRaised(count) => CliError {
                code: "WARNINGS_RAISED".to_string(),
                message: format!("{} data-quality warnings raised", count),
                hint: Some("Run 'session-metrics validate' for details".to_string()),
            },
        }
    }
}

#[derive(serde::Serialize)]
struct ValidationReport {
    session_id: String,
    total_events: usize,
    finalized_scenarios: u32,
    pending_scenarios: usize,
    warnings: Vec<serde_json::Value>,
}
