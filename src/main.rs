//! drugrisk: Per-symptom adverse-event risk prediction
//!
//! Command-line entry point.
//!
//! ```text
//! drugrisk predict <patient.json|->   Score a patient record, print the result as JSON
//! drugrisk check                      Load reference data and models, report what is served
//! drugrisk ping                       Liveness probe
//! ```

use std::io::Read;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use drugrisk::adapters::sanitize::SanitizingMakeWriter;
use drugrisk::{DrugRiskError, PatientRecord, PredictionService, RiskContext, ServiceConfig};

const USAGE: &str = "Usage: drugrisk <predict <patient.json|->|check|ping>";

/// Exit status for rejected patient records.
const EXIT_INVALID_INPUT: u8 = 2;

enum Command {
    Predict(String),
    Check,
    Ping,
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["predict", input] => Ok(Command::Predict((*input).to_string())),
        ["check"] => Ok(Command::Check),
        ["ping"] => Ok(Command::Ping),
        _ => bail!(USAGE),
    }
}

fn read_patient(input: &str) -> Result<PatientRecord> {
    let bytes = if input == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read patient record from stdin")?;
        buf
    } else {
        std::fs::read(input).with_context(|| format!("Failed to read {input:?}"))?
    };
    serde_json::from_slice(&bytes).context("Malformed patient record")
}

fn load_service() -> Result<PredictionService> {
    let config = ServiceConfig::from_env_or_default();
    let context = RiskContext::load(config).context("Failed to load risk context")?;
    Ok(PredictionService::new(Arc::new(context)))
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Ping => {
            println!("{}", serde_json::json!({ "ping": "pong" }));
        }
        Command::Check => {
            let service = load_service()?;
            let context = service.context();
            for drug in context.knowledge.drugs() {
                println!(
                    "{}: {} symptom(s), {} co-drug feature(s)",
                    drug.name,
                    drug.symptoms.len(),
                    drug.co_drugs.len()
                );
            }
            println!("{} model(s) loaded", context.predictor.len());
        }
        Command::Predict(input) => {
            let patient = read_patient(&input)?;
            let service = load_service()?;
            let result = service.run(&patient)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }
    Ok(())
}

fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    // Logs never go to stdout by default; stdout carries the JSON result.
    let log_mode = std::env::var("DRUGRISK_LOG_MODE").unwrap_or_else(|_| "stderr".to_string());

    let (writer, guard) = match log_mode.as_str() {
        "file" => {
            let log_file = std::env::var("DRUGRISK_LOG_FILE")
                .unwrap_or_else(|_| "data/drugrisk.log".to_string());

            if let Some(parent) = std::path::Path::new(&log_file).parent() {
                // Best-effort: don't fail startup just because the directory is missing.
                let _ = std::fs::create_dir_all(parent);
            }

            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)
                .with_context(|| format!("Failed to open log file {log_file:?}"))?;
            tracing_appender::non_blocking(file)
        }
        "stdout" => tracing_appender::non_blocking(std::io::stdout()),
        _ => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(SanitizingMakeWriter::new(writer)),
        )
        .init();

    Ok(guard)
}

fn main() -> ExitCode {
    let _guard = match init_logging() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let command = match parse_args() {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(EXIT_INVALID_INPUT);
        }
    };

    match run(command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            let invalid_input = e
                .downcast_ref::<DrugRiskError>()
                .is_some_and(DrugRiskError::is_client_error)
                || e.downcast_ref::<serde_json::Error>().is_some();
            if invalid_input {
                ExitCode::from(EXIT_INVALID_INPUT)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
