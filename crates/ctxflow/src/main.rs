use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use ctxflow::{CheckOptions, OutputFormat, check, render_json, render_text};
use tracing_subscriber::EnvFilter;

/// Findings were reported.
const EXIT_FINDINGS: u8 = 1;
/// Bad usage, configuration or input.
const EXIT_ERROR: u8 = 2;

fn main() -> ExitCode {
    init_logging();
    let args = std::env::args().collect::<Vec<_>>();
    match run(&args) {
        Ok(code) => ExitCode::from(code),
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("CTXFLOW_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run(args: &[String]) -> Result<u8, String> {
    let Command::Check { options, format } = parse_cli(args)?;
    let outcome = check(&options).map_err(|err| err.to_string())?;
    let rendered = match format {
        OutputFormat::Text => render_text(&outcome.diagnostics, &outcome.sources),
        OutputFormat::Json => render_json(&outcome.diagnostics, &outcome.sources).map_err(|err| err.to_string())?,
    };
    std::io::stdout()
        .write_all(rendered.as_bytes())
        .map_err(|err| format!("failed to write report: {err}"))?;
    Ok(if outcome.is_clean() { 0 } else { EXIT_FINDINGS })
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Check {
        options: CheckOptions,
        format: OutputFormat,
    },
}

fn parse_cli(args: &[String]) -> Result<Command, String> {
    if args.len() < 3 || args[1] != "check" {
        return Err(usage());
    }

    let mut options = CheckOptions {
        root: PathBuf::from(&args[2]),
        ..CheckOptions::default()
    };
    let mut format = OutputFormat::Text;
    let mut idx = 3;
    while idx < args.len() {
        match args[idx].as_str() {
            "--config" => {
                let value = args.get(idx + 1).ok_or("missing value for --config")?;
                options.config = Some(PathBuf::from(value));
                idx += 2;
            }
            "--format" => {
                let value = args.get(idx + 1).ok_or("missing value for --format")?;
                format = OutputFormat::parse(value).ok_or_else(|| format!("unknown format `{value}`"))?;
                idx += 2;
            }
            "--strict" => {
                options.strict = true;
                idx += 1;
            }
            "--no-precise" => {
                options.no_precise = true;
                idx += 1;
            }
            "--include-tests" => {
                options.include_tests = true;
                idx += 1;
            }
            unknown => {
                return Err(format!("unknown argument `{unknown}`\n{}", usage()));
            }
        }
    }

    Ok(Command::Check { options, format })
}

fn usage() -> String {
    "usage:\n  ctxflow check <dir> [--config FILE] [--format text|json] [--strict] [--no-precise] [--include-tests]"
        .to_string()
}
