//! Command-line driver for a reservoir.
//!
//! Examples:
//!   reservoir-cli config > res.json
//!   reservoir-cli run res.json --seed 7 --stats < inputs.txt
//!   reservoir-cli demo --cycles 500
//!
//! `run` reads one input vector per stdin line (comma or whitespace
//! separated; `inputs | feedback` when the config has a feedback injector)
//! and writes one JSON array per cycle to stdout. Logs go to stderr, filtered
//! by `RUST_LOG` directives such as `reservoir=debug` (default `info`).

use std::fs;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use reservoir::prelude::*;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("line {line}: {message}")]
    Input { line: usize, message: String },
}

#[derive(Debug, PartialEq)]
enum Command {
    Run {
        config: PathBuf,
        seed: u64,
        stats: bool,
    },
    Demo {
        cycles: usize,
    },
    Config,
}

const DEFAULT_SEED: u64 = 42;
const DEFAULT_DEMO_CYCLES: usize = 200;

fn usage() -> ! {
    eprintln!("Usage: reservoir-cli <command> [args]\n");
    eprintln!("Commands:");
    eprintln!("  run <config.json> [--seed N] [--stats]   Drive a reservoir from stdin");
    eprintln!("  demo [--cycles N]                        Drive a default reservoir with a sinusoid");
    eprintln!("  config                                   Print the default configuration");
    process::exit(2);
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> Result<T, CliError> {
    let value = value.ok_or_else(|| CliError::Usage(format!("{flag} needs a value")))?;
    value
        .parse()
        .map_err(|_| CliError::Usage(format!("{flag}: not a number: {value}")))
}

fn parse_args(args: &[String]) -> Result<Command, CliError> {
    let Some(cmd) = args.first() else {
        return Err(CliError::Usage("missing command".into()));
    };
    let rest = &args[1..];
    match cmd.as_str() {
        "run" => {
            let mut config = None;
            let mut seed = DEFAULT_SEED;
            let mut stats = false;
            let mut i = 0;
            while i < rest.len() {
                match rest[i].as_str() {
                    "--seed" => {
                        seed = parse_number("--seed", rest.get(i + 1))?;
                        i += 1;
                    }
                    "--stats" => stats = true,
                    flag if flag.starts_with("--") => {
                        return Err(CliError::Usage(format!("unknown flag {flag}")));
                    }
                    path => config = Some(PathBuf::from(path)),
                }
                i += 1;
            }
            let config = config.ok_or_else(|| CliError::Usage("run needs a config file".into()))?;
            Ok(Command::Run {
                config,
                seed,
                stats,
            })
        }
        "demo" => {
            let mut cycles = DEFAULT_DEMO_CYCLES;
            let mut i = 0;
            while i < rest.len() {
                match rest[i].as_str() {
                    "--cycles" => {
                        cycles = parse_number("--cycles", rest.get(i + 1))?;
                        i += 1;
                    }
                    other => return Err(CliError::Usage(format!("unexpected argument {other}"))),
                }
                i += 1;
            }
            Ok(Command::Demo { cycles })
        }
        "config" => Ok(Command::Config),
        other => Err(CliError::Usage(format!("unknown command {other}"))),
    }
}

fn parse_values(text: &str, line: usize) -> Result<Vec<f64>, CliError> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>().map_err(|_| CliError::Input {
                line,
                message: format!("not a number: {s}"),
            })
        })
        .collect()
}

/// Splits an input line into the input vector and optional feedback values.
fn parse_line(text: &str, line: usize) -> Result<(Vec<f64>, Option<Vec<f64>>), CliError> {
    match text.split_once('|') {
        Some((inputs, feedback)) => Ok((
            parse_values(inputs, line)?,
            Some(parse_values(feedback, line)?),
        )),
        None => Ok((parse_values(text, line)?, None)),
    }
}

fn check_len(found: usize, expected: usize, what: &str, line: usize) -> Result<(), CliError> {
    if found == expected {
        Ok(())
    } else {
        Err(CliError::Input {
            line,
            message: format!("expected {expected} {what} values, found {found}"),
        })
    }
}

fn log_stats(res: &Reservoir) {
    let s = res.stats();
    info!(
        cycles = s.cycles,
        connections = s.connection_count,
        state_min = s.states.min,
        state_max = s.states.max,
        state_rms = s.states.rms(),
        signal_mean = s.analog_signals.mean(),
        firing_rate = s.firing_rate,
        context_rms = s.context_state_rms.unwrap_or(f64::NAN),
        "reservoir statistics"
    );
}

fn run(config: PathBuf, seed: u64, stats: bool) -> Result<(), CliError> {
    let text = fs::read_to_string(&config)?;
    let cfg: ReservoirConfig = serde_json::from_str(&text)?;
    let input_count = cfg.input.input_count;
    let feedback_count = cfg.feedback.map(|f| f.output_count);
    let mut res = Reservoir::with_seed(cfg, seed)?;
    info!(
        config = %config.display(),
        seed,
        neurons = res.neuron_count(),
        output_len = res.output_len(),
        "reservoir ready"
    );

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut buf = vec![0.0; res.output_len()];

    for (idx, line) in stdin.lock().lines().enumerate() {
        let line_no = idx + 1;
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (inputs, feedback) = parse_line(trimmed, line_no)?;
        check_len(inputs.len(), input_count, "input", line_no)?;
        match (feedback, feedback_count) {
            (Some(values), Some(expected)) => {
                check_len(values.len(), expected, "feedback", line_no)?;
                res.set_feedback(&values);
            }
            (Some(_), None) => warn!(line = line_no, "feedback given but not configured"),
            (None, _) => {}
        }

        res.compute(&inputs, &mut buf, stats);
        serde_json::to_writer(&mut out, &buf)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    if stats {
        log_stats(&res);
    }
    Ok(())
}

fn demo(cycles: usize) -> Result<(), CliError> {
    let cfg = ReservoirConfig::default().with_predictors(PredictorSettings::all());
    let mut res = Reservoir::with_seed(cfg, DEFAULT_SEED)?;
    res.set_execution_tier(ExecutionTier::Parallel);
    info!(
        cycles,
        neurons = res.neuron_count(),
        tier = ?res.effective_execution_tier(),
        "demo start"
    );

    let mut buf = vec![0.0; res.output_len()];
    for t in 0..cycles {
        let x = (t as f64 * 0.2).sin();
        res.compute(&[x], &mut buf, true);
    }
    log_stats(&res);
    info!(predictor_len = res.predictor_len(), "demo done");
    Ok(())
}

fn print_default_config() -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(&ReservoirConfig::default())?;
    println!("{json}");
    Ok(())
}

/// Filter from `RUST_LOG`-style directives; `info` when unset or unparsable.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn init_logging() {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(directives.as_deref()))
        .with_writer(io::stderr)
        .init();
}

fn main() {
    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            usage();
        }
    };

    let result = match command {
        Command::Run {
            config,
            seed,
            stats,
        } => run(config, seed, stats),
        Command::Demo { cycles } => demo(cycles),
        Command::Config => print_default_config(),
    };

    if let Err(e) = result {
        error!("{e}");
        process::exit(1);
    }
}
