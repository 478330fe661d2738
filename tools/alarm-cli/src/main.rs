use std::io::{self, BufRead, Stdout};
use std::sync::Arc;
use std::time::Duration;

use alarm::{AlarmRegistry, Outcome, RegistryConfig, RequestIntake, TimerWorker};
use alarm_cli::{parse_line, Command, ConsoleSink, Renderer};
use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Builder, Env};
use log::{debug, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Interactive in-memory alarm scheduler")]
struct Opts {
    /// Length of one delay unit in milliseconds.
    #[arg(
        long = "time-unit-ms",
        default_value_t = 1000,
        value_name = "MS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    time_unit_ms: u64,

    /// Print one JSON object per line instead of text.
    #[arg(long)]
    json: bool,

    #[arg(long = "no-color")]
    no_color: bool,

    /// Log filter, e.g. `debug` or `alarm=trace` (overrides RUST_LOG).
    #[arg(long = "log-level", value_name = "LEVEL")]
    log_level: Option<String>,

    #[arg(long, default_value = "Alarm> ", value_name = "TEXT")]
    prompt: String,
}

fn main() -> Result<()> {
    let opts = Opts::parse();
    init_logging(opts.log_level.as_deref());
    if opts.no_color || opts.json {
        colored::control::set_override(false);
    }

    let config = RegistryConfig::builder()
        .time_unit(Duration::from_millis(opts.time_unit_ms))
        .build();
    let registry = Arc::new(AlarmRegistry::new(config));
    let console = Arc::new(ConsoleSink::new(io::stdout(), Renderer::new(opts.json)));

    let worker = TimerWorker::new(Arc::clone(&registry), console.clone())
        .spawn()
        .context("starting timer thread")?;
    let intake = RequestIntake::new(Arc::clone(&registry), console.clone());

    let result = run_prompt(&opts.prompt, &intake, &console);

    let report = worker.shutdown().context("stopping timer thread")?;
    let stats = registry.stats();
    info!(
        "shutdown: {} fired, {} discarded, {} submitted, {} replaced, {} cancelled",
        report.fired, report.discarded, stats.submitted, stats.replaced, stats.cancelled
    );
    result
}

fn init_logging(filter: Option<&str>) {
    let mut builder = Builder::from_env(Env::default().default_filter_or("warn"));
    if let Some(filter) = filter {
        builder.parse_filters(filter);
    }
    builder.init();
}

/// Reads commands until EOF or `Exit`.
fn run_prompt(prompt: &str, intake: &RequestIntake, console: &ConsoleSink<Stdout>) -> Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        console.prompt(prompt).context("writing prompt")?;
        let Some(line) = lines.next() else {
            return Ok(());
        };
        let line = line.context("reading command")?;

        match parse_line(&line) {
            Ok(None) => continue,
            Ok(Some(Command::Exit)) => return Ok(()),
            Ok(Some(Command::Request(request))) => match intake.handle(request) {
                Ok(Outcome::Listing(pending)) => console.listing(&pending),
                // Everything else is reported through the sink.
                Ok(_) => {}
                Err(err) => eprintln!("Error: {err}"),
            },
            Err(err) => {
                debug!("rejected input {line:?}: {err}");
                eprintln!("Bad command: {err}");
            }
        }
    }
}
