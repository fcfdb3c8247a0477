mod logic;
mod util;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use logic::{Scenario, ScenarioResult, ScenarioRunner, TesterAssets, list_scenarios};
use util::split_csv;

#[derive(Debug, Parser)]
#[command(name = "stance-tester", version)]
#[command(about = "Automated QA for the Stance serving core: selection, stance cards and votes")]
struct Args {
    /// Take corpus JSON (defaults to the shipped sample corpus)
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// Engine config JSON (defaults to the shipped engine.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Scenarios to run (comma-separated, or "all")
    #[arg(long, default_value = "all")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Number of iterations per scenario
    #[arg(long, default_value_t = 10)]
    iterations: usize,

    /// Concurrent readers in the stampede scenario
    #[arg(long, default_value_t = 64)]
    concurrency: usize,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console"])]
    report: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }

    announce_banner();

    let start_time = Instant::now();
    let scenarios = expand_scenarios(&args.scenarios);
    let assets = TesterAssets::load(args.corpus.as_deref(), args.config.as_deref())?;
    log::debug!(
        "loaded {} takes, cache ttl {:?}, store timeout {:?}",
        assets.corpus.len(),
        assets.config.cache_ttl(),
        assets.config.store_timeout()
    );
    let runner = ScenarioRunner::new(Arc::new(assets), args.concurrency, args.verbose);

    let mut results = Vec::new();
    for scenario in scenarios {
        results.push(runner.run_scenario(scenario, args.iterations).await);
    }

    write_reports(&args, &results, start_time)?;

    if results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }

    Ok(())
}

fn maybe_list_scenarios(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available scenarios:")?;
    for (key, description) in list_scenarios() {
        writeln!(output_target.writer(), "  {key:16} - {description}")?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "🗳️  Stance Automated Tester".bright_cyan().bold());
    println!("{}", "===========================".cyan());
}

fn expand_scenarios(scenarios_arg: &str) -> Vec<Scenario> {
    let mut scenarios = Vec::new();
    for name in split_csv(scenarios_arg) {
        let expanded = if name == "all" {
            Scenario::ALL.to_vec()
        } else {
            match name.parse::<Scenario>() {
                Ok(scenario) => vec![scenario],
                Err(err) => {
                    eprintln!("⚠️  {}", err.to_string().yellow());
                    continue;
                }
            }
        };
        for scenario in expanded {
            if !scenarios.contains(&scenario) {
                scenarios.push(scenario);
            }
        }
    }
    scenarios
}

fn write_reports(args: &Args, results: &[ScenarioResult], start_time: Instant) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report.as_str() {
        "json" => logic::reports::generate_json_report(&mut output_target, results)?,
        "markdown" => {
            if results.is_empty() {
                writeln!(
                    &mut output_target,
                    "# Stance Scenario Results\n\n_No scenarios executed._"
                )?;
            } else {
                logic::reports::generate_markdown_report(&mut output_target, results)?;
            }
        }
        _ => {
            if results.is_empty() {
                writeln!(&mut output_target, "No scenarios executed.")?;
            } else {
                logic::reports::generate_console_report(
                    &mut output_target,
                    results,
                    start_time.elapsed(),
                )?;
            }
        }
    }

    if args.report != "json" {
        let duration = start_time.elapsed();
        writeln!(&mut output_target)?;
        writeln!(&mut output_target, "🏁 Total time: {duration:?}")?;
    }
    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}
