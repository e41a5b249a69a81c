//! Train a sequence model on an index CSV and forecast the next trading days
//!
//! Usage:
//! ```
//! cargo run --release --bin forecast -- --data data/index.csv --horizon 20
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use index_forecast::baseline::ArimaOrder;
use index_forecast::config::PipelineConfig;
use index_forecast::data::{load_table, save_forecast};
use index_forecast::model::{ModelKind, ProgressObserver};
use index_forecast::pipeline::{compare_runs, run_baseline, run_sequence};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "LSTM/GRU index forecasting with an ARIMA baseline")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "configs/default.toml")]
    config: PathBuf,

    /// Input CSV with a Date column (overrides config)
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Trading days to forecast (overrides config)
    #[arg(short = 'H', long)]
    horizon: Option<usize>,

    /// LSTM or GRU (overrides config)
    #[arg(short, long)]
    model: Option<ModelKind>,

    /// Number of epochs (overrides config)
    #[arg(short, long)]
    epochs: Option<usize>,

    /// Fixed ARIMA order as p,d,q instead of the AIC search
    #[arg(long, value_parser = parse_order)]
    order: Option<ArimaOrder>,

    /// Skip the ARIMA baseline
    #[arg(long)]
    no_baseline: bool,

    /// Write the dated forecast to this CSV
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write a default configuration to --config and exit
    #[arg(long)]
    init_config: bool,
}

fn parse_order(s: &str) -> std::result::Result<ArimaOrder, String> {
    let parts: Vec<usize> = s
        .split(',')
        .map(|p| p.trim().parse::<usize>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| format!("invalid order '{}': {}", s, e))?;
    match parts.as_slice() {
        [p, d, q] => Ok(ArimaOrder::new(*p, *d, *q)),
        _ => Err(format!("order must be p,d,q, got '{}'", s)),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();
    if args.init_config {
        PipelineConfig::create_default(&args.config)
            .with_context(|| format!("Failed to write {}", args.config.display()))?;
        println!("{} {}", "Wrote:".green(), args.config.display());
        return Ok(());
    }

    let mut config = PipelineConfig::load_or_default(&args.config);
    if let Some(data) = &args.data {
        config.data.path = data.display().to_string();
    }
    if let Some(horizon) = args.horizon {
        config.forecast.horizon = horizon;
    }
    if let Some(kind) = args.model {
        config.model.model_type = kind.to_string();
    }
    if let Some(epochs) = args.epochs {
        config.model.epochs = epochs;
    }
    if args.order.is_some() {
        config.baseline.order = args.order;
    }
    if args.no_baseline {
        config.baseline.enabled = false;
    }
    if let Some(output) = &args.output {
        config.forecast.output = Some(output.display().to_string());
    }
    config.validate().context("Invalid configuration")?;

    println!("{}", "=".repeat(60).blue());
    println!("{}", "Index Forecast".bold().blue());
    println!("{}", "=".repeat(60).blue());

    let table = load_table(&config.data.path)
        .with_context(|| format!("Failed to load {}", config.data.path))?;
    println!(
        "\n{} {} rows from {}",
        "Loaded:".green(),
        table.len(),
        config.data.path
    );
    println!("{}\n", config.model.summary());

    let mut progress = ProgressObserver::new(config.model.epochs);
    let run = run_sequence(&table, &config, &mut [&mut progress])
        .context("Sequence model run failed")?;

    println!(
        "\n{} {} epochs, best epoch {} (loss {:.6}){}",
        "Trained:".green(),
        run.history.epochs_run(),
        run.history.best_epoch,
        run.history.best_loss,
        if run.history.stopped_early {
            ", stopped early"
        } else {
            ""
        }
    );
    match &run.evaluation {
        Some(evaluation) => println!("{} {}", "Test:".cyan(), evaluation.metrics),
        None => println!("{}", "Test: no test windows".yellow()),
    }

    println!("\n{}", "Forecast:".bold());
    println!("{:<12} {:>14}", "Date", format!("Predicted {}", config.model.target_column));
    for point in &run.dated {
        println!("{:<12} {:>14.4}", point.date.to_string(), point.value);
    }

    if let Some(output) = &config.forecast.output {
        let rows: Vec<_> = run.dated.iter().map(|p| (p.date, p.value)).collect();
        save_forecast(output, &config.model.target_column, &rows)
            .with_context(|| format!("Failed to write {}", output))?;
        println!("\n{} {}", "Saved:".green(), output);
    }

    if config.baseline.enabled {
        println!("\n{}", "ARIMA baseline".bold().blue());
        let baseline = run_baseline(&table, &config).context("Baseline run failed")?;

        if let Some(report) = &baseline.stationarity {
            println!("{}", report);
        }
        match (&baseline.model, &baseline.metrics) {
            (Some(model), Some(metrics)) => {
                println!("{}", model.summary());
                println!("{} {}", "Test:".cyan(), metrics);
            }
            (Some(model), None) => println!("{}", model.summary()),
            _ => println!("{}", "No ARIMA model could be fitted".yellow()),
        }

        if let Some(comparison) = compare_runs(&run, &baseline) {
            println!("\n{}", "Comparison".bold());
            print!("{}", comparison);
            let (a, b) = comparison.tally();
            // Ties go to the baseline
            let label = if a > b {
                &comparison.label_a
            } else {
                &comparison.label_b
            };
            println!("{} {} ({} of 4 metrics)", "Better overall:".green(), label, a.max(b));
        }
    }

    Ok(())
}
