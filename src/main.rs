use std::{path::PathBuf, sync::mpsc, thread};

use anyhow::anyhow;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use quarterly_consolidator::{Enrichment, Pipeline, PipelineConfig, ProgressObserver, Result};

#[derive(Parser)]
#[command(name = "quarterly_consolidator")]
#[command(about = "Consolidates quarterly shopping mall indicators into one workbook")]
#[command(version = "0.1.0")]
struct Cli {
    /// TOML file overriding the built-in configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the company workbooks
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Directory for treated workbooks, inflation files and the report
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Directory the finished report is copied to
    #[arg(long)]
    delivery_dir: Option<PathBuf>,

    /// Skip fetching index series and use cached inflation files
    #[arg(long)]
    offline: bool,

    /// Do not write the chart workbook and image
    #[arg(long)]
    no_chart: bool,
}

enum ProgressEvent {
    Progress(u8),
    Status(String),
}

/// Forwards checkpoints from the worker thread to the main thread.
struct ChannelObserver(mpsc::Sender<ProgressEvent>);

impl ProgressObserver for ChannelObserver {
    fn on_progress(&self, percent: u8) {
        let _ = self.0.send(ProgressEvent::Progress(percent));
    }

    fn on_status(&self, message: &str) {
        let _ = self.0.send(ProgressEvent::Status(message.to_string()));
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("quarterly_consolidator=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = cli.input_dir {
        config.paths.input_dir = dir;
    }
    if let Some(dir) = cli.output_dir {
        config.paths.output_dir = dir;
    }
    if let Some(dir) = cli.delivery_dir {
        config.paths.delivery_dir = dir;
    }
    if cli.offline {
        config.fetch_inflation = false;
    }

    let mut pipeline = Pipeline::new(config);
    if cli.no_chart {
        pipeline = pipeline.without_charts();
    }

    let (tx, rx) = mpsc::channel();
    let worker = thread::spawn(move || pipeline.run(&ChannelObserver(tx)));
    for event in rx {
        match event {
            ProgressEvent::Progress(percent) => println!("[{percent:>3}%]"),
            ProgressEvent::Status(message) => println!("{message}"),
        }
    }
    let summary = worker
        .join()
        .map_err(|_| anyhow!("processing thread panicked"))??;

    println!("Report: {}", summary.report.display());
    if let Enrichment::Skipped(reason) = &summary.enrichment {
        println!("Without inflation-discounted metrics: {reason}");
    }
    for chart in &summary.charts {
        println!("Charts: {}", chart.display());
    }
    match (&summary.delivered, &summary.delivery_error) {
        (Some(copy), _) => println!("Copied to {}", copy.display()),
        (None, Some(e)) => println!("Not copied: {e}"),
        (None, None) => {}
    }

    Ok(())
}
