mod capture;
mod clock;
mod config;
mod error;
mod lifecycle;
mod naming;
mod output;
mod retry;
mod runner;
mod signal;

use anyhow::{Context, Result};
use capture::{
    BrowserDriver, FfmpegDecoder, ManagedSource, PageOptions, Source, StreamDriver, YtDlpResolver,
};
use clap::Parser;
use clock::SystemClock;
use config::{Args, OutputSpec, Settings, SourceSpec};
use naming::SourceKind;
use output::{LocalSink, Output, RemoteSink, S3Store};
use signal::StopFlag;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over --debug when set
    let log_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let file_layer = match &args.log_file {
        Some(path) => {
            let file = open_log_file(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    tracing::info!("camsnap starting");

    let settings = Settings::load(&args).context("Invalid configuration")?;
    if let Some(path) = &settings.config_file {
        tracing::info!("Config: {}", path.display());
    }
    tracing::info!("Interval: {:.1}s", settings.run.interval.as_secs_f64());
    match settings.run.budget {
        Some(budget) => tracing::info!("Max runtime: {}s", budget.as_secs()),
        None => tracing::info!("Max runtime: unbounded"),
    }

    let stop = StopFlag::new();
    stop.install_handler()
        .context("Failed to install interrupt handler")?;

    // Initialize output first so an unreachable destination fails before any
    // browser is started
    let mut output = build_output(&settings).context("Failed to initialize output")?;

    let mut sources = build_sources(&settings).context("Failed to initialize sources")?;
    runner::prepare(&mut sources, &SystemClock).context("Failed to start capture sources")?;

    tracing::info!("Press Ctrl+C to stop");
    let report = runner::run(&mut sources, &mut output, &SystemClock, &stop, &settings.run);

    if report.delivered == 0 && report.failed_slots > 0 {
        tracing::warn!("No snapshot was delivered");
    }

    Ok(())
}

/// Open `path` for appending, creating it and its directory if needed.
fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn build_output(settings: &Settings) -> Result<Output> {
    match &settings.output {
        OutputSpec::Local { dir } => {
            let sink = LocalSink::new(dir)
                .with_context(|| format!("Cannot use output directory {}", dir.display()))?;
            Ok(Output::Local(sink))
        }
        OutputSpec::S3 {
            bucket,
            prefix,
            region,
        } => {
            tracing::info!("Uploading to S3 bucket {} in {}", bucket, region);
            let store = S3Store::connect(bucket.as_str(), region.as_str())?;
            let sink = RemoteSink::new(store, prefix.clone(), settings.run.retry, SystemClock)
                .with_context(|| format!("S3 bucket {bucket} is not usable"))?;
            Ok(Output::Remote(sink))
        }
    }
}

fn build_sources(settings: &Settings) -> Result<Vec<Source>> {
    let partitions = settings.partitions();
    let mut sources = Vec::with_capacity(settings.sources.len());

    for (spec, partition) in settings.sources.iter().zip(partitions) {
        let label = spec.label().to_string();
        tracing::info!(
            "Source: {} -> {}",
            label,
            partition.as_deref().unwrap_or("(no partition)")
        );

        let source = match spec {
            SourceSpec::Webcam { url, zoom } => {
                let options = PageOptions {
                    zoom: *zoom,
                    ..settings.page.clone()
                };
                Source::Page(ManagedSource::new(
                    label,
                    SourceKind::Webcam,
                    partition,
                    BrowserDriver::new(url.as_str(), options),
                    settings.page_policy,
                ))
            }
            SourceSpec::Stream(target) => {
                let resolver = YtDlpResolver::new(
                    settings.yt_dlp.as_str(),
                    settings.youtube_api_key.clone(),
                    settings.stream_timeout,
                )?;
                let decoder = FfmpegDecoder::new(settings.stream_timeout)?;
                Source::Stream(ManagedSource::new(
                    label,
                    SourceKind::YouTube,
                    partition,
                    StreamDriver::new(target.clone(), resolver, decoder, settings.format_fallback),
                    settings.stream_policy,
                ))
            }
        };
        sources.push(source);
    }

    Ok(sources)
}
