//! depth_capture - capture synchronized depth/color/infrared frames to disk
//!
//! This binary:
//! 1. Loads configuration (JSON file, environment, then command line)
//! 2. Opens the frame source and starts depth, color and both infrared streams
//! 3. Discards warm-up bundles while auto-exposure settles
//! 4. Draws every bundle into a four-quadrant display and writes each frame as
//!    `<kind>-<sequence>_<counter>.png` plus `<StreamName>-metadata.csv`
//! 5. Stops on Ctrl-C or after `--max-bundles`

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use depth_capture::{
    ingest, CaptureConfig, CaptureLoop, DeviceError, ExportMode, ExportSink, Exporter,
    HeadlessDisplay, LinearColorizer,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Capture depth camera frames to PNG + metadata CSV")]
struct Args {
    /// JSON configuration file.
    #[arg(long, env = "DEPTH_CAPTURE_CONFIG")]
    config: Option<PathBuf>,

    /// Frame source URL (e.g. stub://d435).
    #[arg(long)]
    source: Option<String>,

    /// Directory images and metadata files are written to.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Bundles discarded before capture starts.
    #[arg(long)]
    warmup: Option<u32>,

    /// Stop after this many captured bundles (default: run until Ctrl-C).
    #[arg(long)]
    max_bundles: Option<u64>,

    /// Export on background workers instead of the capture thread.
    #[arg(long)]
    pooled: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<DeviceError>() {
                Some(device) => eprintln!("{}", device.describe()),
                None => eprintln!("{:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let mut cfg = CaptureConfig::load_from(args.config.as_deref())?;
    if let Some(source) = args.source {
        cfg.source.url = source;
    }
    if let Some(out) = args.out {
        cfg.export.output_dir = out;
    }
    if let Some(warmup) = args.warmup {
        cfg.warmup_bundles = warmup;
    }
    if args.max_bundles.is_some() {
        cfg.max_bundles = args.max_bundles;
    }
    if args.pooled {
        cfg.export.mode = ExportMode::Pooled;
    }
    cfg.validate()?;

    std::fs::create_dir_all(&cfg.export.output_dir).with_context(|| {
        format!(
            "create output directory {}",
            cfg.export.output_dir.display()
        )
    })?;

    let mut source = ingest::open_source(&cfg.source.url, cfg.source.synthetic.clone())?;
    let mut display =
        HeadlessDisplay::new(cfg.window.width, cfg.window.height).with_limit(cfg.max_bundles);
    let closed = display.close_handle();
    ctrlc::set_handler(move || {
        closed.store(true, Ordering::SeqCst);
    })
    .context("install Ctrl-C handler")?;

    let exporter = Exporter::new(&cfg.export.output_dir).print_saved(true);
    let sink = match cfg.export.mode {
        ExportMode::Inline => ExportSink::inline(exporter),
        ExportMode::Pooled => ExportSink::pooled(exporter, cfg.export.queue_capacity)?,
    };

    log::info!(
        "depth_capture {} reading {} into {}",
        env!("CARGO_PKG_VERSION"),
        source.describe(),
        cfg.export.output_dir.display()
    );
    log::info!(
        "warm-up {} bundles, export mode {:?}, limit {}",
        cfg.warmup_bundles,
        cfg.export.mode,
        cfg.max_bundles
            .map(|n| n.to_string())
            .unwrap_or_else(|| "none (Ctrl-C to stop)".to_string())
    );

    let capture = CaptureLoop::new(
        cfg.capture_settings(),
        Box::new(LinearColorizer::default()),
        sink,
    );
    capture.run(source.as_mut(), &mut display)?;
    Ok(())
}
