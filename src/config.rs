use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::{CaptureSettings, DEFAULT_FRAME_TIMEOUT, DEFAULT_WARMUP_BUNDLES};
use crate::frame::{PixelFormat, StreamKind};
use crate::ingest::{StreamRequest, SyntheticConfig};

const DEFAULT_SOURCE_URL: &str = "stub://depth_camera";
const DEFAULT_OUTPUT_DIR: &str = ".";
const DEFAULT_COLOR_WIDTH: u32 = 1280;
const DEFAULT_COLOR_HEIGHT: u32 = 720;
const DEFAULT_WINDOW_WIDTH: u32 = 1280;
const DEFAULT_WINDOW_HEIGHT: u32 = 720;
const DEFAULT_QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    source: Option<SourceConfigFile>,
    streams: Option<StreamsConfigFile>,
    capture: Option<LoopConfigFile>,
    export: Option<ExportConfigFile>,
    display: Option<DisplayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    timeout_ms: Option<u64>,
    row_padding: Option<usize>,
    realtime: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamsConfigFile {
    color: Option<StreamConfigFile>,
    depth: Option<StreamConfigFile>,
    infrared: Option<StreamConfigFile>,
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
struct StreamConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    format: Option<PixelFormat>,
    fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct LoopConfigFile {
    warmup_bundles: Option<u32>,
    max_bundles: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ExportConfigFile {
    output_dir: Option<PathBuf>,
    mode: Option<ExportMode>,
    queue_capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    width: Option<u32>,
    height: Option<u32>,
}

/// How frames are handed to the exporter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    /// Export on the capture thread.
    #[default]
    Inline,
    /// Export on background workers, one per stream.
    Pooled,
}

impl std::str::FromStr for ExportMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(ExportMode::Inline),
            "pooled" => Ok(ExportMode::Pooled),
            other => Err(anyhow!(
                "unknown export mode '{}'; expected inline or pooled",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub source: SourceSettings,
    pub streams: Vec<StreamRequest>,
    pub warmup_bundles: u32,
    /// Close the display after this many streamed bundles.
    pub max_bundles: Option<u64>,
    pub export: ExportSettings,
    pub window: WindowSettings,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub timeout: Duration,
    pub synthetic: SyntheticConfig,
}

#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub output_dir: PathBuf,
    pub mode: ExportMode,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct WindowSettings {
    pub width: u32,
    pub height: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        // Infallible: the empty file carries no values to reject.
        Self::from_file(CaptureConfigFile::default())
    }
}

impl CaptureConfig {
    /// Load from `DEPTH_CAPTURE_CONFIG` (JSON, optional), then apply
    /// `DEPTH_CAPTURE_*` environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DEPTH_CAPTURE_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Same as `load`, with an explicit config file path.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CaptureConfigFile) -> Self {
        let source = file.source.unwrap_or_default();
        let streams = file.streams.unwrap_or_default();
        let capture = file.capture.unwrap_or_default();
        let export = file.export.unwrap_or_default();
        let display = file.display.unwrap_or_default();

        let color = streams.color.unwrap_or_default();
        let color = StreamRequest {
            width: color.width.or(Some(DEFAULT_COLOR_WIDTH)),
            height: color.height.or(Some(DEFAULT_COLOR_HEIGHT)),
            format: color.format.or(Some(PixelFormat::Rgb8)),
            fps: color.fps,
            ..StreamRequest::new(StreamKind::Color)
        };
        let depth = stream_request(StreamRequest::new(StreamKind::Depth), streams.depth);
        let infrared = streams.infrared;

        Self {
            source: SourceSettings {
                url: source.url.unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
                timeout: source
                    .timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_FRAME_TIMEOUT),
                synthetic: SyntheticConfig {
                    row_padding: source.row_padding.unwrap_or(0),
                    realtime: source.realtime.unwrap_or(true),
                },
            },
            streams: vec![
                color,
                depth,
                stream_request(StreamRequest::infrared(0), infrared),
                stream_request(StreamRequest::infrared(1), infrared),
            ],
            warmup_bundles: capture.warmup_bundles.unwrap_or(DEFAULT_WARMUP_BUNDLES),
            max_bundles: capture.max_bundles,
            export: ExportSettings {
                output_dir: export
                    .output_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
                mode: export.mode.unwrap_or_default(),
                queue_capacity: export.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
            },
            window: WindowSettings {
                width: display.width.unwrap_or(DEFAULT_WINDOW_WIDTH),
                height: display.height.unwrap_or(DEFAULT_WINDOW_HEIGHT),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("DEPTH_CAPTURE_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(dir) = std::env::var("DEPTH_CAPTURE_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.export.output_dir = PathBuf::from(dir);
            }
        }
        if let Ok(warmup) = std::env::var("DEPTH_CAPTURE_WARMUP_BUNDLES") {
            self.warmup_bundles = warmup
                .trim()
                .parse()
                .map_err(|_| anyhow!("DEPTH_CAPTURE_WARMUP_BUNDLES must be an integer"))?;
        }
        if let Ok(max) = std::env::var("DEPTH_CAPTURE_MAX_BUNDLES") {
            let max: u64 = max
                .trim()
                .parse()
                .map_err(|_| anyhow!("DEPTH_CAPTURE_MAX_BUNDLES must be an integer"))?;
            self.max_bundles = Some(max);
        }
        if let Ok(mode) = std::env::var("DEPTH_CAPTURE_EXPORT_MODE") {
            self.export.mode = mode.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.url.trim().is_empty() {
            return Err(anyhow!("source url must not be empty"));
        }
        if self.source.timeout.is_zero() {
            return Err(anyhow!("frame timeout must be greater than zero"));
        }
        for stream in &self.streams {
            if stream.width == Some(0) || stream.height == Some(0) {
                return Err(anyhow!("{} stream resolution must be non-zero", stream.kind));
            }
            if stream.fps == Some(0) {
                return Err(anyhow!("{} stream fps must be greater than zero", stream.kind));
            }
        }
        if self.export.queue_capacity == 0 {
            return Err(anyhow!("export queue capacity must be greater than zero"));
        }
        if self.window.width < 2 || self.window.height < 2 {
            return Err(anyhow!("display window must be at least 2x2"));
        }
        Ok(())
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            streams: self.streams.clone(),
            warmup_bundles: self.warmup_bundles,
            frame_timeout: self.source.timeout,
        }
    }
}

fn stream_request(base: StreamRequest, file: Option<StreamConfigFile>) -> StreamRequest {
    let file = file.unwrap_or_default();
    StreamRequest {
        width: file.width.or(base.width),
        height: file.height.or(base.height),
        format: file.format.or(base.format),
        fps: file.fps.or(base.fps),
        ..base
    }
}

fn read_config_file(path: &Path) -> Result<CaptureConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_capture_sample() {
        let cfg = CaptureConfig::default();
        assert_eq!(cfg.source.url, DEFAULT_SOURCE_URL);
        assert_eq!(cfg.warmup_bundles, 30);
        assert_eq!(cfg.streams.len(), 4);
        assert_eq!(cfg.streams[0].kind, StreamKind::Color);
        assert_eq!(cfg.streams[0].width, Some(1280));
        assert_eq!(cfg.streams[0].height, Some(720));
        assert_eq!(cfg.streams[0].format, Some(PixelFormat::Rgb8));
        assert_eq!(cfg.streams[1].format, None);
        assert_eq!(cfg.export.mode, ExportMode::Inline);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn export_mode_parses_case_insensitively() -> Result<()> {
        assert_eq!("Pooled".parse::<ExportMode>()?, ExportMode::Pooled);
        assert!("threads".parse::<ExportMode>().is_err());
        Ok(())
    }

    #[test]
    fn zero_resolution_is_rejected() {
        let mut cfg = CaptureConfig::default();
        cfg.streams[1].width = Some(0);
        assert!(cfg.validate().is_err());
    }
}
