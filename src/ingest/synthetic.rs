//! Synthetic depth camera (`stub://` URLs).
//!
//! Produces time-aligned depth (Z16), color (RGB8/BGR8/RGBA8) and two infrared
//! (Y8/Y16) frames per bundle, with the metadata a real device reports:
//! counters, timestamps, exposure converging over the first frames, gain and
//! laser power.

use anyhow::Result;
use rand::Rng;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use super::{FrameSource, StreamRequest};
use crate::error::DeviceError;
use crate::frame::{Frame, FrameBundle, PixelFormat, StreamKind, StreamProfile, VideoLayout};
use crate::metadata::MetadataAttribute;

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FPS: u32 = 30;
const INITIAL_EXPOSURE_US: i64 = 33_000;
const SETTLED_EXPOSURE_US: i64 = 8_500;

/// Knobs for the synthetic camera.
#[derive(Clone, Debug, Default)]
pub struct SyntheticConfig {
    /// Extra bytes appended to every row, so frames carry a stride larger than
    /// their packed row length.
    pub row_padding: usize,
    /// Sleep between bundles to match the configured frame rate.
    pub realtime: bool,
}

#[derive(Clone, Copy, Debug)]
struct ActiveStream {
    profile: StreamProfile,
    width: u32,
    height: u32,
    fps: u32,
}

/// Synthetic frame source.
pub struct SyntheticSource {
    url: String,
    config: SyntheticConfig,
    streams: Option<Vec<ActiveStream>>,
    bundle_count: u64,
    started_at: Instant,
    last_bundle_at: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(url: impl Into<String>, config: SyntheticConfig) -> Self {
        Self {
            url: url.into(),
            config,
            streams: None,
            bundle_count: 0,
            started_at: Instant::now(),
            last_bundle_at: None,
        }
    }

    pub fn bundles_produced(&self) -> u64 {
        self.bundle_count
    }

    fn resolve(request: &StreamRequest) -> Result<ActiveStream, DeviceError> {
        let format = match (request.kind, request.format) {
            (StreamKind::Depth, None | Some(PixelFormat::Z16)) => PixelFormat::Z16,
            (StreamKind::Color, None) => PixelFormat::Rgb8,
            (
                StreamKind::Color,
                Some(format @ (PixelFormat::Rgb8 | PixelFormat::Bgr8 | PixelFormat::Rgba8)),
            ) => format,
            (StreamKind::Infrared, None) => PixelFormat::Y8,
            (StreamKind::Infrared, Some(format @ (PixelFormat::Y8 | PixelFormat::Y16))) => format,
            (kind, Some(format)) => {
                return Err(DeviceError::new(
                    "start",
                    format!("{}, {:?}", kind, format),
                    "stream format not supported",
                ))
            }
        };
        if request.kind == StreamKind::Infrared && request.index > 1 {
            return Err(DeviceError::new(
                "start",
                format!("infrared, index {}", request.index),
                "infrared channel index out of range",
            ));
        }
        if request.width == Some(0) || request.height == Some(0) {
            return Err(DeviceError::new(
                "start",
                format!("{}, {:?}x{:?}", request.kind, request.width, request.height),
                "resolution must be non-zero",
            ));
        }
        let index = match request.kind {
            StreamKind::Infrared => request.index,
            _ => 0,
        };
        Ok(ActiveStream {
            profile: StreamProfile::new(request.kind, index, format),
            width: request.width.unwrap_or(DEFAULT_WIDTH),
            height: request.height.unwrap_or(DEFAULT_HEIGHT),
            fps: request.fps.unwrap_or(DEFAULT_FPS).max(1),
        })
    }

    fn frame_interval(streams: &[ActiveStream]) -> Duration {
        let fps = streams.iter().map(|s| s.fps).min().unwrap_or(DEFAULT_FPS);
        Duration::from_micros(1_000_000 / u64::from(fps))
    }

    fn render(&self, stream: &ActiveStream, frame_number: u64) -> Frame {
        let format = stream.profile.format;
        let bpp = format.bytes_per_pixel();
        let row_len = stream.width as usize * bpp;
        let stride = row_len + self.config.row_padding;
        let mut data = vec![0u8; stride * stream.height as usize];
        let mut rng = rand::thread_rng();
        let shift = frame_number as usize;

        for (y, row) in data.chunks_exact_mut(stride).enumerate() {
            for (x, px) in row[..row_len].chunks_exact_mut(bpp).enumerate() {
                match format {
                    PixelFormat::Z16 => {
                        // Floor receding towards the top of the image, plus sensor noise.
                        let depth = 400 + (stream.height as usize - y) * 6 + (x + shift) % 64;
                        let depth = (depth as u16).saturating_add(rng.gen_range(0..4));
                        px.copy_from_slice(&depth.to_le_bytes());
                    }
                    PixelFormat::Y8 => {
                        px[0] = ((x + y + shift) % 200) as u8 + rng.gen_range(0..8);
                    }
                    PixelFormat::Y16 => {
                        let level = ((x + y + shift) % 1000) as u16 * 60;
                        px.copy_from_slice(&level.to_le_bytes());
                    }
                    PixelFormat::Rgb8 | PixelFormat::Bgr8 | PixelFormat::Rgba8 => {
                        px[0] = ((x + shift) % 256) as u8;
                        px[1] = (y % 256) as u8;
                        px[2] = ((x + y) % 256) as u8;
                        if bpp == 4 {
                            px[3] = 255;
                        }
                    }
                }
            }
        }

        let layout = VideoLayout {
            width: stream.width,
            height: stream.height,
            stride,
        };
        let frame = Frame::video(stream.profile, layout, data).with_frame_number(frame_number);
        self.attach_metadata(frame, stream, frame_number)
    }

    fn attach_metadata(&self, frame: Frame, stream: &ActiveStream, frame_number: u64) -> Frame {
        let wall_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        let sensor_us = self.started_at.elapsed().as_micros() as i64;
        let exposure = SETTLED_EXPOSURE_US
            + (INITIAL_EXPOSURE_US - SETTLED_EXPOSURE_US) / (1 + frame_number as i64);

        let frame = frame
            .with_metadata(MetadataAttribute::FrameCounter, frame_number as i64)
            .with_metadata(MetadataAttribute::FrameTimestamp, wall_ms)
            .with_metadata(MetadataAttribute::SensorTimestamp, sensor_us)
            .with_metadata(MetadataAttribute::TimeOfArrival, wall_ms)
            .with_metadata(MetadataAttribute::BackendTimestamp, wall_ms)
            .with_metadata(MetadataAttribute::ActualFps, i64::from(stream.fps))
            .with_metadata(MetadataAttribute::ActualExposure, exposure)
            .with_metadata(MetadataAttribute::AutoExposure, 1)
            .with_metadata(MetadataAttribute::GainLevel, 16);

        match stream.profile.kind {
            StreamKind::Color => frame
                .with_metadata(MetadataAttribute::WhiteBalance, 4600)
                .with_metadata(MetadataAttribute::Brightness, 0)
                .with_metadata(MetadataAttribute::Contrast, 50)
                .with_metadata(MetadataAttribute::PowerLineFrequency, 3),
            StreamKind::Depth | StreamKind::Infrared => frame
                .with_metadata(MetadataAttribute::FrameLaserPower, 150)
                .with_metadata(MetadataAttribute::FrameLaserPowerMode, 1)
                .with_metadata(MetadataAttribute::Temperature, 38),
        }
    }
}

impl FrameSource for SyntheticSource {
    fn start(&mut self, streams: &[StreamRequest]) -> Result<()> {
        if self.streams.is_some() {
            return Err(DeviceError::new("start", &self.url, "pipeline already started").into());
        }
        if streams.is_empty() {
            return Err(DeviceError::new("start", &self.url, "no streams requested").into());
        }
        let active = streams
            .iter()
            .map(Self::resolve)
            .collect::<Result<Vec<_>, _>>()?;
        for stream in &active {
            log::info!(
                "SyntheticSource: enabled {} {}x{} {:?} @{}fps",
                stream.profile.stream_name(),
                stream.width,
                stream.height,
                stream.profile.format,
                stream.fps
            );
        }
        self.streams = Some(active);
        self.started_at = Instant::now();
        log::info!("SyntheticSource: started {}", self.url);
        Ok(())
    }

    fn wait_for_frames(&mut self, timeout: Duration) -> Result<FrameBundle> {
        let args = format!("timeout_ms:{}", timeout.as_millis());
        let Some(streams) = self.streams.as_ref() else {
            return Err(DeviceError::new("wait_for_frames", args, "pipeline not started").into());
        };

        if self.config.realtime {
            let interval = Self::frame_interval(streams);
            if interval > timeout {
                return Err(DeviceError::new(
                    "wait_for_frames",
                    args,
                    format!("Frame didn't arrive within {}", timeout.as_millis()),
                )
                .into());
            }
            if let Some(last) = self.last_bundle_at {
                if let Some(remaining) = interval.checked_sub(last.elapsed()) {
                    std::thread::sleep(remaining);
                }
            }
        }

        let frame_number = self.bundle_count;
        let mut bundle = FrameBundle::new();
        for stream in streams {
            bundle.insert(self.render(stream, frame_number));
        }
        self.bundle_count += 1;
        self.last_bundle_at = Some(Instant::now());
        Ok(bundle)
    }

    fn stop(&mut self) -> Result<()> {
        if self.streams.take().is_some() {
            log::info!(
                "SyntheticSource: stopped {} after {} bundles",
                self.url,
                self.bundle_count
            );
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} (synthetic)", self.url)
    }
}
