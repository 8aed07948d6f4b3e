//! Frame sources.
//!
//! A frame source owns the camera side of the pipeline: stream configuration,
//! synchronization and auto-exposure all happen behind `wait_for_frames`.
//!
//! Backends are selected by URL:
//! - `stub://...` synthetic depth camera (testing, demos)
//!
//! Hardware backends plug in behind the same trait. URLs with any other scheme
//! fail with a `DeviceError` naming the scheme.

pub mod synthetic;

use anyhow::Result;
use std::time::Duration;

use crate::error::DeviceError;
use crate::frame::{FrameBundle, PixelFormat, StreamKind};

pub use synthetic::{SyntheticConfig, SyntheticSource};

/// One stream to enable when starting a source.
///
/// Unset fields leave the choice to the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamRequest {
    pub kind: StreamKind,
    /// Infrared channel index (0 or 1). Ignored for other kinds.
    pub index: u8,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<PixelFormat>,
    pub fps: Option<u32>,
}

impl StreamRequest {
    /// Request a stream with device defaults.
    pub fn new(kind: StreamKind) -> Self {
        Self {
            kind,
            index: 0,
            width: None,
            height: None,
            format: None,
            fps: None,
        }
    }

    pub fn infrared(index: u8) -> Self {
        Self {
            index,
            ..Self::new(StreamKind::Infrared)
        }
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = Some(format);
        self
    }
}

/// Default capture configuration: 1280x720 RGB8 color, device-default depth
/// and both infrared channels.
pub fn default_streams() -> Vec<StreamRequest> {
    vec![
        StreamRequest::new(StreamKind::Color)
            .with_resolution(1280, 720)
            .with_format(PixelFormat::Rgb8),
        StreamRequest::new(StreamKind::Depth),
        StreamRequest::infrared(0),
        StreamRequest::infrared(1),
    ]
}

/// Producer of synchronized frame bundles.
pub trait FrameSource {
    /// Configure and start streaming. Called once before the first wait.
    fn start(&mut self, streams: &[StreamRequest]) -> Result<()>;

    /// Block until the next synchronized bundle is available.
    ///
    /// Fails with a `DeviceError` when no bundle arrives within `timeout`.
    fn wait_for_frames(&mut self, timeout: Duration) -> Result<FrameBundle>;

    /// Stop streaming. Sources that hold no device resources need not override.
    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Open the backend that serves `url`.
pub fn open_source(url: &str, synthetic: SyntheticConfig) -> Result<Box<dyn FrameSource + Send>> {
    if url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(url, synthetic)));
    }
    let scheme = url.split_once("://").map(|(scheme, _)| scheme).unwrap_or(url);
    Err(DeviceError::new(
        "open_source",
        url,
        format!("no frame source backend for '{}'; built-in backends: stub://", scheme),
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_streams_request_color_depth_and_two_infrared() {
        let streams = default_streams();
        assert_eq!(streams.len(), 4);
        assert_eq!(streams[0].width, Some(1280));
        assert_eq!(streams[0].format, Some(PixelFormat::Rgb8));
        assert_eq!(streams[1].kind, StreamKind::Depth);
        assert_eq!((streams[2].index, streams[3].index), (0, 1));
    }

    #[test]
    fn unknown_scheme_is_a_device_error() {
        let err = open_source("usb://0", SyntheticConfig::default())
            .err()
            .expect("unknown scheme");
        let device = err.downcast_ref::<DeviceError>().expect("device error");
        assert_eq!(device.function, "open_source");
        assert!(device.message.contains("usb"));
    }

    #[test]
    fn stub_scheme_opens_synthetic_source() -> Result<()> {
        let source = open_source("stub://d4xx", SyntheticConfig::default())?;
        assert!(source.describe().contains("stub://d4xx"));
        Ok(())
    }
}
