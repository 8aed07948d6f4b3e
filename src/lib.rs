//! Depth camera capture.
//!
//! Pulls synchronized depth/color/infrared frame bundles from a frame source,
//! draws them into a four-quadrant display and persists every frame as a
//! lossless PNG plus a per-stream metadata CSV.
//!
//! # Module Structure
//!
//! - `frame`: Frame model (StreamKind, Frame, VideoFrame, FrameBundle)
//! - `metadata`: Metadata attributes and the CSV sidecar writer
//! - `ingest`: Frame sources (FrameSource trait, synthetic `stub://` camera)
//! - `colorize`: Depth-to-RGB colorization
//! - `display`: Display sinks (quadrant layout, headless window)
//! - `export`: PNG + metadata export, inline or on worker threads
//! - `capture`: Warm-up / streaming loop tying the above together
//! - `config`: JSON + environment configuration

pub mod capture;
pub mod colorize;
pub mod config;
pub mod display;
pub mod error;
pub mod export;
pub mod frame;
pub mod ingest;
pub mod metadata;

pub use capture::{CaptureLoop, CaptureSettings, CaptureState, CaptureSummary};
pub use colorize::{Colorizer, LinearColorizer};
pub use config::{CaptureConfig, ExportMode};
pub use display::{DisplaySink, HeadlessDisplay, Quadrant};
pub use error::DeviceError;
pub use export::{
    ExportError, ExportPool, ExportReport, ExportSink, ExportTarget, Exporter, FrameCounter,
};
pub use frame::{
    Frame, FrameBundle, PixelFormat, Slot, StreamKind, StreamProfile, VideoFrame, VideoLayout,
};
pub use ingest::{FrameSource, StreamRequest, SyntheticConfig, SyntheticSource};
pub use metadata::{write_metadata_csv, MetadataAttribute};
