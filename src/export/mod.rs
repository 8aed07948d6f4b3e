//! Frame export: one frame in, one PNG plus one metadata CSV out.
//!
//! The exporter is the only part of the pipeline that touches the filesystem.
//! It is responsible for:
//! - Skipping frames that carry no image data
//! - Checking the frame's pixel format against the channel count its stream
//!   kind exports with, and its buffer against its declared geometry
//! - Encoding the image fully in memory before anything is written, so a
//!   rejected frame never leaves a partial file behind
//! - Writing `<kind>-<sequence>_<counter>.png` and `<StreamName>-metadata.csv`

mod encode;
pub mod pool;

use anyhow::{Context, Result};
use std::path::PathBuf;
use thiserror::Error;

use crate::frame::{Frame, PixelFormat, Slot, StreamKind};
use crate::metadata::write_metadata_csv;

pub use pool::ExportPool;

/// Reasons a frame cannot be turned into an image.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("{kind} frames export with {expected} channel(s), but the frame is {format:?} ({actual} channel(s))")]
    ChannelMismatch {
        kind: StreamKind,
        expected: u8,
        actual: u8,
        format: PixelFormat,
    },

    #[error("{kind} frame format {format:?} is not 8 bits per channel")]
    UnsupportedFormat {
        kind: StreamKind,
        format: PixelFormat,
    },

    #[error("frame has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("stride {stride} is shorter than a row of {row_len} bytes")]
    StrideTooSmall { stride: usize, row_len: usize },

    #[error("pixel buffer holds {actual} bytes, geometry needs {min}..={max}")]
    BufferSizeMismatch { min: usize, max: usize, actual: usize },

    #[error("frame geometry {width}x{height} with stride {stride} overflows")]
    GeometryOverflow {
        width: u32,
        height: u32,
        stride: usize,
    },

    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

// ----------------------------------------------------------------------------
// Counter and targets
// ----------------------------------------------------------------------------

/// Number of bundles completed so far. Makes filenames distinct across bundles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameCounter(u64);

impl FrameCounter {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn advance(&mut self) {
        self.0 += 1;
    }
}

/// Output filenames for one export call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportTarget {
    pub image_file: String,
    pub metadata_file: String,
}

impl ExportTarget {
    pub fn new(
        kind: StreamKind,
        sequence: u32,
        counter: FrameCounter,
        stream_name: &str,
    ) -> Self {
        Self {
            image_file: format!("{}-{}_{}.png", kind.file_stem(), sequence, counter.value()),
            metadata_file: format!("{}-metadata.csv", stream_name),
        }
    }

    pub fn for_frame(
        frame: &Frame,
        kind: StreamKind,
        sequence: u32,
        counter: FrameCounter,
    ) -> Self {
        Self::new(kind, sequence, counter, &frame.profile().stream_name())
    }
}

/// What a successful export wrote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportReport {
    pub image_path: PathBuf,
    pub metadata_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

// ----------------------------------------------------------------------------
// Exporter
// ----------------------------------------------------------------------------

/// Writes frames into a single output directory.
#[derive(Clone, Debug)]
pub struct Exporter {
    output_dir: PathBuf,
    print_saved: bool,
}

impl Exporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            print_saved: false,
        }
    }

    /// Print `Saved <path>` to stdout for every image written, instead of
    /// logging it.
    pub fn print_saved(mut self, enabled: bool) -> Self {
        self.print_saved = enabled;
        self
    }

    /// Export `frame` as stream `kind`.
    ///
    /// Returns `Ok(None)` when the frame carries no image data. `sequence`
    /// separates streams of the same kind (0 unless it is the second infrared
    /// channel).
    pub fn export_frame(
        &self,
        frame: &Frame,
        kind: StreamKind,
        sequence: u32,
        counter: FrameCounter,
    ) -> Result<Option<ExportReport>> {
        let target = ExportTarget::for_frame(frame, kind, sequence, counter);
        self.export_to(frame, kind, &target)
    }

    /// Export `frame` to precomputed filenames.
    pub fn export_to(
        &self,
        frame: &Frame,
        kind: StreamKind,
        target: &ExportTarget,
    ) -> Result<Option<ExportReport>> {
        let Some(video) = frame.as_video() else {
            log::debug!(
                "skipping {} frame #{}: no image data",
                frame.profile().stream_name(),
                frame.frame_number()
            );
            return Ok(None);
        };

        let image_path = self.output_dir.join(&target.image_file);
        let packed = encode::pack_pixels(&video, kind)
            .with_context(|| format!("export {}", image_path.display()))?;
        let png = encode::encode_png(&packed, video.width(), video.height(), kind)
            .with_context(|| format!("export {}", image_path.display()))?;

        std::fs::write(&image_path, png)
            .with_context(|| format!("write image {}", image_path.display()))?;
        if self.print_saved {
            println!("Saved {}", image_path.display());
        } else {
            log::info!("Saved {}", image_path.display());
        }

        let metadata_path = self.output_dir.join(&target.metadata_file);
        write_metadata_csv(frame, &metadata_path)?;

        Ok(Some(ExportReport {
            image_path,
            metadata_path,
            width: video.width(),
            height: video.height(),
            channels: kind.channels(),
        }))
    }
}

// ----------------------------------------------------------------------------
// Sink selection
// ----------------------------------------------------------------------------

/// Where the capture loop sends frames for export.
pub enum ExportSink {
    /// Export on the capture thread, one frame at a time.
    Inline {
        exporter: Exporter,
        written: u64,
        skipped: u64,
    },
    /// Hand owned frames to per-slot worker threads.
    Pooled(ExportPool),
}

impl ExportSink {
    pub fn inline(exporter: Exporter) -> Self {
        ExportSink::Inline {
            exporter,
            written: 0,
            skipped: 0,
        }
    }

    pub fn pooled(exporter: Exporter, capacity: usize) -> Result<Self> {
        Ok(ExportSink::Pooled(ExportPool::spawn(exporter, capacity)?))
    }

    /// Export one frame. Inline sinks report the outcome, pooled sinks report
    /// only that the frame was queued.
    pub fn submit(
        &mut self,
        frame: Frame,
        slot: Slot,
        counter: FrameCounter,
    ) -> Result<()> {
        match self {
            ExportSink::Inline {
                exporter,
                written,
                skipped,
            } => {
                match exporter.export_frame(&frame, slot.kind(), slot.sequence(), counter)? {
                    Some(_) => *written += 1,
                    None => *skipped += 1,
                }
                Ok(())
            }
            ExportSink::Pooled(pool) => pool.submit(frame, slot, counter),
        }
    }

    /// Drain outstanding work and return `(written, skipped)` totals.
    pub fn finish(self) -> Result<(u64, u64)> {
        match self {
            ExportSink::Inline {
                written, skipped, ..
            } => Ok((written, skipped)),
            ExportSink::Pooled(pool) => pool.finish(),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{StreamProfile, VideoLayout};
    use crate::metadata::MetadataAttribute;

    fn color_frame(width: u32, height: u32) -> Frame {
        let profile = StreamProfile::new(StreamKind::Color, 0, PixelFormat::Rgb8);
        let data = (0..width * height * 3).map(|i| (i % 251) as u8).collect();
        Frame::video(profile, VideoLayout::packed(width, height, PixelFormat::Rgb8), data)
    }

    #[test]
    fn target_names_follow_kind_sequence_and_counter() {
        let mut counter = FrameCounter::new();
        let first = ExportTarget::new(StreamKind::Depth, 0, counter, "Depth");
        counter.advance();
        let second = ExportTarget::new(StreamKind::Depth, 0, counter, "Depth");
        let ir = ExportTarget::new(StreamKind::Infrared, 1, counter, "Infrared 2");

        assert_eq!(first.image_file, "depth-0_0.png");
        assert_eq!(second.image_file, "depth-0_1.png");
        assert_eq!(ir.image_file, "infrared-1_1.png");
        assert_eq!(ir.metadata_file, "Infrared 2-metadata.csv");
    }

    #[test]
    fn export_writes_image_and_metadata() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let dir = tmp.path().to_path_buf();
        let exporter = Exporter::new(&dir);
        let frame = color_frame(4, 3).with_metadata(MetadataAttribute::FrameCounter, 9);

        let report = exporter
            .export_frame(&frame, StreamKind::Color, 0, FrameCounter::new())?
            .expect("report");

        assert_eq!(report.image_path, dir.join("color-0_0.png"));
        assert_eq!(report.metadata_path, dir.join("Color-metadata.csv"));
        assert_eq!((report.width, report.height, report.channels), (4, 3, 3));
        let csv = std::fs::read_to_string(&report.metadata_path)?;
        assert!(csv.ends_with("Frame Counter,9\n"));

        Ok(())
    }

    #[test]
    fn mismatch_leaves_no_file() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let dir = tmp.path().to_path_buf();
        let exporter = Exporter::new(&dir);
        let frame = color_frame(4, 3);

        let err = exporter
            .export_frame(&frame, StreamKind::Infrared, 0, FrameCounter::new())
            .unwrap_err();
        assert!(err.downcast_ref::<ExportError>().is_some());
        assert!(!dir.join("infrared-0_0.png").exists());
        assert!(!dir.join("Color-metadata.csv").exists());

        Ok(())
    }

    #[test]
    fn printing_exporter_writes_the_same_files() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let dir = tmp.path().to_path_buf();
        let exporter = Exporter::new(&dir).print_saved(true);

        let report = exporter
            .export_frame(&color_frame(2, 2), StreamKind::Color, 0, FrameCounter::new())?
            .expect("report");

        assert!(exporter.print_saved);
        assert_eq!(report.image_path, dir.join("color-0_0.png"));
        assert!(report.image_path.exists());
        assert!(report.metadata_path.exists());
        Ok(())
    }

    #[test]
    fn inline_sink_counts_skips() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let dir = tmp.path().to_path_buf();
        let mut sink = ExportSink::inline(Exporter::new(&dir));
        let opaque = Frame::opaque(
            StreamProfile::new(StreamKind::Depth, 0, PixelFormat::Rgb8),
            vec![],
        );

        sink.submit(color_frame(2, 2), Slot::Color, FrameCounter::new())?;
        sink.submit(opaque, Slot::Depth, FrameCounter::new())?;

        assert_eq!(sink.finish()?, (1, 1));
        Ok(())
    }
}
