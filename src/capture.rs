//! Capture loop.
//!
//! Sequences one run of the pipeline:
//! 1. Starts the frame source with the requested streams
//! 2. Warms up: discards a fixed number of bundles while auto-exposure settles
//! 3. Streams: for every bundle, colorizes depth, draws all four frames and
//!    exports all four frames, then advances the frame counter
//! 4. Stops when the display reports closed, or on the first error
//!
//! The frame counter is owned here and advanced exactly once per streamed
//! bundle, whether or not every frame of the bundle was exported.

use anyhow::{Context, Result};
use std::time::Duration;

use crate::colorize::Colorizer;
use crate::display::{DisplaySink, Quadrant};
use crate::export::{ExportSink, FrameCounter};
use crate::frame::Slot;
use crate::ingest::{FrameSource, StreamRequest};

/// Bundles discarded before streaming starts.
pub const DEFAULT_WARMUP_BUNDLES: u32 = 30;

/// Upper bound on one blocking acquisition.
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Clone, Debug)]
pub struct CaptureSettings {
    pub streams: Vec<StreamRequest>,
    pub warmup_bundles: u32,
    pub frame_timeout: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            streams: crate::ingest::default_streams(),
            warmup_bundles: DEFAULT_WARMUP_BUNDLES,
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    WarmingUp { remaining: u32 },
    Streaming,
}

/// Totals for a finished run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureSummary {
    /// Bundles streamed (displayed and exported). Equals the final counter value.
    pub bundles: u64,
    pub images_written: u64,
    /// Frames skipped because they carried no image data or were missing.
    pub frames_skipped: u64,
}

pub struct CaptureLoop {
    settings: CaptureSettings,
    colorizer: Box<dyn Colorizer>,
    sink: ExportSink,
    counter: FrameCounter,
    state: CaptureState,
    missing_frames: u64,
}

impl CaptureLoop {
    pub fn new(
        settings: CaptureSettings,
        colorizer: Box<dyn Colorizer>,
        sink: ExportSink,
    ) -> Self {
        let state = CaptureState::WarmingUp {
            remaining: settings.warmup_bundles,
        };
        Self {
            settings,
            colorizer,
            sink,
            counter: FrameCounter::new(),
            state,
            missing_frames: 0,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn counter(&self) -> FrameCounter {
        self.counter
    }

    /// Run until the display closes. Consumes the loop; the export sink is
    /// drained before returning.
    pub fn run(
        mut self,
        source: &mut dyn FrameSource,
        display: &mut dyn DisplaySink,
    ) -> Result<CaptureSummary> {
        source
            .start(&self.settings.streams)
            .with_context(|| format!("start {}", source.describe()))?;

        let streamed = self.stream(source, display);

        let stopped = source.stop();
        let bundles = self.counter.value();
        let missing = self.missing_frames;
        let drained = self.sink.finish();

        streamed?;
        stopped?;
        let (images_written, skipped) = drained?;

        let summary = CaptureSummary {
            bundles,
            images_written,
            frames_skipped: skipped + missing,
        };
        log::info!(
            "capture finished: {} bundles, {} images written, {} frames skipped",
            summary.bundles,
            summary.images_written,
            summary.frames_skipped
        );
        Ok(summary)
    }

    fn stream(
        &mut self,
        source: &mut dyn FrameSource,
        display: &mut dyn DisplaySink,
    ) -> Result<()> {
        self.warm_up(source)?;
        while display.poll_open() {
            self.step(source, display)?;
        }
        Ok(())
    }

    /// Discard bundles until the warm-up budget is spent.
    pub fn warm_up(&mut self, source: &mut dyn FrameSource) -> Result<()> {
        if let CaptureState::WarmingUp { remaining } = self.state {
            if remaining > 0 {
                log::info!("warming up: discarding {} bundles", remaining);
            }
            for left in (0..remaining).rev() {
                source.wait_for_frames(self.settings.frame_timeout)?;
                self.state = CaptureState::WarmingUp { remaining: left };
            }
            self.state = CaptureState::Streaming;
            log::info!("streaming");
        }
        Ok(())
    }

    /// Acquire, display and export one bundle.
    pub fn step(
        &mut self,
        source: &mut dyn FrameSource,
        display: &mut dyn DisplaySink,
    ) -> Result<()> {
        if self.state != CaptureState::Streaming {
            self.warm_up(source)?;
        }

        let mut bundle = source.wait_for_frames(self.settings.frame_timeout)?;
        if let Some(depth) = bundle.take(Slot::Depth) {
            bundle.insert(self.colorizer.colorize(&depth)?);
        }

        for slot in Slot::ALL {
            if let Some(frame) = bundle.get(slot) {
                display.render(frame, Quadrant::for_slot(slot))?;
            }
        }

        for slot in Slot::ALL {
            match bundle.take(slot) {
                Some(frame) => self.sink.submit(frame, slot, self.counter)?,
                None => {
                    log::debug!("bundle {} has no {:?} frame", self.counter.value(), slot);
                    self.missing_frames += 1;
                }
            }
        }

        self.counter.advance();
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
