//! Display sinks.
//!
//! The capture loop draws every streamed bundle into a window split into four
//! quadrants. Drawing is a side effect only; export does not depend on it.
//! `poll_open` doubles as the loop condition: the loop runs until the sink
//! reports that the user closed it.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::frame::{Frame, Slot};

/// One quarter of the display window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quadrant {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Quadrant {
    /// Fixed placement: depth top-left, color top-right, infrared below.
    pub fn for_slot(slot: Slot) -> Self {
        match slot {
            Slot::Depth => Quadrant::TopLeft,
            Slot::Color => Quadrant::TopRight,
            Slot::Infrared0 => Quadrant::BottomLeft,
            Slot::Infrared1 => Quadrant::BottomRight,
        }
    }

    /// Pixel rectangle of this quadrant in a `width` x `height` window.
    pub fn rect(self, width: u32, height: u32) -> Rect {
        let (w, h) = (width / 2, height / 2);
        let (x, y) = match self {
            Quadrant::TopLeft => (0, 0),
            Quadrant::TopRight => (w, 0),
            Quadrant::BottomLeft => (0, h),
            Quadrant::BottomRight => (w, h),
        };
        Rect { x, y, w, h }
    }

    fn position(self) -> usize {
        match self {
            Quadrant::TopLeft => 0,
            Quadrant::TopRight => 1,
            Quadrant::BottomLeft => 2,
            Quadrant::BottomRight => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// On-screen output for captured frames.
pub trait DisplaySink {
    /// Draw `frame` into `quadrant`. Frames without image data are ignored.
    fn render(&mut self, frame: &Frame, quadrant: Quadrant) -> Result<()>;

    /// Present what was drawn since the last call and report whether the
    /// display is still open. Called once per loop iteration.
    fn poll_open(&mut self) -> bool;
}

/// What a quadrant currently shows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuadrantView {
    pub stream_name: String,
    pub frame_number: u64,
    pub width: u32,
    pub height: u32,
}

/// Window stand-in for runs without a GUI.
///
/// Tracks what each quadrant would show. Closes when its close handle is
/// triggered (e.g. from a Ctrl-C handler) or after `max_presents` bundles.
pub struct HeadlessDisplay {
    width: u32,
    height: u32,
    quadrants: [Option<QuadrantView>; 4],
    closed: Arc<AtomicBool>,
    presents: u64,
    max_presents: Option<u64>,
}

impl HeadlessDisplay {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            quadrants: Default::default(),
            closed: Arc::new(AtomicBool::new(false)),
            presents: 0,
            max_presents: None,
        }
    }

    /// Close after `limit` bundles have been presented.
    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.max_presents = limit;
        self
    }

    /// Flag that closes the display when set. Safe to move into a signal handler.
    pub fn close_handle(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }

    pub fn view(&self, quadrant: Quadrant) -> Option<&QuadrantView> {
        self.quadrants[quadrant.position()].as_ref()
    }

    /// Number of bundles presented so far.
    pub fn presents(&self) -> u64 {
        self.presents
    }
}

impl DisplaySink for HeadlessDisplay {
    fn render(&mut self, frame: &Frame, quadrant: Quadrant) -> Result<()> {
        let Some(video) = frame.as_video() else {
            return Ok(());
        };
        let rect = quadrant.rect(self.width, self.height);
        log::trace!(
            "draw {} #{} ({}x{}) into {:?} at {:?}",
            frame.profile().stream_name(),
            frame.frame_number(),
            video.width(),
            video.height(),
            quadrant,
            rect
        );
        self.quadrants[quadrant.position()] = Some(QuadrantView {
            stream_name: frame.profile().stream_name(),
            frame_number: frame.frame_number(),
            width: video.width(),
            height: video.height(),
        });
        Ok(())
    }

    fn poll_open(&mut self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        if let Some(limit) = self.max_presents {
            if self.presents >= limit {
                self.closed.store(true, Ordering::SeqCst);
                return false;
            }
        }
        self.presents += 1;
        true
    }
}
