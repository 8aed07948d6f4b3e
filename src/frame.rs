//! Frame model.
//!
//! - `StreamKind` / `Slot`: closed tags for the sensor a frame came from and the
//!   position it occupies in a synchronized bundle.
//! - `Frame`: owned pixel buffer with profile, optional video layout and sparse
//!   per-frame metadata.
//! - `VideoFrame`: borrowed view that only exists for frames carrying image data.
//! - `FrameBundle`: one set of time-aligned frames from a single acquisition call.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use crate::metadata::MetadataAttribute;

// ----------------------------------------------------------------------------
// Stream classification
// ----------------------------------------------------------------------------

/// Sensor a frame originates from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Depth,
    Color,
    Infrared,
}

impl StreamKind {
    /// Lowercase name used in image filenames.
    pub fn file_stem(self) -> &'static str {
        match self {
            StreamKind::Depth => "depth",
            StreamKind::Color => "color",
            StreamKind::Infrared => "infrared",
        }
    }

    /// Human-readable name written at the top of metadata files.
    pub fn label(self) -> &'static str {
        match self {
            StreamKind::Depth => "Depth",
            StreamKind::Color => "Color",
            StreamKind::Infrared => "Infrared",
        }
    }

    /// Channel count of the exported image for this kind.
    ///
    /// Depth is exported after colorization, so it is three channels like color.
    pub fn channels(self) -> u8 {
        match self {
            StreamKind::Depth | StreamKind::Color => 3,
            StreamKind::Infrared => 1,
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_stem())
    }
}

/// Pixel encoding of a video frame buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 16-bit depth in device units.
    Z16,
    /// 8-bit luminance.
    Y8,
    /// 16-bit luminance.
    Y16,
    Rgb8,
    Bgr8,
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Y8 => 1,
            PixelFormat::Z16 | PixelFormat::Y16 => 2,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }

    pub fn channels(self) -> u8 {
        match self {
            PixelFormat::Z16 | PixelFormat::Y8 | PixelFormat::Y16 => 1,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }

    /// True when every channel is one byte wide.
    pub fn is_8bit(self) -> bool {
        self.bytes_per_pixel() == self.channels() as usize
    }
}

/// Identity of the stream a frame belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StreamProfile {
    pub kind: StreamKind,
    /// Infrared channel index (0 or 1). Always 0 for depth and color.
    pub index: u8,
    pub format: PixelFormat,
}

impl StreamProfile {
    pub fn new(kind: StreamKind, index: u8, format: PixelFormat) -> Self {
        Self {
            kind,
            index,
            format,
        }
    }

    /// Stream name as the device reports it ("Depth", "Color", "Infrared 1", ...).
    pub fn stream_name(&self) -> String {
        match self.kind {
            StreamKind::Infrared => format!("Infrared {}", u32::from(self.index) + 1),
            kind => kind.label().to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// Rectangular geometry of an image frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoLayout {
    pub width: u32,
    pub height: u32,
    /// Row pitch in bytes. May exceed `width * bytes_per_pixel`.
    pub stride: usize,
}

impl VideoLayout {
    /// Tightly packed layout for the given format.
    pub fn packed(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            stride: width as usize * format.bytes_per_pixel(),
        }
    }
}

/// Sparse per-frame metadata, ordered by attribute id.
pub type FrameMetadata = BTreeMap<MetadataAttribute, i64>;

/// One frame produced by a frame source.
///
/// Frames without a `VideoLayout` carry no image data (motion samples, corrupt
/// payloads). They flow through the pipeline but are never exported.
#[derive(Clone, Debug)]
pub struct Frame {
    profile: StreamProfile,
    layout: Option<VideoLayout>,
    data: Vec<u8>,
    frame_number: u64,
    metadata: FrameMetadata,
}

impl Frame {
    /// Image frame. The buffer is not validated here; the exporter checks it
    /// against the layout before encoding.
    pub fn video(profile: StreamProfile, layout: VideoLayout, data: Vec<u8>) -> Self {
        Self {
            profile,
            layout: Some(layout),
            data,
            frame_number: 0,
            metadata: FrameMetadata::new(),
        }
    }

    /// Frame without image data.
    pub fn opaque(profile: StreamProfile, data: Vec<u8>) -> Self {
        Self {
            profile,
            layout: None,
            data,
            frame_number: 0,
            metadata: FrameMetadata::new(),
        }
    }

    pub fn with_frame_number(mut self, frame_number: u64) -> Self {
        self.frame_number = frame_number;
        self
    }

    pub fn with_metadata(mut self, attribute: MetadataAttribute, value: i64) -> Self {
        self.metadata.insert(attribute, value);
        self
    }

    pub fn profile(&self) -> &StreamProfile {
        &self.profile
    }

    pub fn kind(&self) -> StreamKind {
        self.profile.kind
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn metadata(&self) -> &FrameMetadata {
        &self.metadata
    }

    pub fn metadata_value(&self, attribute: MetadataAttribute) -> Option<i64> {
        self.metadata.get(&attribute).copied()
    }

    /// Image view of this frame, if it carries image data.
    pub fn as_video(&self) -> Option<VideoFrame<'_>> {
        self.layout.map(|layout| VideoFrame {
            layout,
            format: self.profile.format,
            data: &self.data,
        })
    }

    /// Replace format, layout and pixels while keeping identity and metadata.
    pub(crate) fn with_pixels(
        &self,
        format: PixelFormat,
        layout: VideoLayout,
        data: Vec<u8>,
    ) -> Self {
        Self {
            profile: StreamProfile {
                format,
                ..self.profile
            },
            layout: Some(layout),
            data,
            frame_number: self.frame_number,
            metadata: self.metadata.clone(),
        }
    }
}

/// Borrowed view of an image frame.
#[derive(Clone, Copy, Debug)]
pub struct VideoFrame<'a> {
    layout: VideoLayout,
    format: PixelFormat,
    data: &'a [u8],
}

impl<'a> VideoFrame<'a> {
    pub fn width(&self) -> u32 {
        self.layout.width
    }

    pub fn height(&self) -> u32 {
        self.layout.height
    }

    pub fn stride(&self) -> usize {
        self.layout.stride
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.format.bytes_per_pixel()
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Buffer lengths consistent with the declared geometry: every row but the
    /// last at full stride, the last one at least its packed length.
    ///
    /// `None` when the geometry is empty or its size overflows `usize`.
    pub fn expected_len(&self) -> Option<RangeInclusive<usize>> {
        let rows = self.layout.height.checked_sub(1)? as usize;
        let row_len = (self.layout.width as usize).checked_mul(self.bytes_per_pixel())?;
        let min = self.layout.stride.checked_mul(rows)?.checked_add(row_len)?;
        let max = self.layout.stride.checked_mul(rows + 1)?;
        Some(min..=max)
    }

    /// Bytes of row `y` without stride padding, if the buffer covers it.
    pub fn row(&self, y: u32) -> Option<&'a [u8]> {
        let start = (y as usize).checked_mul(self.layout.stride)?;
        let len = self.layout.width as usize * self.bytes_per_pixel();
        self.data.get(start..start.checked_add(len)?)
    }
}

// ----------------------------------------------------------------------------
// Bundles
// ----------------------------------------------------------------------------

/// Position of a frame within a synchronized bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    Depth,
    Color,
    Infrared0,
    Infrared1,
}

impl Slot {
    pub const ALL: [Slot; 4] = [Slot::Depth, Slot::Color, Slot::Infrared0, Slot::Infrared1];

    pub fn kind(self) -> StreamKind {
        match self {
            Slot::Depth => StreamKind::Depth,
            Slot::Color => StreamKind::Color,
            Slot::Infrared0 | Slot::Infrared1 => StreamKind::Infrared,
        }
    }

    /// Sequence number used in export filenames.
    pub fn sequence(self) -> u32 {
        match self {
            Slot::Infrared1 => 1,
            _ => 0,
        }
    }

    fn position(self) -> usize {
        match self {
            Slot::Depth => 0,
            Slot::Color => 1,
            Slot::Infrared0 => 2,
            Slot::Infrared1 => 3,
        }
    }

    /// Slot a frame with the given profile belongs in.
    pub fn for_profile(profile: &StreamProfile) -> Slot {
        match (profile.kind, profile.index) {
            (StreamKind::Depth, _) => Slot::Depth,
            (StreamKind::Color, _) => Slot::Color,
            (StreamKind::Infrared, 0) => Slot::Infrared0,
            (StreamKind::Infrared, _) => Slot::Infrared1,
        }
    }
}

/// Time-aligned frames returned by one acquisition call. Any slot may be empty.
#[derive(Clone, Debug, Default)]
pub struct FrameBundle {
    frames: [Option<Frame>; 4],
}

impl FrameBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a frame into the slot matching its profile, replacing any previous one.
    pub fn insert(&mut self, frame: Frame) {
        let slot = Slot::for_profile(frame.profile());
        self.frames[slot.position()] = Some(frame);
    }

    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.insert(frame);
        self
    }

    pub fn get(&self, slot: Slot) -> Option<&Frame> {
        self.frames[slot.position()].as_ref()
    }

    pub fn take(&mut self, slot: Slot) -> Option<Frame> {
        self.frames[slot.position()].take()
    }

    pub fn depth(&self) -> Option<&Frame> {
        self.get(Slot::Depth)
    }

    pub fn color(&self) -> Option<&Frame> {
        self.get(Slot::Color)
    }

    pub fn infrared(&self, index: u8) -> Option<&Frame> {
        match index {
            0 => self.get(Slot::Infrared0),
            _ => self.get(Slot::Infrared1),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.iter().filter(|frame| frame.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
