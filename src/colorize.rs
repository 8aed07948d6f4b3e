//! Depth colorization.
//!
//! A colorizer turns a single-channel Z16 depth frame into an RGB8 frame of the
//! same geometry so it can be displayed and exported like a color image.

use anyhow::Result;

use crate::frame::{Frame, PixelFormat, VideoLayout};

/// Maps depth frames to a three-channel visual representation.
pub trait Colorizer: Send {
    /// Colorize `frame`. Frames that are not Z16 images are returned unchanged.
    fn colorize(&mut self, frame: &Frame) -> Result<Frame>;
}

/// Linear near-bright / far-dark ramp over a fixed depth range.
///
/// Zero depth (no data) maps to black.
#[derive(Clone, Debug)]
pub struct LinearColorizer {
    min_depth: u16,
    max_depth: u16,
}

impl LinearColorizer {
    pub fn new(min_depth: u16, max_depth: u16) -> Self {
        Self {
            min_depth: min_depth.min(max_depth),
            max_depth: max_depth.max(min_depth),
        }
    }

    fn shade(&self, depth: u16) -> [u8; 3] {
        if depth == 0 {
            return [0, 0, 0];
        }
        let span = u32::from(self.max_depth - self.min_depth).max(1);
        let clamped = depth.clamp(self.min_depth, self.max_depth);
        let offset = u32::from(clamped - self.min_depth);
        let near = (255 - offset * 255 / span) as u8;
        // Warm tint close to the camera, cool tint far away.
        [near, near / 2 + 64, 255 - near]
    }
}

impl Default for LinearColorizer {
    /// 0.3m - 4m at the usual 1mm depth unit.
    fn default() -> Self {
        Self::new(300, 4000)
    }
}

impl Colorizer for LinearColorizer {
    fn colorize(&mut self, frame: &Frame) -> Result<Frame> {
        let Some(video) = frame.as_video() else {
            return Ok(frame.clone());
        };
        if video.format() != PixelFormat::Z16 {
            return Ok(frame.clone());
        }

        let consistent = video
            .expected_len()
            .is_some_and(|range| range.contains(&video.data().len()));
        if !consistent {
            // Hand the frame on untouched so export reports the mismatch.
            log::warn!(
                "depth frame #{} has {} bytes for a {}x{} layout; not colorized",
                frame.frame_number(),
                video.data().len(),
                video.width(),
                video.height()
            );
            return Ok(frame.clone());
        }

        let layout = VideoLayout::packed(video.width(), video.height(), PixelFormat::Rgb8);
        let mut rgb = Vec::with_capacity(layout.stride * video.height() as usize);
        for row in (0..video.height()).filter_map(|y| video.row(y)) {
            for px in row.chunks_exact(2) {
                rgb.extend_from_slice(&self.shade(u16::from_le_bytes([px[0], px[1]])));
            }
        }

        Ok(frame.with_pixels(PixelFormat::Rgb8, layout, rgb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{StreamKind, StreamProfile};
    use crate::metadata::MetadataAttribute;

    fn depth_frame(values: &[u16], width: u32) -> Frame {
        let height = values.len() as u32 / width;
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let profile = StreamProfile::new(StreamKind::Depth, 0, PixelFormat::Z16);
        Frame::video(profile, VideoLayout::packed(width, height, PixelFormat::Z16), data)
            .with_frame_number(7)
            .with_metadata(MetadataAttribute::FrameCounter, 7)
    }

    #[test]
    fn colorized_depth_keeps_geometry_and_identity() -> Result<()> {
        let frame = depth_frame(&[0, 300, 1000, 4000, 9000, 2000], 3);
        let out = LinearColorizer::default().colorize(&frame)?;

        let video = out.as_video().expect("video frame");
        assert_eq!(video.format(), PixelFormat::Rgb8);
        assert_eq!((video.width(), video.height()), (3, 2));
        assert_eq!(video.data().len(), 3 * 2 * 3);
        assert_eq!(out.kind(), StreamKind::Depth);
        assert_eq!(out.frame_number(), 7);
        assert_eq!(out.metadata_value(MetadataAttribute::FrameCounter), Some(7));
        Ok(())
    }

    #[test]
    fn no_data_is_black_and_near_is_brighter_than_far() {
        let colorizer = LinearColorizer::default();
        assert_eq!(colorizer.shade(0), [0, 0, 0]);
        assert!(colorizer.shade(300)[0] > colorizer.shade(4000)[0]);
        assert_eq!(colorizer.shade(9000), colorizer.shade(4000));
    }

    #[test]
    fn oversized_depth_is_left_for_export_to_reject() -> Result<()> {
        let profile = StreamProfile::new(StreamKind::Depth, 0, PixelFormat::Z16);
        let layout = VideoLayout::packed(2, 2, PixelFormat::Z16);
        let frame = Frame::video(profile, layout, vec![1; 24]);
        let out = LinearColorizer::default().colorize(&frame)?;
        assert_eq!(out.profile().format, PixelFormat::Z16);
        assert_eq!(out.as_video().unwrap().data().len(), 24);
        Ok(())
    }

    #[test]
    fn non_depth_frames_pass_through() -> Result<()> {
        let profile = StreamProfile::new(StreamKind::Infrared, 0, PixelFormat::Y8);
        let frame = Frame::video(profile, VideoLayout::packed(2, 1, PixelFormat::Y8), vec![5, 6]);
        let out = LinearColorizer::default().colorize(&frame)?;
        assert_eq!(out.profile().format, PixelFormat::Y8);
        assert_eq!(out.as_video().unwrap().data(), &[5, 6]);
        Ok(())
    }
}
