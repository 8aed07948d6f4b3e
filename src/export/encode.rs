use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};

use super::ExportError;
use crate::frame::{PixelFormat, StreamKind, VideoFrame};

/// Validate `video` against the channel count implied by `kind` and pack its
/// rows into a contiguous buffer (stride padding dropped, BGR swizzled to RGB).
pub(crate) fn pack_pixels(
    video: &VideoFrame<'_>,
    kind: StreamKind,
) -> Result<Vec<u8>, ExportError> {
    let format = video.format();
    let expected = kind.channels();
    if !format.is_8bit() {
        return Err(ExportError::UnsupportedFormat { kind, format });
    }
    if format.channels() != expected {
        return Err(ExportError::ChannelMismatch {
            kind,
            expected,
            actual: format.channels(),
            format,
        });
    }

    let (width, height) = (video.width(), video.height());
    if width == 0 || height == 0 {
        return Err(ExportError::EmptyImage { width, height });
    }

    let row_len = width as usize * video.bytes_per_pixel();
    if video.stride() < row_len {
        return Err(ExportError::StrideTooSmall {
            stride: video.stride(),
            row_len,
        });
    }
    let expected_len = video.expected_len().ok_or(ExportError::GeometryOverflow {
        width,
        height,
        stride: video.stride(),
    })?;
    let actual = video.data().len();
    if !expected_len.contains(&actual) {
        return Err(ExportError::BufferSizeMismatch {
            min: *expected_len.start(),
            max: *expected_len.end(),
            actual,
        });
    }

    let mut packed = Vec::with_capacity(row_len * height as usize);
    for y in 0..height {
        let row = video.row(y).ok_or(ExportError::BufferSizeMismatch {
            min: *expected_len.start(),
            max: *expected_len.end(),
            actual,
        })?;
        packed.extend_from_slice(row);
    }
    if format == PixelFormat::Bgr8 {
        for px in packed.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
    }
    Ok(packed)
}

/// Encode packed pixels as PNG in the color type `kind` exports with.
pub(crate) fn encode_png(
    packed: &[u8],
    width: u32,
    height: u32,
    kind: StreamKind,
) -> Result<Vec<u8>, ExportError> {
    let color = match kind {
        StreamKind::Depth | StreamKind::Color => ExtendedColorType::Rgb8,
        StreamKind::Infrared => ExtendedColorType::L8,
    };
    let mut out = Vec::new();
    PngEncoder::new(&mut out).write_image(packed, width, height, color)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, StreamProfile, VideoLayout};

    fn frame(kind: StreamKind, format: PixelFormat, layout: VideoLayout, data: Vec<u8>) -> Frame {
        Frame::video(StreamProfile::new(kind, 0, format), layout, data)
    }

    #[test]
    fn padded_rows_are_packed() -> Result<(), ExportError> {
        let layout = VideoLayout {
            width: 1,
            height: 2,
            stride: 4,
        };
        let f = frame(
            StreamKind::Color,
            PixelFormat::Rgb8,
            layout,
            vec![1, 2, 3, 0, 4, 5, 6, 0],
        );
        let packed = pack_pixels(&f.as_video().unwrap(), StreamKind::Color)?;
        assert_eq!(packed, vec![1, 2, 3, 4, 5, 6]);
        Ok(())
    }

    #[test]
    fn last_row_may_omit_padding() -> Result<(), ExportError> {
        let layout = VideoLayout {
            width: 2,
            height: 2,
            stride: 3,
        };
        let f = frame(StreamKind::Infrared, PixelFormat::Y8, layout, vec![1, 2, 9, 3, 4]);
        let packed = pack_pixels(&f.as_video().unwrap(), StreamKind::Infrared)?;
        assert_eq!(packed, vec![1, 2, 3, 4]);
        Ok(())
    }

    #[test]
    fn bgr_is_swizzled() -> Result<(), ExportError> {
        let layout = VideoLayout::packed(1, 1, PixelFormat::Bgr8);
        let f = frame(StreamKind::Color, PixelFormat::Bgr8, layout, vec![10, 20, 30]);
        assert_eq!(pack_pixels(&f.as_video().unwrap(), StreamKind::Color)?, vec![30, 20, 10]);
        Ok(())
    }

    #[test]
    fn kind_and_format_must_agree() {
        let layout = VideoLayout::packed(2, 2, PixelFormat::Y8);
        let f = frame(StreamKind::Color, PixelFormat::Y8, layout, vec![0; 4]);
        let err = pack_pixels(&f.as_video().unwrap(), StreamKind::Color).unwrap_err();
        assert!(matches!(
            err,
            ExportError::ChannelMismatch {
                expected: 3,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn raw_depth_is_not_encodable() {
        let layout = VideoLayout::packed(2, 2, PixelFormat::Z16);
        let f = frame(StreamKind::Depth, PixelFormat::Z16, layout, vec![0; 8]);
        let err = pack_pixels(&f.as_video().unwrap(), StreamKind::Depth).unwrap_err();
        assert!(matches!(err, ExportError::UnsupportedFormat { .. }));
    }

    #[test]
    fn short_buffer_is_rejected() {
        let layout = VideoLayout::packed(4, 4, PixelFormat::Rgb8);
        let f = frame(StreamKind::Color, PixelFormat::Rgb8, layout, vec![0; 4 * 4 * 3 - 1]);
        let err = pack_pixels(&f.as_video().unwrap(), StreamKind::Color).unwrap_err();
        assert!(matches!(
            err,
            ExportError::BufferSizeMismatch {
                min: 48,
                max: 48,
                actual: 47
            }
        ));
    }

    #[test]
    fn long_buffer_is_rejected() {
        // Y8 geometry carrying RGB-sized data.
        let layout = VideoLayout::packed(4, 3, PixelFormat::Y8);
        let f = frame(StreamKind::Infrared, PixelFormat::Y8, layout, vec![7; 36]);
        let err = pack_pixels(&f.as_video().unwrap(), StreamKind::Infrared).unwrap_err();
        assert!(matches!(
            err,
            ExportError::BufferSizeMismatch {
                min: 12,
                max: 12,
                actual: 36
            }
        ));
    }

    #[test]
    fn stride_shorter_than_row_is_rejected() {
        let layout = VideoLayout {
            width: 4,
            height: 1,
            stride: 3,
        };
        let f = frame(StreamKind::Infrared, PixelFormat::Y8, layout, vec![0; 4]);
        let err = pack_pixels(&f.as_video().unwrap(), StreamKind::Infrared).unwrap_err();
        assert!(matches!(err, ExportError::StrideTooSmall { .. }));
    }

    #[test]
    fn overflowing_stride_is_rejected() {
        let layout = VideoLayout {
            width: 1,
            height: 2,
            stride: usize::MAX,
        };
        let f = frame(StreamKind::Infrared, PixelFormat::Y8, layout, vec![0; 4]);
        let err = pack_pixels(&f.as_video().unwrap(), StreamKind::Infrared).unwrap_err();
        assert!(matches!(err, ExportError::GeometryOverflow { height: 2, .. }));
    }

    #[test]
    fn png_signature_is_written() -> Result<(), ExportError> {
        let png = encode_png(&[0, 128, 255, 64], 2, 2, StreamKind::Infrared)?;
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        Ok(())
    }
}
