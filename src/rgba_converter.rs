use nokhwa::{Buffer, utils::FrameFormat};
use rayon::prelude::*;
use thiserror::Error;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

use crate::types::Frame;

#[derive(Debug, Error)]
pub enum FrameDecodeError {
    #[error("{format} buffer too small: got {got}, expected {expected}")]
    ShortBuffer {
        format: &'static str,
        got: usize,
        expected: usize,
    },
    #[error("{format} conversion failed: {reason}")]
    Conversion {
        format: &'static str,
        reason: String,
    },
}

/// Channel layout of uncompressed 8-bit camera buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackedLayout {
    Rgb,
    Bgr,
    Gray,
}

impl PackedLayout {
    fn channels(self) -> usize {
        match self {
            PackedLayout::Rgb | PackedLayout::Bgr => 3,
            PackedLayout::Gray => 1,
        }
    }

    fn name(self) -> &'static str {
        match self {
            PackedLayout::Rgb => "RGB",
            PackedLayout::Bgr => "BGR",
            PackedLayout::Gray => "GRAY",
        }
    }
}

/// Decodes a camera buffer in its native pixel format into an RGBA frame.
pub fn decode_buffer(buffer: &Buffer) -> Result<Frame, FrameDecodeError> {
    let resolution = buffer.resolution();
    let (width, height) = (resolution.width_x, resolution.height_y);
    let data = buffer.buffer();

    let rgba = match buffer.source_frame_format() {
        FrameFormat::NV12 => nv12_to_rgba(data, width, height)?,
        FrameFormat::YUYV => yuyv_to_rgba(data, width, height)?,
        FrameFormat::MJPEG => mjpeg_to_rgba(data)?,
        FrameFormat::RAWRGB => packed_to_rgba(data, width, height, PackedLayout::Rgb)?,
        FrameFormat::RAWBGR => packed_to_rgba(data, width, height, PackedLayout::Bgr)?,
        FrameFormat::GRAY => packed_to_rgba(data, width, height, PackedLayout::Gray)?,
    };

    Ok(Frame::new(rgba, width, height))
}

fn ensure_len(format: &'static str, data: &[u8], expected: usize) -> Result<(), FrameDecodeError> {
    if data.len() < expected {
        return Err(FrameDecodeError::ShortBuffer {
            format,
            got: data.len(),
            expected,
        });
    }
    Ok(())
}

fn nv12_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameDecodeError> {
    let luma_len = width as usize * height as usize;
    let chroma_len = luma_len / 2;
    ensure_len("NV12", data, luma_len + chroma_len)?;

    let image = YuvBiPlanarImage {
        y_plane: &data[..luma_len],
        y_stride: width,
        uv_plane: &data[luma_len..luma_len + chroma_len],
        uv_stride: width,
        width,
        height,
    };

    let mut rgba = vec![0u8; luma_len * 4];
    yuv_nv12_to_rgba(
        &image,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| FrameDecodeError::Conversion {
        format: "NV12",
        reason: format!("{err:?}"),
    })?;

    Ok(rgba)
}

fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameDecodeError> {
    let pixels = width as usize * height as usize;
    ensure_len("YUYV", data, pixels * 2)?;

    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };

    let mut rgba = vec![0u8; pixels * 4];
    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| FrameDecodeError::Conversion {
        format: "YUYV",
        reason: format!("{err:?}"),
    })?;

    Ok(rgba)
}

fn mjpeg_to_rgba(data: &[u8]) -> Result<Vec<u8>, FrameDecodeError> {
    let conversion = |reason: String| FrameDecodeError::Conversion {
        format: "MJPEG",
        reason,
    };

    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder.decode().map_err(|err| conversion(format!("{err:?}")))?;

    if let Some(info) = decoder.info() {
        let expected = usize::try_from(info.width)
            .and_then(|w| usize::try_from(info.height).map(|h| w * h * 4))
            .map_err(|_| conversion("dimensions do not fit usize".to_string()))?;
        ensure_len("MJPEG", &rgba, expected)?;
    }

    Ok(rgba)
}

/// Expands 1- or 3-channel pixels to opaque RGBA.
pub fn packed_to_rgba(
    data: &[u8],
    width: u32,
    height: u32,
    layout: PackedLayout,
) -> Result<Vec<u8>, FrameDecodeError> {
    let pixels = width as usize * height as usize;
    let channels = layout.channels();
    ensure_len(layout.name(), data, pixels * channels)?;

    let mut rgba = vec![0u8; pixels * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_chunks_exact(channels))
        .for_each(|(dst, src)| {
            let [r, g, b] = match layout {
                PackedLayout::Rgb => [src[0], src[1], src[2]],
                PackedLayout::Bgr => [src[2], src[1], src[0]],
                PackedLayout::Gray => [src[0]; 3],
            };
            dst.copy_from_slice(&[r, g, b, 255]);
        });

    Ok(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgr_is_swapped_to_rgba() {
        let rgba = packed_to_rgba(&[1, 2, 3, 4, 5, 6], 2, 1, PackedLayout::Bgr).unwrap();
        assert_eq!(rgba, vec![3, 2, 1, 255, 6, 5, 4, 255]);
    }

    #[test]
    fn gray_is_replicated() {
        let rgba = packed_to_rgba(&[7, 9], 1, 2, PackedLayout::Gray).unwrap();
        assert_eq!(rgba, vec![7, 7, 7, 255, 9, 9, 9, 255]);
    }

    #[test]
    fn short_buffers_are_rejected() {
        let err = packed_to_rgba(&[0; 5], 2, 1, PackedLayout::Rgb).unwrap_err();
        assert!(matches!(
            err,
            FrameDecodeError::ShortBuffer {
                got: 5,
                expected: 6,
                ..
            }
        ));
    }
}
