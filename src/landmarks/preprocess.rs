use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::Frame;

/// Maps points from a square, letterboxed model input back to the frame.
#[derive(Clone, Debug)]
pub struct Letterbox {
    pub input_size: u32,
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    /// `x` and `y` are relative to the model input (0..1).
    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        let size = self.input_size as f32;
        ((x * size - self.pad_x) / self.scale, (y * size - self.pad_y) / self.scale)
    }
}

/// Rotated square region of the frame that contains one hand.
#[derive(Clone, Debug, PartialEq)]
pub struct HandCrop {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
}

impl HandCrop {
    /// Maps a pixel of the `output_size` crop to frame pixel coordinates.
    pub fn to_frame(&self, x: f32, y: f32, output_size: u32) -> (f32, f32) {
        let half = output_size as f32 / 2.0;
        let scale = self.side / output_size as f32;
        let dx = (x - half) * scale;
        let dy = (y - half) * scale;
        let (sin, cos) = self.angle.sin_cos();
        (
            self.center.0 + dx * cos - dy * sin,
            self.center.1 + dx * sin + dy * cos,
        )
    }
}

fn check_frame(frame: &Frame) -> Result<()> {
    let expected = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected || expected == 0 {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {} for {}x{}",
            frame.rgba.len(),
            expected,
            frame.width,
            frame.height
        ));
    }
    Ok(())
}

/// Resizes the frame into a black square of `size` pixels, keeping its
/// aspect ratio, and returns it as a normalized NHWC RGB tensor.
pub fn letterbox(frame: &Frame, size: u32) -> Result<(Array4<f32>, Letterbox)> {
    check_frame(frame)?;

    let scale = size as f32 / frame.width.max(frame.height) as f32;
    let new_w = ((frame.width as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((frame.height as f32 * scale).round() as u32).clamp(1, size);

    let src = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    fir::Resizer::new()
        .resize(&src, &mut dst, Some(&options))
        .context("fast resize failed")?;
    let resized = dst.into_vec();

    let pad_x = ((size - new_w) / 2) as usize;
    let pad_y = ((size - new_h) / 2) as usize;
    let side = size as usize;
    let row_len = new_w as usize * 3;

    let mut data = vec![0.0f32; side * side * 3];
    data.par_chunks_exact_mut(side * 3)
        .skip(pad_y)
        .take(new_h as usize)
        .zip(resized.par_chunks_exact(new_w as usize * 4))
        .for_each(|(dst_row, src_row)| {
            let dst_row = &mut dst_row[pad_x * 3..pad_x * 3 + row_len];
            for (dst_px, src_px) in dst_row.chunks_exact_mut(3).zip(src_row.chunks_exact(4)) {
                dst_px[0] = src_px[0] as f32 / 255.0;
                dst_px[1] = src_px[1] as f32 / 255.0;
                dst_px[2] = src_px[2] as f32 / 255.0;
            }
        });

    let input = Array4::from_shape_vec((1, side, side, 3), data)
        .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    Ok((
        input,
        Letterbox {
            input_size: size,
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
        },
    ))
}

/// Samples the rotated `crop` into an `output_size` square NHWC RGB tensor.
pub fn rotated_crop(frame: &Frame, crop: &HandCrop, output_size: u32) -> Result<Array4<f32>> {
    check_frame(frame)?;

    let side = output_size as usize;
    let mut data = vec![0.0f32; side * side * 3];
    data.par_chunks_exact_mut(side * 3)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(3).enumerate() {
                let (sx, sy) = crop.to_frame(x as f32 + 0.5, y as f32 + 0.5, output_size);
                px.copy_from_slice(&sample_bilinear(frame, sx, sy));
            }
        });

    Array4::from_shape_vec((1, side, side, 3), data)
        .map_err(|err| anyhow!("failed to build crop tensor: {err}"))
}

fn sample_bilinear(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if !x.is_finite() || !y.is_finite() {
        return [0.0; 3];
    }
    // Sample at pixel centers.
    let x = x - 0.5;
    let y = y - 0.5;
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let pixel = |px: f32, py: f32| -> [f32; 3] {
        if px < 0.0 || py < 0.0 || px >= frame.width as f32 || py >= frame.height as f32 {
            return [0.0; 3];
        }
        let idx = (py as usize * frame.width as usize + px as usize) * 4;
        [
            frame.rgba[idx] as f32 / 255.0,
            frame.rgba[idx + 1] as f32 / 255.0,
            frame.rgba[idx + 2] as f32 / 255.0,
        ]
    };

    let top = [pixel(x0, y0), pixel(x0 + 1.0, y0)];
    let bottom = [pixel(x0, y0 + 1.0), pixel(x0 + 1.0, y0 + 1.0)];
    let mut out = [0.0; 3];
    for c in 0..3 {
        let t = top[0][c] + (top[1][c] - top[0][c]) * fx;
        let b = bottom[0][c] + (bottom[1][c] - bottom[0][c]) * fx;
        out[c] = t + (b - t) * fy;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, value: u8) -> Frame {
        Frame::new(vec![value; (width * height * 4) as usize], width, height)
    }

    #[test]
    fn letterbox_pads_short_side() {
        let frame = solid(40, 20, 255);
        let (input, lb) = letterbox(&frame, 8).unwrap();
        assert_eq!(input.shape(), &[1, 8, 8, 3]);
        assert_eq!((lb.pad_x, lb.pad_y), (0.0, 2.0));
        // padding rows stay black, content rows are white
        assert_eq!(input[[0, 0, 4, 0]], 0.0);
        assert!((input[[0, 4, 4, 0]] - 1.0).abs() < 0.01);
    }

    #[test]
    fn letterbox_maps_back_to_frame() {
        let frame = solid(40, 20, 0);
        let (_, lb) = letterbox(&frame, 8).unwrap();
        let (x, y) = lb.to_frame(0.5, 0.5);
        assert!((x - 20.0).abs() < 1e-4);
        assert!((y - 10.0).abs() < 1e-4);
    }

    #[test]
    fn unrotated_crop_center_maps_to_crop_center() {
        let crop = HandCrop {
            center: (50.0, 40.0),
            side: 20.0,
            angle: 0.0,
        };
        assert_eq!(crop.to_frame(112.0, 112.0, 224), (50.0, 40.0));
        let (x, y) = crop.to_frame(0.0, 0.0, 224);
        assert!((x - 40.0).abs() < 1e-4 && (y - 30.0).abs() < 1e-4, "({x}, {y})");
    }

    #[test]
    fn crop_outside_frame_is_black() {
        let frame = solid(10, 10, 255);
        let crop = HandCrop {
            center: (-100.0, -100.0),
            side: 10.0,
            angle: 0.3,
        };
        let tensor = rotated_crop(&frame, &crop, 4).unwrap();
        assert!(tensor.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        let frame = Frame::new(vec![0; 10], 4, 4);
        assert!(letterbox(&frame, 8).is_err());
    }
}
