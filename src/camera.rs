use anyhow::Result;
use rayon::prelude::*;

use crate::types::Frame;

/// Blocking source of frames for the capture loop.
pub trait FrameSource {
    /// Returns the next frame. An error means the source is gone for good.
    fn next_frame(&mut self) -> Result<Frame>;
}

/// Flips a frame left to right in place, so the user sees a mirror image.
pub fn mirror_horizontal(frame: &mut Frame) {
    let stride = frame.width as usize * 4;
    if stride == 0 {
        return;
    }
    frame.rgba.par_chunks_exact_mut(stride).for_each(|row| {
        let width = row.len() / 4;
        for x in 0..width / 2 {
            let (left, right) = row.split_at_mut((width - 1 - x) * 4);
            left[x * 4..x * 4 + 4].swap_with_slice(&mut right[..4]);
        }
    });
}

#[cfg(feature = "camera-nokhwa")]
pub use self::native::{CameraSource, available_cameras};

#[cfg(feature = "camera-nokhwa")]
mod native {
    use anyhow::{Context, Result, anyhow};
    use nokhwa::{
        Camera,
        pixel_format::RgbFormat,
        query,
        utils::{
            ApiBackend, CameraIndex, CameraInfo, FrameFormat, RequestedFormat,
            RequestedFormatType,
        },
    };

    use super::{FrameSource, mirror_horizontal};
    use crate::{rgba_converter, types::Frame};

    // Give up after this many undecodable frames in a row.
    const MAX_DECODE_FAILURES: u32 = 10;

    // Prefer pixel formats that are widely supported on macOS (the built-in
    // cameras often reject YUYV even though Nokhwa reports it).
    const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
        FrameFormat::RAWRGB,
        FrameFormat::RAWBGR,
        FrameFormat::GRAY,
        FrameFormat::YUYV,
        FrameFormat::NV12,
        FrameFormat::MJPEG,
    ];

    fn requested_formats() -> [RequestedFormat<'static>; 3] {
        [
            RequestedFormat::with_formats(
                RequestedFormatType::AbsoluteHighestFrameRate,
                PREFERRED_PIXEL_FORMATS,
            ),
            // Any format Nokhwa can decode, still preferring a usable frame rate.
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
        ]
    }

    #[derive(Clone, Debug)]
    pub struct CameraDevice {
        pub index: CameraIndex,
        pub label: String,
    }

    pub fn available_cameras() -> Result<Vec<CameraDevice>> {
        let cameras = query(ApiBackend::Auto).context("failed to enumerate cameras")?;
        Ok(cameras
            .into_iter()
            .map(|info: CameraInfo| CameraDevice {
                index: info.index().clone(),
                label: info.human_name(),
            })
            .collect())
    }

    pub struct CameraSource {
        camera: Camera,
        mirror: bool,
    }

    impl CameraSource {
        pub fn open(index: u32, mirror: bool) -> Result<Self> {
            let index = CameraIndex::Index(index);
            let mut last_err = None;

            for requested in requested_formats() {
                match Camera::new(index.clone(), requested) {
                    Ok(mut camera) => match camera.open_stream() {
                        Ok(()) => {
                            log::info!(
                                "camera {index} opened: {} @ {}",
                                camera.camera_format(),
                                camera.info().human_name()
                            );
                            return Ok(Self { camera, mirror });
                        }
                        Err(err) => last_err = Some(err.into()),
                    },
                    Err(err) => last_err = Some(err.into()),
                }
            }

            Err(last_err
                .unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
            .with_context(|| format!("can't access camera {index}"))
        }
    }

    impl FrameSource for CameraSource {
        fn next_frame(&mut self) -> Result<Frame> {
            let mut failures = 0;
            loop {
                let buffer = self.camera.frame().context("camera frame read failed")?;
                match rgba_converter::decode_buffer(&buffer) {
                    Ok(mut frame) => {
                        if self.mirror {
                            mirror_horizontal(&mut frame);
                        }
                        return Ok(frame);
                    }
                    Err(err) if failures + 1 < MAX_DECODE_FAILURES => {
                        failures += 1;
                        log::warn!("failed to decode camera frame: {err}");
                    }
                    Err(err) => {
                        return Err(err).context(format!(
                            "{MAX_DECODE_FAILURES} camera frames in a row could not be decoded"
                        ));
                    }
                }
            }
        }
    }

    impl Drop for CameraSource {
        fn drop(&mut self) {
            if let Err(err) = self.camera.stop_stream() {
                log::warn!("failed to stop camera stream: {err:?}");
            }
        }
    }
}
