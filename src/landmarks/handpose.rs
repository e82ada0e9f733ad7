use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    HandLandmarkSource, LandmarkerConfig,
    palm::{PalmDetector, PalmDetectorConfig, crop_from_palm},
    preprocess::{HandCrop, rotated_crop},
};
use crate::{
    model_download::{ModelKind, ensure_model_ready},
    types::{Frame, LandmarkSet, NUM_LANDMARKS},
};

pub const HANDPOSE_INPUT_SIZE: u32 = 224;

/// Palm detection followed by hand-pose estimation, both on ONNX Runtime.
pub struct OrtLandmarker {
    handpose: Session,
    palm_detector: PalmDetector,
    cfg: LandmarkerConfig,
}

impl OrtLandmarker {
    pub fn new(cfg: LandmarkerConfig) -> Result<Self> {
        let palm_path = ensure_model_ready(&cfg.models_dir, ModelKind::PalmDetector)?;
        let handpose_path = ensure_model_ready(&cfg.models_dir, ModelKind::HandposeEstimator)?;

        let palm_detector = PalmDetector::new(
            &palm_path,
            PalmDetectorConfig {
                score_threshold: cfg.min_detection_confidence,
                top_k: cfg.max_hands,
                ..Default::default()
            },
        )?;
        let handpose = load_session(&handpose_path)?;

        log::info!(
            "landmarker ready using {} and {}",
            palm_path.display(),
            handpose_path.display()
        );

        Ok(Self {
            handpose,
            palm_detector,
            cfg,
        })
    }

    fn estimate(&mut self, frame: &Frame, crop: &HandCrop) -> Result<(Vec<(f32, f32)>, f32)> {
        let input = rotated_crop(frame, crop, HANDPOSE_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .handpose
            .run(ort::inputs![tensor])
            .context("failed to run handpose session")?;

        if outputs.len() == 0 {
            return Err(anyhow!("handpose model returned no outputs"));
        }

        let coords: Vec<f32> = outputs[0].try_extract_array::<f32>()?.iter().copied().collect();
        let presence = if outputs.len() > 1 {
            outputs[1]
                .try_extract_array::<f32>()
                .ok()
                .and_then(|arr| arr.iter().next().copied())
                .unwrap_or(0.0)
        } else {
            0.0
        };

        Ok((decode_landmarks(&coords, frame, crop)?, presence))
    }
}

impl HandLandmarkSource for OrtLandmarker {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<LandmarkSet>> {
        let palms = self.palm_detector.detect(frame)?;

        let mut hands = Vec::with_capacity(palms.len());
        for palm in palms.iter().take(self.cfg.max_hands) {
            let crop = crop_from_palm(palm);
            let (points, presence) = self.estimate(frame, &crop)?;
            if presence < self.cfg.min_presence {
                log::trace!("dropping hand with presence {presence:.2}");
                continue;
            }
            hands.push(LandmarkSet::new(points, (presence * palm.score).clamp(0.0, 1.0)));
        }

        Ok(hands)
    }
}

fn load_session(model_path: &Path) -> Result<Session> {
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(2)?
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load ORT session from {}", model_path.display()))
}

/// Turns flat (x, y, z) crop-pixel triples into points normalized to the frame.
pub fn decode_landmarks(flat: &[f32], frame: &Frame, crop: &HandCrop) -> Result<Vec<(f32, f32)>> {
    if flat.len() < NUM_LANDMARKS * 3 {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            NUM_LANDMARKS * 3
        ));
    }

    let (width, height) = (frame.width.max(1) as f32, frame.height.max(1) as f32);
    Ok(flat
        .chunks_exact(3)
        .take(NUM_LANDMARKS)
        .map(|xyz| {
            let (x, y) = crop.to_frame(xyz[0], xyz[1], HANDPOSE_INPUT_SIZE);
            ((x / width).clamp(0.0, 1.0), (y / height).clamp(0.0, 1.0))
        })
        .collect())
}
