mod handpose;
mod palm;
mod preprocess;

use std::path::PathBuf;

use anyhow::Result;

use crate::types::{Frame, LandmarkSet};

pub use handpose::OrtLandmarker;

pub const MAX_HANDS: usize = 1;
pub const DEFAULT_MIN_DETECTION_CONFIDENCE: f32 = 0.7;
// Hand-pose presence below this means the crop holds no hand after all.
const MIN_HAND_PRESENCE: f32 = 0.5;

/// Finds hands in a frame. Returns one landmark set per hand, best first.
pub trait HandLandmarkSource {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<LandmarkSet>>;
}

#[derive(Clone, Debug)]
pub struct LandmarkerConfig {
    pub models_dir: PathBuf,
    pub max_hands: usize,
    pub min_detection_confidence: f32,
    pub min_presence: f32,
}

impl Default for LandmarkerConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            max_hands: MAX_HANDS,
            min_detection_confidence: DEFAULT_MIN_DETECTION_CONFIDENCE,
            min_presence: MIN_HAND_PRESENCE,
        }
    }
}
