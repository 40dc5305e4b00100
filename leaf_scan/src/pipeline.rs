// THEORY:
// The `pipeline` module strings the stages together. It knows the order of
// operations for each acquisition path and nothing about sessions, busy flags
// or history: that bookkeeping belongs to `session`.
//
// Camera path: face guard → preprocessor → classifier.
// Upload path: classifier only. The upload preview is already an encoded image
// and uploads are not screened for faces.

use std::sync::Arc;

use tracing::debug;

use crate::core_modules::classifier::Classifier;
use crate::core_modules::detection::DetectionResult;
use crate::core_modules::face_guard::FaceGuard;
use crate::core_modules::frame::{EncodedImage, RgbaFrame};
use crate::core_modules::preprocessor::preprocessor;
use crate::error::PipelineError;

/// The acquisition surface an attempt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Camera,
    Upload,
}

pub struct DetectionPipeline {
    face_guard: FaceGuard,
    classifier: Arc<dyn Classifier>,
}

impl DetectionPipeline {
    pub fn new(face_guard: FaceGuard, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            face_guard,
            classifier,
        }
    }

    pub fn face_guard(&self) -> &FaceGuard {
        &self.face_guard
    }

    /// Runs a captured frame through every stage.
    pub async fn run_capture(&self, frame: &RgbaFrame) -> Result<DetectionResult, PipelineError> {
        // Stage 1: Face screening
        if self.face_guard.contains_face(frame).await {
            return Err(PipelineError::FaceDetected);
        }

        // Stage 2: Preprocessing
        let encoded = preprocessor::preprocess(frame);
        debug!(width = frame.width(), height = frame.height(), "frame preprocessed");

        // Stage 3: Classification
        Ok(self.classifier.classify(&encoded).await?)
    }

    /// Classifies an uploaded image as-is.
    pub async fn run_upload(&self, image: &EncodedImage) -> Result<DetectionResult, PipelineError> {
        Ok(self.classifier.classify(image).await?)
    }
}
