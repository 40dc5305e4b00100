// THEORY:
// The `FaceGuard` is an optional pre-filter on the live-capture path. Before a
// frame is preprocessed or classified, the guard asks a face detector whether a
// person is in view; if so, the whole attempt is rejected.
//
// Key architectural principles:
// 1.  **Pluggable detector**: detection is behind the `FaceDetector` trait. The
//     guard only cares about "zero faces" versus "at least one face".
// 2.  **Eager, one-time loading**: the detector's model is loaded
//     asynchronously when the capture surface comes up, not on first use.
// 3.  **Graceful degradation**: a model that fails to load, or a detector that
//     errors on a frame, never blocks capture. The failure is logged and the
//     guard lets the frame through.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core_modules::frame::RgbaFrame;
use crate::core_modules::skin_detector::SkinRegionDetector;

/// Bounding box of a detected face, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FaceBounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Detector-specific score in `[0, 1]`.
    pub confidence: f32,
}

#[derive(Debug, Error)]
pub enum FaceModelError {
    #[error("face model not found at {0}")]
    Missing(PathBuf),
    #[error("failed to read face model: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed face model: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid face model parameters: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum FaceDetectionError {
    #[error("face detector failed: {0}")]
    Backend(String),
}

/// Pluggable face detection backend.
pub trait FaceDetector: Send + Sync {
    fn detect_faces(&self, frame: &RgbaFrame) -> Result<Vec<FaceBounds>, FaceDetectionError>;
}

/// Screens captured frames for human faces.
#[derive(Clone, Default)]
pub struct FaceGuard {
    /// `None` when screening is disabled or the model failed to load.
    detector: Option<Arc<dyn FaceDetector>>,
}

impl FaceGuard {
    /// A guard that lets every frame through.
    pub fn disabled() -> Self {
        Self { detector: None }
    }

    pub fn with_detector(detector: Arc<dyn FaceDetector>) -> Self {
        Self {
            detector: Some(detector),
        }
    }

    /// Loads the skin-region model from `model_dir`, degrading on failure.
    pub async fn load(model_dir: impl AsRef<Path>) -> Self {
        let model_dir = model_dir.as_ref().to_path_buf();
        Self::from_loader(SkinRegionDetector::load(model_dir)).await
    }

    /// Awaits `loader` once; any error leaves the guard disabled.
    pub async fn from_loader<D, F>(loader: F) -> Self
    where
        D: FaceDetector + 'static,
        F: Future<Output = Result<D, FaceModelError>>,
    {
        match loader.await {
            Ok(detector) => {
                info!("face detection model loaded");
                Self::with_detector(Arc::new(detector))
            }
            Err(e) => {
                warn!(error = %e, "error loading face detection model, face screening disabled");
                Self::disabled()
            }
        }
    }

    /// Whether a detector is loaded.
    pub fn is_active(&self) -> bool {
        self.detector.is_some()
    }

    /// `true` when at least one face is found in `frame`.
    pub async fn contains_face(&self, frame: &RgbaFrame) -> bool {
        let Some(detector) = &self.detector else {
            return false;
        };
        match detector.detect_faces(frame) {
            Ok(faces) => {
                debug!(faces = faces.len(), "face screening complete");
                !faces.is_empty()
            }
            Err(e) => {
                warn!(error = %e, "face detection failed, letting frame through");
                false
            }
        }
    }
}
