use thiserror::Error;

use crate::core_modules::camera::AcquisitionError;
use crate::core_modules::classifier::ClassifierError;

/// Why a detection attempt produced no result.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unable to access camera: {0}")]
    AcquisitionDenied(#[from] AcquisitionError),

    #[error("unsupported file type: {0}")]
    UnsupportedFile(String),

    #[error("Human face detected! Only plant leaf images are allowed.")]
    FaceDetected,

    #[error("a classification is already in progress")]
    Busy,

    #[error("camera is not active")]
    CameraInactive,

    #[error("no image selected")]
    NoSelection,

    #[error("classification failed: {0}")]
    Classification(#[from] ClassifierError),

    #[error("camera was stopped before the result was ready")]
    Discarded,
}
