pub mod camera;
pub mod catalog;
pub mod classifier;
pub mod detection;
pub mod face_guard;
pub mod frame;
pub mod history;
#[cfg(feature = "opencv-camera")]
pub mod opencv_camera;
pub mod pixel;
pub mod preprocessor;
pub mod skin_detector;
pub mod upload;
