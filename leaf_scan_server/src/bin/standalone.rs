use std::sync::Arc;

use leaf_scan::config::SessionConfig;
use leaf_scan::core_modules::camera::CameraDevice;
use leaf_scan::session::DetectionSession;
use leaf_scan_server::{AppState, ServerConfig, start_server};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "opencv-camera")]
fn camera_device() -> Arc<dyn CameraDevice> {
    Arc::new(leaf_scan::core_modules::opencv_camera::OpenCvCamera::new(0))
}

#[cfg(not(feature = "opencv-camera"))]
fn camera_device() -> Arc<dyn CameraDevice> {
    Arc::new(leaf_scan::core_modules::camera::UnavailableCamera)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let session = DetectionSession::from_config(&SessionConfig::from_env()).await;
    let state = AppState::new(session, camera_device());

    let handle = start_server(state, ServerConfig::from_env()).await?;
    // Park forever
    handle.await.ok();
    Ok(())
}
