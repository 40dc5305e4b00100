// THEORY:
// The `camera` module is the live-capture acquisition surface. It separates the
// platform (a `CameraDevice` that can open a stream) from the session state the
// pipeline cares about (`CameraCapture`: is a stream active, and who owns it).
//
// Key principles:
// 1.  **Exclusive ownership**: while active, `CameraCapture` is the only owner
//     of the stream. Nothing else can grab frames from it or stop it.
// 2.  **Leak-free lifecycle**: `stop` releases the stream synchronously, and
//     dropping the capture stops it too, so a torn-down surface never leaves a
//     sensor running.
// 3.  **Capture epochs**: every stop advances an epoch counter. A frame taken
//     before a stop carries a `CaptureTicket` that can later tell whether the
//     stream it came from is still the live one.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core_modules::frame::RgbaFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Facing {
    /// Front camera, towards the user.
    User,
    /// Rear camera, away from the user.
    Environment,
}

/// What the capture surface asks the platform for. Dimensions are preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraConstraints {
    pub width: u32,
    pub height: u32,
    pub facing: Facing,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            facing: Facing::Environment,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum AcquisitionError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera available")]
    NoDevice,
    #[error("camera stream failed: {0}")]
    Stream(String),
}

/// An open camera stream.
pub trait CameraStream: Send {
    fn grab_frame(&mut self) -> Result<RgbaFrame, AcquisitionError>;

    /// Releases every underlying track. Must be idempotent.
    fn stop(&mut self);
}

/// A platform camera that can be asked for a stream.
pub trait CameraDevice: Send + Sync {
    fn open(&self, constraints: CameraConstraints) -> BoxFuture<'_, Result<Box<dyn CameraStream>, AcquisitionError>>;
}

/// The device used when no camera backend is compiled in.
pub struct UnavailableCamera;

impl CameraDevice for UnavailableCamera {
    fn open(&self, _constraints: CameraConstraints) -> BoxFuture<'_, Result<Box<dyn CameraStream>, AcquisitionError>> {
        async { Err(AcquisitionError::NoDevice) }.boxed()
    }
}

/// A device that serves a single still image as every frame.
pub struct StillImageCamera {
    path: PathBuf,
}

impl StillImageCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

struct StillImageStream {
    frame: RgbaFrame,
    stopped: bool,
}

impl CameraStream for StillImageStream {
    fn grab_frame(&mut self) -> Result<RgbaFrame, AcquisitionError> {
        if self.stopped {
            return Err(AcquisitionError::Stream("stream stopped".to_string()));
        }
        Ok(self.frame.clone())
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

impl CameraDevice for StillImageCamera {
    fn open(&self, constraints: CameraConstraints) -> BoxFuture<'_, Result<Box<dyn CameraStream>, AcquisitionError>> {
        async move {
            let path = self.path.clone();
            let image = tokio::task::spawn_blocking(move || image::open(path))
                .await
                .map_err(|e| AcquisitionError::Stream(e.to_string()))?
                .map_err(|e| match e {
                    image::ImageError::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
                        AcquisitionError::NoDevice
                    }
                    other => AcquisitionError::Stream(other.to_string()),
                })?;
            let frame = RgbaFrame::from_image(&image);
            debug!(
                requested_width = constraints.width,
                requested_height = constraints.height,
                width = frame.width(),
                height = frame.height(),
                "still image stream opened"
            );
            Ok(Box::new(StillImageStream { frame, stopped: false }) as Box<dyn CameraStream>)
        }
        .boxed()
    }
}

/// Identifies the stream a frame was captured from.
#[derive(Debug, Clone)]
pub struct CaptureTicket {
    epoch: u64,
    live_epoch: Arc<AtomicU64>,
}

impl CaptureTicket {
    /// `false` once the stream this frame came from has been stopped.
    pub fn is_current(&self) -> bool {
        self.live_epoch.load(Ordering::SeqCst) == self.epoch
    }
}

/// A frame together with the ticket of the stream it came from.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub frame: RgbaFrame,
    pub ticket: CaptureTicket,
}

/// Session state of the live-capture surface.
pub struct CameraCapture {
    device: Arc<dyn CameraDevice>,
    constraints: CameraConstraints,
    /// The active stream, exclusively owned while `Some`.
    stream: Option<Box<dyn CameraStream>>,
    epoch: Arc<AtomicU64>,
}

impl CameraCapture {
    pub fn new(device: Arc<dyn CameraDevice>) -> Self {
        Self::with_constraints(device, CameraConstraints::default())
    }

    pub fn with_constraints(device: Arc<dyn CameraDevice>, constraints: CameraConstraints) -> Self {
        Self {
            device,
            constraints,
            stream: None,
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn constraints(&self) -> CameraConstraints {
        self.constraints
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    /// Opens a stream. On failure the surface stays inactive; there is no retry.
    pub async fn start(&mut self) -> Result<(), AcquisitionError> {
        if self.is_active() {
            return Ok(());
        }
        match self.device.open(self.constraints).await {
            Ok(stream) => {
                self.stream = Some(stream);
                info!(
                    width = self.constraints.width,
                    height = self.constraints.height,
                    facing = ?self.constraints.facing,
                    "camera started"
                );
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "error accessing camera");
                Err(e)
            }
        }
    }

    /// Releases the stream immediately, whether or not an analysis is in flight.
    pub fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            self.epoch.fetch_add(1, Ordering::SeqCst);
            info!("camera stopped");
        }
    }

    /// Grabs the current frame from the active stream.
    pub fn capture(&mut self) -> Result<Option<CapturedFrame>, AcquisitionError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        let frame = stream.grab_frame()?;
        let ticket = CaptureTicket {
            epoch: self.epoch.load(Ordering::SeqCst),
            live_epoch: Arc::clone(&self.epoch),
        };
        Ok(Some(CapturedFrame { frame, ticket }))
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        self.stop();
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedCamera;
    use super::*;
    use crate::core_modules::pixel::pixel::Pixel;

    fn leaf_frame() -> RgbaFrame {
        RgbaFrame::filled(8, 8, Pixel::opaque(40, 140, 50))
    }

    #[test]
    fn default_constraints_prefer_the_rear_camera_at_vga() {
        let constraints = CameraConstraints::default();
        assert_eq!((constraints.width, constraints.height), (640, 480));
        assert_eq!(constraints.facing, Facing::Environment);
    }

    #[tokio::test]
    async fn denial_leaves_the_surface_inactive() {
        let mut capture = CameraCapture::new(Arc::new(ScriptedCamera::denying()));
        assert!(matches!(capture.start().await, Err(AcquisitionError::PermissionDenied)));
        assert!(!capture.is_active());
        assert!(capture.capture().unwrap().is_none());
    }

    #[tokio::test]
    async fn unavailable_camera_reports_no_device() {
        let mut capture = CameraCapture::new(Arc::new(UnavailableCamera));
        assert!(matches!(capture.start().await, Err(AcquisitionError::NoDevice)));
        assert!(!capture.is_active());
    }

    #[tokio::test]
    async fn stop_releases_the_stream_once() {
        let device = ScriptedCamera::serving(leaf_frame());
        let log = Arc::clone(&device.log);
        let mut capture = CameraCapture::new(Arc::new(device));

        capture.start().await.unwrap();
        capture.start().await.unwrap();
        assert!(capture.is_active());
        assert_eq!(log.lock().unwrap().opened, 1);

        capture.stop();
        capture.stop();
        assert!(!capture.is_active());
        assert_eq!(log.lock().unwrap().stopped, 1);
    }

    #[tokio::test]
    async fn dropping_the_capture_stops_the_stream() {
        let device = ScriptedCamera::serving(leaf_frame());
        let log = Arc::clone(&device.log);
        {
            let mut capture = CameraCapture::new(Arc::new(device));
            capture.start().await.unwrap();
        }
        assert_eq!(log.lock().unwrap().stopped, 1);
    }

    #[tokio::test]
    async fn tickets_expire_when_the_stream_stops() {
        let mut capture = CameraCapture::new(Arc::new(ScriptedCamera::serving(leaf_frame())));
        capture.start().await.unwrap();

        let captured = capture.capture().unwrap().expect("camera is active");
        assert_eq!(captured.frame, leaf_frame());
        assert!(captured.ticket.is_current());

        capture.stop();
        assert!(!captured.ticket.is_current());

        capture.start().await.unwrap();
        assert!(!captured.ticket.is_current());
        assert!(capture.capture().unwrap().unwrap().ticket.is_current());
    }

    #[tokio::test]
    async fn still_image_camera_serves_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaf.png");
        image::RgbaImage::from_pixel(5, 3, image::Rgba([40, 140, 50, 255])).save(&path).unwrap();

        let mut capture = CameraCapture::new(Arc::new(StillImageCamera::new(&path)));
        capture.start().await.unwrap();
        let frame = capture.capture().unwrap().unwrap().frame;
        assert_eq!((frame.width(), frame.height()), (5, 3));

        let mut missing = CameraCapture::new(Arc::new(StillImageCamera::new(dir.path().join("nope.png"))));
        assert!(matches!(missing.start().await, Err(AcquisitionError::NoDevice)));
    }
}
