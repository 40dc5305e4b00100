// THEORY:
// A `CameraDevice` backed by an OpenCV `VideoCapture`. Frames arrive as BGR
// `Mat`s and are converted to the crate's RGBA raster on every grab. OpenCV has
// no notion of a facing mode, so `CameraConstraints::facing` selects nothing
// here; the device index does.

use futures::FutureExt;
use futures::future::BoxFuture;
use opencv::core::Mat;
use opencv::imgproc;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};
use tracing::{debug, warn};

use crate::core_modules::camera::{AcquisitionError, CameraConstraints, CameraDevice, CameraStream};
use crate::core_modules::frame::RgbaFrame;

fn stream_error(e: opencv::Error) -> AcquisitionError {
    AcquisitionError::Stream(e.to_string())
}

/// A local video device, e.g. `/dev/video0` for index 0.
pub struct OpenCvCamera {
    index: i32,
}

impl OpenCvCamera {
    pub fn new(index: i32) -> Self {
        Self { index }
    }
}

struct OpenCvStream {
    cap: VideoCapture,
    bgr: Mat,
}

impl CameraStream for OpenCvStream {
    fn grab_frame(&mut self) -> Result<RgbaFrame, AcquisitionError> {
        if !self.cap.read(&mut self.bgr).map_err(stream_error)? || self.bgr.empty() {
            return Err(AcquisitionError::Stream("no frame available".to_string()));
        }

        let mut rgba = Mat::default();
        imgproc::cvt_color(&self.bgr, &mut rgba, imgproc::COLOR_BGR2RGBA, 0).map_err(stream_error)?;
        let data = rgba.data_bytes().map_err(stream_error)?.to_vec();

        RgbaFrame::new(rgba.cols() as u32, rgba.rows() as u32, data).map_err(|e| AcquisitionError::Stream(e.to_string()))
    }

    fn stop(&mut self) {
        if let Err(e) = self.cap.release() {
            warn!(error = %e, "failed to release video device");
        }
    }
}

impl CameraDevice for OpenCvCamera {
    fn open(&self, constraints: CameraConstraints) -> BoxFuture<'_, Result<Box<dyn CameraStream>, AcquisitionError>> {
        let index = self.index;
        async move {
            let cap = tokio::task::spawn_blocking(move || -> Result<VideoCapture, AcquisitionError> {
                let mut cap = VideoCapture::new(index, videoio::CAP_ANY).map_err(stream_error)?;
                if !cap.is_opened().map_err(stream_error)? {
                    return Err(AcquisitionError::NoDevice);
                }
                cap.set(videoio::CAP_PROP_FRAME_WIDTH, f64::from(constraints.width))
                    .map_err(stream_error)?;
                cap.set(videoio::CAP_PROP_FRAME_HEIGHT, f64::from(constraints.height))
                    .map_err(stream_error)?;
                Ok(cap)
            })
            .await
            .map_err(|e| AcquisitionError::Stream(e.to_string()))??;

            debug!(
                index,
                width = cap.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or_default(),
                height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or_default(),
                "video device opened"
            );
            Ok(Box::new(OpenCvStream { cap, bgr: Mat::default() }) as Box<dyn CameraStream>)
        }
        .boxed()
    }
}
