// THEORY:
// A `DetectionSession` is the single object both acquisition surfaces share.
// It owns everything that must be consistent across them:
//
// 1.  **One busy flag**: classification is globally mutually exclusive. A
//     trigger while busy fails fast with `PipelineError::Busy`; nothing queues.
//     The flag is held through a `BusyGuard`, so every exit path (result, face
//     rejection, classifier error) releases it.
// 2.  **One history**: successful results are prepended in completion order.
//     Failed or rejected attempts never touch it.
// 3.  **Stop does not cancel**: stopping the camera releases the stream at
//     once, but an analysis already in flight still completes and is kept,
//     unless `discard_after_stop` is set, in which case its capture ticket is
//     checked before committing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};

use crate::config::SessionConfig;
use crate::core_modules::camera::{CameraCapture, CaptureTicket};
use crate::core_modules::catalog::DiseaseCatalog;
use crate::core_modules::classifier::{Classifier, RandomClassifier};
use crate::core_modules::detection::DetectionResult;
use crate::core_modules::face_guard::FaceGuard;
use crate::core_modules::history::ResultHistory;
use crate::core_modules::upload::FileUpload;
use crate::error::PipelineError;
use crate::pipeline::{DetectionPipeline, Source};

/// The shared "is processing" flag.
#[derive(Debug, Clone, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    /// Claims the flag, or fails if an attempt is already in flight.
    pub fn acquire(&self) -> Result<BusyGuard, PipelineError> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| BusyGuard(Arc::clone(&self.0)))
            .map_err(|_| PipelineError::Busy)
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Releases the busy flag when dropped.
#[derive(Debug)]
pub struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct DetectionSession {
    pipeline: DetectionPipeline,
    catalog: Arc<DiseaseCatalog>,
    history: Mutex<ResultHistory>,
    busy: BusyFlag,
    discard_after_stop: bool,
}

impl DetectionSession {
    pub fn new(pipeline: DetectionPipeline, catalog: Arc<DiseaseCatalog>, history: ResultHistory) -> Self {
        Self {
            pipeline,
            catalog,
            history: Mutex::new(history),
            busy: BusyFlag::default(),
            discard_after_stop: false,
        }
    }

    /// Builds the standard session: built-in catalog, placeholder classifier,
    /// and a face guard loaded eagerly from `config.model_dir`.
    pub async fn from_config(config: &SessionConfig) -> Self {
        let catalog = DiseaseCatalog::global();
        let classifier: Arc<dyn Classifier> = Arc::new(RandomClassifier::new(Arc::clone(&catalog), config.latency));
        let face_guard = FaceGuard::load(&config.model_dir).await;
        let history = match config.history_limit {
            Some(limit) => ResultHistory::bounded(limit),
            None => ResultHistory::new(),
        };
        Self::new(DetectionPipeline::new(face_guard, classifier), catalog, history)
            .with_discard_after_stop(config.discard_after_stop)
    }

    pub fn with_discard_after_stop(mut self, discard: bool) -> Self {
        self.discard_after_stop = discard;
        self
    }

    pub fn catalog(&self) -> &DiseaseCatalog {
        &self.catalog
    }

    pub fn face_guard(&self) -> &FaceGuard {
        self.pipeline.face_guard()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    /// Read access to the history. Do not hold across an `.await`.
    pub fn history(&self) -> MutexGuard<'_, ResultHistory> {
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn latest(&self) -> Option<DetectionResult> {
        self.history().latest().cloned()
    }

    pub fn recent(&self, n: usize) -> Vec<DetectionResult> {
        self.history().recent(n).into_iter().cloned().collect()
    }

    /// Grabs the current camera frame and runs it through the full pipeline.
    ///
    /// The camera lock is only held while grabbing the frame, so the camera can
    /// be stopped while the analysis is in flight.
    pub async fn capture_and_analyze(&self, camera: &AsyncMutex<CameraCapture>) -> Result<DetectionResult, PipelineError> {
        let _busy = self.busy.acquire()?;

        let captured = camera.lock().await.capture()?;
        let Some(captured) = captured else {
            return Err(PipelineError::CameraInactive);
        };

        let outcome = self.pipeline.run_capture(&captured.frame).await;
        self.finish(Source::Camera, outcome, Some(&captured.ticket))
    }

    /// Classifies the currently selected upload.
    pub async fn analyze_upload(&self, upload: &FileUpload) -> Result<DetectionResult, PipelineError> {
        let _busy = self.busy.acquire()?;

        let Some(preview) = upload.preview().filter(|_| upload.has_selection()) else {
            return Err(PipelineError::NoSelection);
        };

        let outcome = self.pipeline.run_upload(preview).await;
        self.finish(Source::Upload, outcome, None)
    }

    fn finish(
        &self,
        source: Source,
        outcome: Result<DetectionResult, PipelineError>,
        ticket: Option<&CaptureTicket>,
    ) -> Result<DetectionResult, PipelineError> {
        match outcome {
            Ok(result) => {
                if self.discard_after_stop && ticket.is_some_and(|ticket| !ticket.is_current()) {
                    info!(?source, disease = %result.disease, "camera stopped mid-analysis, discarding result");
                    return Err(PipelineError::Discarded);
                }
                info!(
                    ?source,
                    disease = %result.disease,
                    confidence = result.confidence,
                    severity = %result.severity,
                    "detection complete"
                );
                self.history().append(result.clone());
                Ok(result)
            }
            Err(PipelineError::FaceDetected) => {
                warn!(?source, "human face detected, frame rejected");
                Err(PipelineError::FaceDetected)
            }
            Err(e) => {
                error!(?source, error = %e, "detection error");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::camera::testing::ScriptedCamera;
    use crate::core_modules::classifier::{ClassifierError, LatencyWindow};
    use crate::core_modules::face_guard::{FaceBounds, FaceDetectionError, FaceDetector};
    use crate::core_modules::frame::{EncodedImage, RgbaFrame};
    use crate::core_modules::pixel::pixel::Pixel;
    use crate::core_modules::skin_detector::{SkinModelParams, SkinRegionDetector};
    use crate::core_modules::upload::UploadedFile;
    use futures::FutureExt;
    use futures::future::BoxFuture;
    use std::time::Duration;
    use tokio::time::Instant;

    const LEAF: Pixel = Pixel::opaque(40, 140, 50);
    const SKIN: Pixel = Pixel::opaque(224, 172, 140);

    struct FailingClassifier;

    impl Classifier for FailingClassifier {
        fn classify<'a>(&'a self, _image: &'a EncodedImage) -> BoxFuture<'a, Result<DetectionResult, ClassifierError>> {
            async { Err(ClassifierError::Inference("model crashed".to_string())) }.boxed()
        }
    }

    struct AlwaysFace;

    impl FaceDetector for AlwaysFace {
        fn detect_faces(&self, _frame: &RgbaFrame) -> Result<Vec<FaceBounds>, FaceDetectionError> {
            Ok(vec![FaceBounds {
                x: 0,
                y: 0,
                width: 8,
                height: 8,
                confidence: 1.0,
            }])
        }
    }

    fn session_with(face_guard: FaceGuard, classifier: Arc<dyn Classifier>) -> DetectionSession {
        DetectionSession::new(
            DetectionPipeline::new(face_guard, classifier),
            DiseaseCatalog::global(),
            ResultHistory::new(),
        )
    }

    fn random_session(face_guard: FaceGuard) -> DetectionSession {
        let classifier = RandomClassifier::with_seed(DiseaseCatalog::global(), LatencyWindow::default(), 3);
        session_with(face_guard, Arc::new(classifier))
    }

    fn skin_guard() -> FaceGuard {
        FaceGuard::with_detector(Arc::new(SkinRegionDetector::new(SkinModelParams::default()).unwrap()))
    }

    async fn active_camera(frame: RgbaFrame) -> AsyncMutex<CameraCapture> {
        let mut capture = CameraCapture::new(Arc::new(ScriptedCamera::serving(frame)));
        capture.start().await.unwrap();
        AsyncMutex::new(capture)
    }

    fn jpeg_upload() -> FileUpload {
        let mut upload = FileUpload::new();
        assert!(upload.select(UploadedFile::new(
            "leaf.jpg",
            Some("image/jpeg".to_string()),
            vec![0xFF, 0xD8, 0xFF, 0xE0],
        )));
        upload
    }

    #[tokio::test(start_paused = true)]
    async fn valid_upload_lands_at_the_front_of_history() {
        let session = random_session(FaceGuard::disabled());
        let upload = jpeg_upload();

        let started = Instant::now();
        let result = session.analyze_upload(&upload).await.unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(1500) && elapsed <= Duration::from_millis(2500));
        assert!((0.70..=0.95).contains(&result.confidence));
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.latest(), Some(result));
        assert!(!session.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn face_in_frame_leaves_history_unchanged() {
        let session = random_session(FaceGuard::with_detector(Arc::new(AlwaysFace)));
        let camera = active_camera(RgbaFrame::filled(16, 16, LEAF)).await;

        let outcome = session.capture_and_analyze(&camera).await;

        assert!(matches!(outcome, Err(PipelineError::FaceDetected)));
        assert_eq!(
            outcome.unwrap_err().to_string(),
            "Human face detected! Only plant leaf images are allowed."
        );
        assert!(session.history().is_empty());
        assert!(!session.is_busy());
        assert!(camera.lock().await.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn skin_model_screens_real_frames() {
        let session = random_session(skin_guard());

        let mut with_face = RgbaFrame::filled(64, 64, LEAF);
        with_face.fill_rect(16, 16, 24, 32, SKIN);
        let camera = active_camera(with_face).await;
        assert!(matches!(session.capture_and_analyze(&camera).await, Err(PipelineError::FaceDetected)));

        let camera = active_camera(RgbaFrame::filled(64, 64, LEAF)).await;
        let result = session.capture_and_analyze(&camera).await.unwrap();
        assert_eq!(session.latest(), Some(result));
    }

    #[tokio::test(start_paused = true)]
    async fn non_image_upload_triggers_nothing() {
        let session = random_session(FaceGuard::disabled());
        let mut upload = FileUpload::new();

        let accepted = upload.select(UploadedFile::new("notes.txt", Some("text/plain".to_string()), b"hi".to_vec()));

        assert!(!accepted);
        assert!(upload.preview().is_none());
        assert!(matches!(session.analyze_upload(&upload).await, Err(PipelineError::NoSelection)));
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn classifier_failure_releases_the_busy_flag() {
        let session = session_with(FaceGuard::disabled(), Arc::new(FailingClassifier));
        let upload = jpeg_upload();

        for _ in 0..2 {
            let outcome = session.analyze_upload(&upload).await;
            assert!(matches!(outcome, Err(PipelineError::Classification(ClassifierError::Inference(_)))));
            assert!(!session.is_busy());
        }
        assert!(session.history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn second_trigger_while_busy_is_rejected_not_queued() {
        let session = random_session(FaceGuard::disabled());
        let upload = jpeg_upload();
        let camera = active_camera(RgbaFrame::filled(16, 16, LEAF)).await;

        let (first, second, third) = tokio::join!(
            session.analyze_upload(&upload),
            session.analyze_upload(&upload),
            session.capture_and_analyze(&camera),
        );

        assert!(first.is_ok());
        assert!(matches!(second, Err(PipelineError::Busy)));
        assert!(matches!(third, Err(PipelineError::Busy)));
        assert_eq!(session.history().len(), 1);
        assert!(!session.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn results_are_prepended_in_completion_order() {
        let session = random_session(FaceGuard::disabled());
        let upload = jpeg_upload();
        let camera = active_camera(RgbaFrame::filled(16, 16, LEAF)).await;

        let r1 = session.analyze_upload(&upload).await.unwrap();
        let r2 = session.capture_and_analyze(&camera).await.unwrap();
        let r3 = session.analyze_upload(&upload).await.unwrap();

        assert_eq!(session.latest(), Some(r3));
        assert_eq!(session.recent(5), vec![r2, r1]);
    }

    #[tokio::test(start_paused = true)]
    async fn inactive_camera_is_reported() {
        let session = random_session(FaceGuard::disabled());
        let camera = AsyncMutex::new(CameraCapture::new(Arc::new(ScriptedCamera::serving(RgbaFrame::filled(
            8, 8, LEAF,
        )))));

        assert!(matches!(session.capture_and_analyze(&camera).await, Err(PipelineError::CameraInactive)));
        assert!(!session.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_mid_analysis_still_commits_by_default() {
        let session = random_session(FaceGuard::disabled());
        let camera = active_camera(RgbaFrame::filled(16, 16, LEAF)).await;

        let (outcome, ()) = tokio::join!(session.capture_and_analyze(&camera), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            camera.lock().await.stop();
        });

        assert!(outcome.is_ok());
        assert!(!camera.lock().await.is_active());
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_mid_analysis_discards_when_configured() {
        let session = random_session(FaceGuard::disabled()).with_discard_after_stop(true);
        let camera = active_camera(RgbaFrame::filled(16, 16, LEAF)).await;

        let (outcome, ()) = tokio::join!(session.capture_and_analyze(&camera), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            camera.lock().await.stop();
        });

        assert!(matches!(outcome, Err(PipelineError::Discarded)));
        assert!(session.history().is_empty());
        assert!(!session.is_busy());

        camera.lock().await.start().await.unwrap();
        assert!(session.capture_and_analyze(&camera).await.is_ok());
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn from_config_degrades_without_a_model() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            model_dir: dir.path().to_path_buf(),
            latency: LatencyWindow::immediate(),
            history_limit: Some(1),
            ..SessionConfig::default()
        };
        let session = DetectionSession::from_config(&config).await;
        assert!(!session.face_guard().is_active());
        assert_eq!(session.history().limit(), Some(1));

        let camera = active_camera(RgbaFrame::filled(16, 16, LEAF)).await;
        session.capture_and_analyze(&camera).await.unwrap();
        session.capture_and_analyze(&camera).await.unwrap();
        assert_eq!(session.history().len(), 1);
    }
}
