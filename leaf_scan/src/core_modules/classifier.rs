// THEORY:
// The `classifier` module is the seam where inference happens. Callers only
// ever see the `Classifier` trait: an encoded image goes in, a catalog-enriched
// `DetectionResult` comes out, asynchronously.
//
// `RandomClassifier` is the placeholder behind that seam. It has no model; it
// simulates an inference latency window, draws a label uniformly from the
// catalog and fabricates a confidence in the 70-95% band. A real engine replaces
// it without changing the input type, the output type or the enrichment step.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::debug;

use crate::core_modules::catalog::{DiseaseCatalog, UnknownDiseaseError};
use crate::core_modules::detection::{DetectionResult, round_confidence};
use crate::core_modules::frame::EncodedImage;

/// Lowest synthesized confidence.
pub const CONFIDENCE_FLOOR: f64 = 0.70;
/// Width of the synthesized confidence band above the floor.
pub const CONFIDENCE_SPAN: f64 = 0.25;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error(transparent)]
    UnknownLabel(#[from] UnknownDiseaseError),
    #[error("the disease catalog is empty")]
    EmptyCatalog,
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Turns a preprocessed image into a catalog-enriched result.
pub trait Classifier: Send + Sync {
    fn classify<'a>(&'a self, image: &'a EncodedImage) -> BoxFuture<'a, Result<DetectionResult, ClassifierError>>;
}

/// The half-open `[min, max)` interval a simulated inference takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyWindow {
    pub min: Duration,
    pub max: Duration,
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(1500),
            max: Duration::from_millis(2500),
        }
    }
}

impl LatencyWindow {
    pub fn new(min: Duration, max: Duration) -> Self {
        if max < min { Self { min: max, max: min } } else { Self { min, max } }
    }

    /// No simulated delay at all.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        if max_ms <= min_ms {
            return self.min;
        }
        Duration::from_millis(rng.gen_range(min_ms..max_ms))
    }
}

/// Maps a uniform draw in `[0, 1)` to a rounded confidence in `[0.70, 0.95]`.
pub fn synthesize_confidence(uniform: f64) -> f64 {
    round_confidence(CONFIDENCE_FLOOR + uniform * CONFIDENCE_SPAN)
}

/// Everything random about one classification, drawn up front so the RNG
/// lock is never held across the simulated delay.
struct Draw {
    delay: Duration,
    disease: String,
    confidence: f64,
}

/// The placeholder classifier: random label, fabricated confidence.
pub struct RandomClassifier {
    catalog: Arc<DiseaseCatalog>,
    latency: LatencyWindow,
    rng: Mutex<StdRng>,
}

impl RandomClassifier {
    pub fn new(catalog: Arc<DiseaseCatalog>, latency: LatencyWindow) -> Self {
        Self {
            catalog,
            latency,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// A reproducible classifier for tests and demos.
    pub fn with_seed(catalog: Arc<DiseaseCatalog>, latency: LatencyWindow, seed: u64) -> Self {
        Self {
            catalog,
            latency,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn latency(&self) -> LatencyWindow {
        self.latency
    }

    fn draw(&self) -> Result<Draw, ClassifierError> {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let delay = self.latency.sample(&mut *rng);
        let entry = self
            .catalog
            .entries()
            .choose(&mut *rng)
            .ok_or(ClassifierError::EmptyCatalog)?;
        let confidence = synthesize_confidence(rng.gen_range(0.0..1.0));
        Ok(Draw {
            delay,
            disease: entry.id.clone(),
            confidence,
        })
    }
}

impl Classifier for RandomClassifier {
    fn classify<'a>(&'a self, image: &'a EncodedImage) -> BoxFuture<'a, Result<DetectionResult, ClassifierError>> {
        async move {
            let draw = self.draw()?;
            debug!(
                input_bytes = image.as_str().len(),
                delay_ms = draw.delay.as_millis() as u64,
                "simulating inference"
            );
            tokio::time::sleep(draw.delay).await;

            let entry = self.catalog.lookup(&draw.disease)?;
            Ok(DetectionResult::from_entry(entry, draw.confidence, Utc::now()))
        }
        .boxed()
    }
}
