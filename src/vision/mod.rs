//! Recognition Layer
//!
//! Turns a drawing into a label. The pipeline runs leaf-first:
//! ink location, crop with margin, resize and normalize, classifier,
//! label decoding. A preview of the classifier input can be written on the
//! side without affecting the prediction.

pub mod crop;
pub mod ink;
pub mod labels;
pub mod models;
pub mod preprocess;
pub mod preview;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::canvas::Raster;
use crate::config::{PreprocessSettings, PreviewSettings};
use crate::status::{Status, StatusSlot};

pub use labels::{DecodeError, LabelTable, Prediction};
pub use models::{Classifier, ModelError};
pub use preprocess::{preprocess_drawing, PreprocessOutcome};

/// Why a prediction request failed
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionFailure {
    /// The drawing could not be preprocessed
    Preprocess(String),
    /// The classifier call itself failed
    Classifier(ModelError),
    /// Classifier output and label table disagree
    Configuration(DecodeError),
}

/// Result of submitting one drawing
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionOutcome {
    /// A label and confidence
    Predicted(Prediction),
    /// The canvas was empty; nothing was classified
    NoInk,
    /// The classifier has not finished loading
    NotReady,
    /// The classifier failed to load
    Unavailable(String),
    /// The request failed; shared state is unaffected
    Failed(PredictionFailure),
}

enum ClassifierSlot {
    NotLoaded,
    Loading,
    Ready(Box<dyn Classifier>),
    Unavailable(String),
}

/// Coarse readiness of the recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    NotLoaded,
    Loading,
    Ready,
    Unavailable(String),
}

/// Handwritten character recognizer
///
/// Holds the immutable label table and the classifier. Clones share the same
/// classifier; each call to [`submit_drawing`](Self::submit_drawing) works on
/// its own borrowed snapshot of the canvas.
#[derive(Clone)]
pub struct Recognizer {
    labels: Arc<LabelTable>,
    preprocess: PreprocessSettings,
    preview: Option<PreviewSettings>,
    classifier: Arc<Mutex<ClassifierSlot>>,
    status: StatusSlot,
}

impl Recognizer {
    /// Create a recognizer with no classifier loaded yet
    pub fn new(labels: LabelTable, preprocess: PreprocessSettings) -> Self {
        Self {
            labels: Arc::new(labels),
            preprocess,
            preview: None,
            classifier: Arc::new(Mutex::new(ClassifierSlot::NotLoaded)),
            status: StatusSlot::default(),
        }
    }

    /// Write a preview of every preprocessed drawing
    pub fn with_preview(mut self, preview: PreviewSettings) -> Self {
        self.preview = preview.enabled.then_some(preview);
        self
    }

    /// The label table
    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    /// Shared status slot
    pub fn status(&self) -> &StatusSlot {
        &self.status
    }

    /// Current readiness
    pub fn readiness(&self) -> Readiness {
        match &*self.classifier.lock() {
            ClassifierSlot::NotLoaded => Readiness::NotLoaded,
            ClassifierSlot::Loading => Readiness::Loading,
            ClassifierSlot::Ready(_) => Readiness::Ready,
            ClassifierSlot::Unavailable(reason) => Readiness::Unavailable(reason.clone()),
        }
    }

    /// Install an already-loaded classifier
    pub fn install(&self, classifier: Box<dyn Classifier>) -> Result<(), ModelError> {
        let result = self.check_output_len(classifier.as_ref());
        self.finish_load(result.map(|_| classifier))
    }

    /// Load the classifier on a background thread
    ///
    /// Requests submitted before loading completes get
    /// [`PredictionOutcome::NotReady`]. Calling this again after a failure
    /// retries the load.
    pub fn load_in_background<F>(&self, loader: F) -> LoadHandle
    where
        F: FnOnce() -> Result<Box<dyn Classifier>, ModelError> + Send + 'static,
    {
        *self.classifier.lock() = ClassifierSlot::Loading;
        self.status.set(Status::NotReady);

        let (tx, rx) = bounded(1);
        let recognizer = self.clone();

        let thread = std::thread::spawn(move || {
            info!("Loading classifier...");
            let start = Instant::now();

            let result = loader().and_then(|classifier| {
                recognizer.check_output_len(classifier.as_ref())?;
                Ok(classifier)
            });
            let result = recognizer.finish_load(result);

            if result.is_ok() {
                info!("Classifier ready in {:?}", start.elapsed());
            }
            let _ = tx.send(result);
        });

        LoadHandle {
            rx,
            thread: Some(thread),
            recognizer: self.clone(),
        }
    }

    fn check_output_len(&self, classifier: &dyn Classifier) -> Result<(), ModelError> {
        match classifier.output_len() {
            Some(len) if len != self.labels.len() => Err(ModelError::Load(
                DecodeError::LengthMismatch {
                    expected: self.labels.len(),
                    actual: len,
                }
                .to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn finish_load(&self, result: Result<Box<dyn Classifier>, ModelError>) -> Result<(), ModelError> {
        let mut slot = self.classifier.lock();
        match result {
            Ok(classifier) => {
                *slot = ClassifierSlot::Ready(classifier);
                self.status.set(Status::Idle);
                Ok(())
            }
            Err(e) => {
                error!("Classifier unavailable: {}", e);
                *slot = ClassifierSlot::Unavailable(e.to_string());
                self.status.set(Status::Unavailable { reason: e.to_string() });
                Err(e)
            }
        }
    }

    fn precondition(&self) -> Option<PredictionOutcome> {
        match &*self.classifier.lock() {
            ClassifierSlot::Ready(_) => None,
            ClassifierSlot::NotLoaded | ClassifierSlot::Loading => Some(PredictionOutcome::NotReady),
            ClassifierSlot::Unavailable(reason) => Some(PredictionOutcome::Unavailable(reason.clone())),
        }
    }

    /// Classify one drawing
    ///
    /// Intermediate rasters and tensors live only for the duration of this
    /// call and are dropped on every return path.
    pub fn submit_drawing(&self, raster: &Raster) -> PredictionOutcome {
        let outcome = self.run_pipeline(raster);
        self.status.set(Status::from(&outcome));
        outcome
    }

    fn run_pipeline(&self, raster: &Raster) -> PredictionOutcome {
        if let Some(outcome) = self.precondition() {
            warn!("Prediction requested before the classifier is ready");
            return outcome;
        }

        self.status.set(Status::Predicting);
        let start = Instant::now();

        let preprocessed = match preprocess_drawing(raster, &self.preprocess) {
            Ok(PreprocessOutcome::Ready(p)) => p,
            Ok(PreprocessOutcome::NoInk) => return PredictionOutcome::NoInk,
            Err(e) => return PredictionOutcome::Failed(PredictionFailure::Preprocess(e.to_string())),
        };

        if let Some(settings) = &self.preview {
            if let Err(e) = preview::save_preview(&preprocessed.grid(), &settings.path, settings.scale) {
                warn!("Preview not rendered: {:#}", e);
            }
        }

        let scores = {
            let mut slot = self.classifier.lock();
            let ClassifierSlot::Ready(classifier) = &mut *slot else {
                return PredictionOutcome::NotReady;
            };
            classifier.predict(preprocessed.tensor.view())
        };

        let scores = match scores {
            Ok(scores) => scores,
            Err(e) => {
                error!("Error during prediction: {}", e);
                return PredictionOutcome::Failed(PredictionFailure::Classifier(e));
            }
        };

        match self.labels.decode(&scores) {
            Ok(prediction) => {
                info!(
                    "Predicted {} ({}%) in {:?}",
                    prediction.label,
                    prediction.confidence_text(),
                    start.elapsed()
                );
                PredictionOutcome::Predicted(prediction)
            }
            Err(e) => {
                error!("Classifier and label table disagree: {}", e);
                PredictionOutcome::Failed(PredictionFailure::Configuration(e))
            }
        }
    }
}

/// Completion signal for a background classifier load
pub struct LoadHandle {
    rx: Receiver<Result<(), ModelError>>,
    thread: Option<JoinHandle<()>>,
    recognizer: Recognizer,
}

impl LoadHandle {
    /// Block until loading finishes
    pub fn wait(mut self) -> Result<(), ModelError> {
        let result = self.rx.recv().unwrap_or_else(|_| Err(self.loader_exited()));
        self.join();
        result
    }

    /// Wait up to `timeout`; `None` means still loading
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<Result<(), ModelError>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => {
                self.join();
                Some(result)
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.join();
                Some(Err(self.loader_exited()))
            }
        }
    }

    fn loader_exited(&self) -> ModelError {
        let e = ModelError::Load("loader thread exited before reporting".to_string());
        let mut slot = self.recognizer.classifier.lock();
        if matches!(*slot, ClassifierSlot::Loading) {
            *slot = ClassifierSlot::Unavailable(e.to_string());
            self.recognizer.status.set(Status::Unavailable { reason: e.to_string() });
        }
        e
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                debug!("Classifier loader thread panicked");
            }
        }
    }
}
