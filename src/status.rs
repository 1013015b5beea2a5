//! User-facing status slot
//!
//! A single piece of state describing what the recognizer is doing, rendered
//! as the short messages a front end shows next to the drawing surface.

use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::vision::{PredictionFailure, PredictionOutcome};

/// What the status slot currently says
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Status {
    /// Ready and waiting for a drawing
    Idle,
    /// The classifier is still loading
    NotReady,
    /// The user is drawing
    Drawing,
    /// A prediction is running
    Predicting,
    /// A prediction finished
    Predicted { label: String, confidence: String },
    /// The canvas was empty
    NoInk,
    /// The classifier could not be loaded
    Unavailable { reason: String },
    /// The prediction failed
    Error { reason: String },
}

impl Status {
    /// Whether this status reports a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Status::Unavailable { .. } | Status::Error { .. } | Status::NotReady)
    }
}

impl From<&PredictionOutcome> for Status {
    fn from(outcome: &PredictionOutcome) -> Self {
        match outcome {
            PredictionOutcome::Predicted(prediction) => Status::Predicted {
                label: prediction.display_label.clone(),
                confidence: prediction.confidence_text(),
            },
            PredictionOutcome::NoInk => Status::NoInk,
            PredictionOutcome::NotReady => Status::NotReady,
            PredictionOutcome::Unavailable(reason) => Status::Unavailable {
                reason: reason.clone(),
            },
            PredictionOutcome::Failed(failure) => Status::Error {
                reason: match failure {
                    PredictionFailure::Preprocess(e) => e.clone(),
                    PredictionFailure::Classifier(e) => e.to_string(),
                    PredictionFailure::Configuration(e) => e.to_string(),
                },
            },
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Idle => write!(f, "Draw a character!"),
            Status::NotReady => write!(f, "Model not loaded yet!"),
            Status::Drawing => write!(f, "Drawing..."),
            Status::Predicting => write!(f, "Predicting..."),
            Status::Predicted { label, confidence } => write!(f, "Predicted: {} ({}%)", label, confidence),
            Status::NoInk => write!(f, "Nothing to recognize. Draw a character first!"),
            Status::Unavailable { reason } => write!(f, "Model unavailable: {}", reason),
            Status::Error { reason } => write!(f, "Prediction error: {}", reason),
        }
    }
}

/// Shared, cloneable handle to the current status
#[derive(Debug, Clone)]
pub struct StatusSlot {
    inner: Arc<RwLock<Status>>,
}

impl Default for StatusSlot {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Status::NotReady)),
        }
    }
}

impl StatusSlot {
    /// Replace the current status
    pub fn set(&self, status: Status) {
        *self.inner.write() = status;
    }

    /// Snapshot of the current status
    pub fn get(&self) -> Status {
        self.inner.read().clone()
    }
}
