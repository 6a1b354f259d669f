//! Gesture classification over a rolling inertial window.

pub mod classifier;
pub mod model;
pub mod window;

pub use classifier::{GestureClassifier, InertialSensor};
pub use model::{Scorer, SignatureScorer};
#[cfg(feature = "tflite-model")]
pub use model::TfliteScorer;
