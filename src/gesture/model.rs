// Handshake Badge: Gesture Model Backends
//
// The classifier treats the trained model as an opaque scorer: a flat
// WINDOW_SIZE × NUM_FEATURES window in, one probability per label out.
//
//   1. `SignatureScorer` (default): deterministic motion heuristic, so the
//      rest of the firmware can be developed and tested without the model.
//   2. `TfliteScorer` (feature `tflite-model`): calls the TensorFlow Lite
//      Micro interpreter compiled by build.rs.

use crate::config::*;
use crate::error::InferenceError;
use crate::events::GestureClass;

pub type Scores = [f32; GESTURE_LABEL_COUNT];

pub trait Scorer {
    /// Prepare the backend. Called once when the classifier is initialised.
    fn load(&mut self) -> Result<(), InferenceError> {
        Ok(())
    }

    /// Per-class probabilities for one chronological window.
    fn score(&mut self, input: &[f32; MODEL_INPUT_LEN]) -> Result<Scores, InferenceError>;
}

/// Index and value of the highest score. The first maximum wins on ties.
pub fn arg_max(scores: &Scores) -> (usize, f32) {
    let mut best = (0, scores[0]);
    for (i, &v) in scores.iter().enumerate().skip(1) {
        if v > best.1 {
            best = (i, v);
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Heuristic back-end
// ---------------------------------------------------------------------------

const STILL_MAX_STD: f32 = 0.3;         // m/s², whole-body quiet
const PUMP_MIN_STD: f32 = 1.5;          // m/s² on the dominant axis
const PUMP_MIN_HZ: f32 = 2.0;
const PUMP_MAX_HZ: f32 = 6.0;

/// Recognises the coarse signature of a handshake: a strong, periodic
/// pumping motion at 2–6 Hz along one linear-acceleration axis.
#[derive(Debug, Default)]
pub struct SignatureScorer;

impl SignatureScorer {
    pub fn new() -> Self {
        Self
    }

    fn distribution(winner: GestureClass, confidence: f32) -> Scores {
        let rest = (1.0 - confidence) / (GESTURE_LABEL_COUNT - 1) as f32;
        let mut scores = [rest; GESTURE_LABEL_COUNT];
        scores[winner.index()] = confidence;
        scores
    }
}

impl Scorer for SignatureScorer {
    fn score(&mut self, input: &[f32; MODEL_INPUT_LEN]) -> Result<Scores, InferenceError> {
        let mut means = [0.0f32; 3];
        for row in input.chunks_exact(NUM_FEATURES) {
            for axis in 0..3 {
                means[axis] += row[axis];
            }
        }
        for m in &mut means {
            *m /= WINDOW_SIZE as f32;
        }

        let mut variances = [0.0f32; 3];
        for row in input.chunks_exact(NUM_FEATURES) {
            for axis in 0..3 {
                let d = row[axis] - means[axis];
                variances[axis] += d * d;
            }
        }
        for v in &mut variances {
            *v /= WINDOW_SIZE as f32;
        }

        let total_std = variances.iter().sum::<f32>().sqrt();
        if total_std < STILL_MAX_STD {
            return Ok(Self::distribution(GestureClass::Still, 0.92));
        }

        let (axis, dominant_var) = variances
            .iter()
            .copied()
            .enumerate()
            .fold((0, 0.0f32), |best, (i, v)| if v > best.1 { (i, v) } else { best });

        if dominant_var.sqrt() < PUMP_MIN_STD {
            return Ok(Self::distribution(GestureClass::Walking, 0.7));
        }

        let mut crossings = 0u32;
        let mut prev = input[axis] - means[axis];
        for row in input.chunks_exact(NUM_FEATURES).skip(1) {
            let cur = row[axis] - means[axis];
            if prev * cur < 0.0 {
                crossings += 1;
            }
            if cur != 0.0 {
                prev = cur;
            }
        }

        let window_s = (WINDOW_SIZE as u32 * SAMPLE_INTERVAL_MS) as f32 / 1000.0;
        let hz = crossings as f32 / 2.0 / window_s;
        log::debug!(
            "signature: axis={} std={:.2} f={:.1}Hz",
            axis,
            dominant_var.sqrt(),
            hz
        );

        let scores = if (PUMP_MIN_HZ..=PUMP_MAX_HZ).contains(&hz) {
            Self::distribution(GestureClass::Handshake, 0.95)
        } else if hz > PUMP_MAX_HZ {
            Self::distribution(GestureClass::Waving, 0.85)
        } else {
            Self::distribution(GestureClass::Walking, 0.8)
        };
        Ok(scores)
    }
}

// ---------------------------------------------------------------------------
// TensorFlow Lite Micro back-end
// ---------------------------------------------------------------------------
#[cfg(feature = "tflite-model")]
mod ffi {
    extern "C" {
        /// Builds the interpreter inside `arena` and allocates tensors.
        pub fn handshake_model_init(arena: *mut u8, arena_len: usize) -> i32;

        /// Copies `input` into the input tensor, invokes, copies the output.
        pub fn handshake_model_invoke(
            input: *const f32,
            input_len: usize,
            output: *mut f32,
            output_len: usize,
        ) -> i32;
    }
}

#[cfg(feature = "tflite-model")]
pub struct TfliteScorer {
    arena: Vec<u8>,
    loaded: bool,
}

#[cfg(feature = "tflite-model")]
impl TfliteScorer {
    pub fn new() -> Self {
        Self {
            arena: vec![0u8; TENSOR_ARENA_SIZE],
            loaded: false,
        }
    }
}

#[cfg(feature = "tflite-model")]
impl Scorer for TfliteScorer {
    fn load(&mut self) -> Result<(), InferenceError> {
        if self.loaded {
            return Ok(());
        }
        // SAFETY: the arena outlives the interpreter; both are owned by self
        // and the interpreter is only touched from the main loop.
        let status = unsafe { ffi::handshake_model_init(self.arena.as_mut_ptr(), self.arena.len()) };
        if status != 0 {
            return Err(InferenceError::Invoke(status));
        }
        self.loaded = true;
        log::info!("Gesture model loaded ({} byte arena)", self.arena.len());
        Ok(())
    }

    fn score(&mut self, input: &[f32; MODEL_INPUT_LEN]) -> Result<Scores, InferenceError> {
        if !self.loaded {
            return Err(InferenceError::NotLoaded);
        }
        let mut scores = [0.0f32; GESTURE_LABEL_COUNT];
        let status = unsafe {
            ffi::handshake_model_invoke(
                input.as_ptr(),
                input.len(),
                scores.as_mut_ptr(),
                scores.len(),
            )
        };
        if status != 0 {
            return Err(InferenceError::Invoke(status));
        }
        Ok(scores)
    }
}
