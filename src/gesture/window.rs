// Handshake Badge: Feature Window
//
// Fixed-capacity ring of the most recent WINDOW_SIZE inertial samples.
// Once full it stays full: every new sample overwrites the oldest one until
// the window is explicitly cleared.

use crate::config::{MODEL_INPUT_LEN, NUM_FEATURES, WINDOW_SIZE};

pub struct FeatureWindow {
    buffer: [[f32; NUM_FEATURES]; WINDOW_SIZE],
    /// Next slot to write; also the oldest sample once the window is full.
    cursor: usize,
    /// Samples held, capped at WINDOW_SIZE.
    filled: usize,
}

impl FeatureWindow {
    pub fn new() -> Self {
        Self {
            buffer: [[0.0; NUM_FEATURES]; WINDOW_SIZE],
            cursor: 0,
            filled: 0,
        }
    }

    pub fn push(&mut self, sample: [f32; NUM_FEATURES]) {
        self.buffer[self.cursor] = sample;
        self.cursor = (self.cursor + 1) % WINDOW_SIZE;
        if self.filled < WINDOW_SIZE {
            self.filled += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn is_full(&self) -> bool {
        self.filled == WINDOW_SIZE
    }

    /// Flatten into model input order: oldest sample first, features
    /// interleaved (`out[i * NUM_FEATURES + f]`).
    pub fn write_chronological(&self, out: &mut [f32; MODEL_INPUT_LEN]) {
        for i in 0..WINDOW_SIZE {
            let slot = (self.cursor + i) % WINDOW_SIZE;
            let row = &mut out[i * NUM_FEATURES..(i + 1) * NUM_FEATURES];
            row.copy_from_slice(&self.buffer[slot]);
        }
    }

    pub fn clear(&mut self) {
        self.buffer = [[0.0; NUM_FEATURES]; WINDOW_SIZE];
        self.cursor = 0;
        self.filled = 0;
    }
}

impl Default for FeatureWindow {
    fn default() -> Self {
        Self::new()
    }
}
