// Handshake Badge: Shared Data Types

use crate::config::{GESTURE_LABEL_COUNT, NUM_FEATURES};

// ---------------------------------------------------------------------------
// Inertial Sample (linear acceleration in m/s², angular velocity in °/s)
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorData {
    pub ax: f32,
    pub ay: f32,
    pub az: f32,
    pub gx: f32,
    pub gy: f32,
    pub gz: f32,
}

impl SensorData {
    /// Feature order expected by the model.
    pub fn to_features(self) -> [f32; NUM_FEATURES] {
        [self.ax, self.ay, self.az, self.gx, self.gy, self.gz]
    }
}

// ---------------------------------------------------------------------------
// Gesture Classification
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureClass {
    Dancing,
    Dapup,
    Fistbump,
    Flapping,
    Handshake,
    Highfive,
    Scratch,
    Speedwalking,
    Still,
    Stretch,
    Walking,
    Waving,
}

impl GestureClass {
    /// Model output order.
    pub const ALL: [GestureClass; GESTURE_LABEL_COUNT] = [
        Self::Dancing,
        Self::Dapup,
        Self::Fistbump,
        Self::Flapping,
        Self::Handshake,
        Self::Highfive,
        Self::Scratch,
        Self::Speedwalking,
        Self::Still,
        Self::Stretch,
        Self::Walking,
        Self::Waving,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Dancing => "dancing",
            Self::Dapup => "dapup",
            Self::Fistbump => "fistbump",
            Self::Flapping => "flapping",
            Self::Handshake => "handshake",
            Self::Highfive => "highfive",
            Self::Scratch => "scratch",
            Self::Speedwalking => "speedwalking",
            Self::Still => "still",
            Self::Stretch => "stretch",
            Self::Walking => "walking",
            Self::Waving => "waving",
        }
    }
}

/// Raw arg-max of one inference pass. Thresholding is the orchestrator's job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationResult {
    pub class_id: usize,
    pub confidence: f32,
}

impl ClassificationResult {
    pub fn class(&self) -> Option<GestureClass> {
        GestureClass::from_index(self.class_id)
    }
}
