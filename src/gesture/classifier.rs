// Handshake Badge: Gesture Classifier
//
// Polled from the main loop every tick. `collect_sample` feeds the feature
// window at SAMPLE_INTERVAL_MS; `classify` scores the window at most once
// per PROCESS_INTERVAL_MS, and only once the window is full.

use crate::config::*;
use crate::error::FatalError;
use crate::events::{ClassificationResult, SensorData};
use crate::gesture::model::{arg_max, Scorer};
use crate::gesture::window::FeatureWindow;
use crate::timing::IntervalGate;

/// Six-axis inertial source.
pub trait InertialSensor {
    /// Probe and configure the device. An error means the part is absent.
    fn init(&mut self) -> anyhow::Result<()>;

    fn read(&mut self) -> anyhow::Result<SensorData>;
}

pub struct GestureClassifier {
    sensor: Box<dyn InertialSensor>,
    scorer: Box<dyn Scorer>,
    window: FeatureWindow,
    input: [f32; MODEL_INPUT_LEN],
    sample_gate: IntervalGate,
    process_gate: IntervalGate,
    sensor_ready: bool,
    ready: bool,
}

impl GestureClassifier {
    pub fn new(sensor: Box<dyn InertialSensor>, scorer: Box<dyn Scorer>) -> Self {
        Self {
            sensor,
            scorer,
            window: FeatureWindow::new(),
            input: [0.0; MODEL_INPUT_LEN],
            sample_gate: IntervalGate::new(SAMPLE_INTERVAL_MS),
            process_gate: IntervalGate::new(PROCESS_INTERVAL_MS),
            sensor_ready: false,
            ready: false,
        }
    }

    /// Bring up the IMU and the model. A missing IMU is fatal; a model that
    /// fails to load only degrades to empty classifications.
    pub fn init(&mut self) -> Result<(), FatalError> {
        if let Err(e) = self.sensor.init() {
            log::error!("IMU init failed: {:#}", e);
            return Err(FatalError::HardwareAbsent("inertial sensor"));
        }
        if let Err(e) = self.scorer.load() {
            log::error!("Gesture model unavailable: {}", e);
        }
        self.sensor_ready = true;
        self.reset();
        log::info!("Gesture classifier ready");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.sensor_ready
    }

    /// Whether the window holds WINDOW_SIZE samples.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Read one sample into the window if the sample interval has elapsed.
    /// Silently does nothing before `init` or between intervals.
    pub fn collect_sample(&mut self, now: u32) {
        if !self.sensor_ready || !self.sample_gate.is_open(now) {
            return;
        }

        match self.sensor.read() {
            Ok(data) => {
                self.sample_gate.try_pass(now);
                self.window.push(data.to_features());
                if self.window.is_full() {
                    self.ready = true;
                }
            }
            Err(e) => log::warn!("IMU read error: {:#}", e),
        }
    }

    /// Score the window. Returns `None` until the window is full, between
    /// processing intervals, and when the model invocation fails.
    pub fn classify(&mut self, now: u32) -> Option<ClassificationResult> {
        if !self.ready || !self.process_gate.try_pass(now) {
            return None;
        }

        self.window.write_chronological(&mut self.input);
        let scores = match self.scorer.score(&self.input) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Inference failed: {}", e);
                return None;
            }
        };

        let (class_id, confidence) = arg_max(&scores);
        log::debug!("Gesture: class {} ({:.1}%)", class_id, confidence * 100.0);
        Some(ClassificationResult { class_id, confidence })
    }

    /// Drop all buffered samples so a consumed gesture cannot re-trigger.
    pub fn reset(&mut self) {
        self.window.clear();
        self.sample_gate.reset();
        self.ready = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use crate::gesture::model::Scores;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingSensor {
        present: bool,
        next: f32,
    }

    impl InertialSensor for CountingSensor {
        fn init(&mut self) -> anyhow::Result<()> {
            if self.present {
                Ok(())
            } else {
                anyhow::bail!("no ACK")
            }
        }

        fn read(&mut self) -> anyhow::Result<SensorData> {
            self.next += 1.0;
            Ok(SensorData { ax: self.next, ..Default::default() })
        }
    }

    /// Scores class 4 at 0.97 unless told to fail; counts invocations.
    struct FixedScorer {
        fail: bool,
        calls: Rc<Cell<u32>>,
    }

    impl Scorer for FixedScorer {
        fn score(&mut self, _input: &[f32; MODEL_INPUT_LEN]) -> Result<Scores, InferenceError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(InferenceError::Invoke(1));
            }
            let mut s = [0.0; GESTURE_LABEL_COUNT];
            s[4] = 0.97;
            s[8] = 0.03;
            Ok(s)
        }
    }

    fn classifier(fail: bool) -> (GestureClassifier, Rc<Cell<u32>>) {
        let calls = Rc::new(Cell::new(0));
        let mut c = GestureClassifier::new(
            Box::new(CountingSensor { present: true, next: 0.0 }),
            Box::new(FixedScorer { fail, calls: Rc::clone(&calls) }),
        );
        c.init().unwrap();
        (c, calls)
    }

    /// Feed `n` samples spaced exactly one interval apart; returns next time.
    fn feed(c: &mut GestureClassifier, start: u32, n: usize) -> u32 {
        let mut now = start;
        for _ in 0..n {
            c.collect_sample(now);
            now += SAMPLE_INTERVAL_MS;
        }
        now
    }

    #[test]
    fn missing_sensor_is_fatal() {
        let mut c = GestureClassifier::new(
            Box::new(CountingSensor { present: false, next: 0.0 }),
            Box::new(NullScorer),
        );
        assert_eq!(c.init(), Err(FatalError::HardwareAbsent("inertial sensor")));
        assert!(!c.is_initialized());
    }

    struct NullScorer;
    impl Scorer for NullScorer {
        fn score(&mut self, _input: &[f32; MODEL_INPUT_LEN]) -> Result<Scores, InferenceError> {
            Ok([0.0; GESTURE_LABEL_COUNT])
        }
    }

    #[test]
    fn sampling_before_init_is_a_no_op() {
        let mut c = GestureClassifier::new(
            Box::new(CountingSensor { present: true, next: 0.0 }),
            Box::new(NullScorer),
        );
        feed(&mut c, 0, WINDOW_SIZE);
        assert!(!c.is_ready());
    }

    #[test]
    fn ready_after_exactly_window_size_samples() {
        let (mut c, calls) = classifier(false);
        let now = feed(&mut c, 0, WINDOW_SIZE - 1);
        assert!(!c.is_ready());
        assert_eq!(c.classify(now), None);
        assert_eq!(calls.get(), 0);

        let now = feed(&mut c, now, 1);
        assert!(c.is_ready());
        let r = c.classify(now).unwrap();
        assert_eq!(r.class_id, 4);
        assert!((r.confidence - 0.97).abs() < 1e-6);
    }

    #[test]
    fn samples_inside_interval_are_dropped() {
        let (mut c, _) = classifier(false);
        // Three calls per interval still only yield one sample each.
        let mut now = 0;
        for _ in 0..WINDOW_SIZE - 1 {
            c.collect_sample(now);
            c.collect_sample(now + 1);
            c.collect_sample(now + SAMPLE_INTERVAL_MS - 1);
            now += SAMPLE_INTERVAL_MS;
        }
        assert!(!c.is_ready());
    }

    #[test]
    fn second_classify_within_interval_is_empty() {
        let (mut c, calls) = classifier(false);
        let now = feed(&mut c, 0, WINDOW_SIZE);
        assert!(c.classify(now).is_some());
        assert!(c.classify(now + PROCESS_INTERVAL_MS - 1).is_none());
        assert_eq!(calls.get(), 1);
        assert!(c.classify(now + PROCESS_INTERVAL_MS).is_some());
    }

    #[test]
    fn failed_inference_is_empty_not_fatal() {
        let (mut c, calls) = classifier(true);
        let now = feed(&mut c, 0, WINDOW_SIZE);
        assert_eq!(c.classify(now), None);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn reset_requires_a_fresh_window() {
        let (mut c, _) = classifier(false);
        let now = feed(&mut c, 0, WINDOW_SIZE);
        assert!(c.is_ready());
        c.reset();
        assert!(!c.is_ready());
        let now = feed(&mut c, now, WINDOW_SIZE - 1);
        assert!(!c.is_ready());
        feed(&mut c, now, 1);
        assert!(c.is_ready());
    }
}
