// Handshake Badge: Haptic Feedback
//
// Non-blocking vibration pulses. `activate` switches the motor on and
// records when; `service`, called every loop tick, switches it off once the
// pulse has run its course.

use crate::timing::Deadline;

/// PWM-driven motor output, duty 0 (off) to 255 (full power).
pub trait MotorOutput {
    fn set_duty(&mut self, duty: u8);
}

pub struct Haptic {
    motor: Box<dyn MotorOutput>,
    pulse: Option<Deadline>,
}

impl Haptic {
    pub fn new(motor: Box<dyn MotorOutput>) -> Self {
        Self { motor, pulse: None }
    }

    /// Start a pulse, replacing any pulse still running.
    pub fn activate(&mut self, power: u8, duration_ms: u32, now: u32) {
        self.motor.set_duty(power);
        self.pulse = Some(Deadline::starting_at(now, duration_ms));
    }

    pub fn service(&mut self, now: u32) {
        if let Some(pulse) = self.pulse {
            if pulse.has_elapsed(now) {
                self.motor.set_duty(0);
                self.pulse = None;
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.pulse.is_some()
    }
}
