// Handshake Badge: Library Root
//
// Everything above the hardware is portable and host-tested. Concrete
// peripheral drivers are only built for the ESP-IDF target.

pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod gesture;
pub mod haptic;
pub mod link;
pub mod orchestrator;
pub mod tag;
pub mod timing;

#[cfg(target_os = "espidf")]
pub mod drivers;

pub use error::FatalError;
pub use orchestrator::{Orchestrator, Settings};
