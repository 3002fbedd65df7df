//! Voice input orchestration
//!
//! `machine` holds the transition table as a pure function over inputs and
//! effects. `driver` runs it on a tokio task against a real capture session
//! and duplex channel.

pub mod driver;
pub mod machine;
pub mod state;

pub use driver::{RoutesCallback, StationsCallback, VoiceInputCallbacks, VoiceInputOrchestrator};
pub use machine::{Effect, Input, StateMachine};
pub use state::{DisplayTimings, RecognizedStations, VoiceInputSnapshot, VoiceInputState};
