//! Voice-assistant front end for a physical robot.
//!
//! Captures microphone audio, finds speech boundaries with a hysteresis
//! endpoint detector, transcribes and classifies each utterance, routes
//! it to a local command handler or a remote AI backend, and speaks the
//! answer — while a concurrent barge-in listener watches for a stop
//! command the whole time.

pub mod audio;
pub mod config;
pub mod conversation;
pub mod error;
pub mod eyes;
pub mod interrupt;
pub mod playback;
pub mod services;
pub mod state;
pub mod text;
pub mod vad;

pub use error::{AssistantError, Result};
pub use state::SystemState;
