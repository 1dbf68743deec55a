//! Remote collaborators: speech-to-text, text-to-speech, and the AI chat
//! backend. All three are narrow blocking-HTTP interfaces; the traits
//! exist so the conversation loop can be tested against mocks.

mod chat;
mod stt;
mod tts;

pub use chat::N8nChatClient;
pub use stt::HttpSttClient;
pub use tts::HttpTtsClient;

use crate::error::Result;

/// Transcribe a WAV clip to text. An empty string means the service
/// heard nothing it could transcribe.
pub trait SpeechToText: Send + Sync {
    fn transcribe(&self, wav: &[u8]) -> Result<String>;
}

/// Synthesize speech for a sentence, returning WAV bytes.
pub trait TextToSpeech: Send + Sync {
    fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Dispatch a user message to the AI backend and return its answer.
pub trait ChatBackend: Send + Sync {
    fn chat(&self, session_id: &str, message: &str) -> Result<String>;
}
