use std::io::Read;
use std::time::Duration;

use crate::error::{AssistantError, Result};
use crate::services::TextToSpeech;

/// Cap on a synthesized clip; anything larger is a server bug.
const MAX_WAV_BYTES: u64 = 32 * 1024 * 1024;

/// Blocking client for the `/tts` endpoint: POST the sentence as JSON,
/// get back a WAV body.
pub struct HttpTtsClient {
    agent: ureq::Agent,
    url: String,
}

impl HttpTtsClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout(timeout)
            .build();
        Self {
            agent,
            url: format!("{}/tts", base_url.trim_end_matches('/')),
        }
    }
}

impl TextToSpeech for HttpTtsClient {
    fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let response = self
            .agent
            .post(&self.url)
            .send_json(serde_json::json!({ "text": text, "as": "wav" }))
            .map_err(|e| AssistantError::Tts(format!("request failed: {}", e)))?;

        let mut wav = Vec::new();
        response
            .into_reader()
            .take(MAX_WAV_BYTES)
            .read_to_end(&mut wav)
            .map_err(|e| AssistantError::Tts(format!("reading body: {}", e)))?;

        if wav.is_empty() {
            return Err(AssistantError::Tts("empty audio response".into()));
        }

        log::debug!("TTS returned {} bytes", wav.len());
        Ok(wav)
    }
}
