use std::time::Duration;

use crate::error::{AssistantError, Result};
use crate::services::SpeechToText;

/// Blocking client for the `/stt` endpoint: POST the WAV clip, get back
/// `{"text": "..."}`.
pub struct HttpSttClient {
    agent: ureq::Agent,
    url: String,
}

impl HttpSttClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout(timeout)
            .build();
        Self {
            agent,
            url: format!("{}/stt", base_url.trim_end_matches('/')),
        }
    }
}

impl SpeechToText for HttpSttClient {
    fn transcribe(&self, wav: &[u8]) -> Result<String> {
        let response = self
            .agent
            .post(&self.url)
            .set("Content-Type", "audio/wav")
            .send_bytes(wav)
            .map_err(|e| AssistantError::Stt(format!("request failed: {}", e)))?;

        let body: serde_json::Value = response
            .into_json()
            .map_err(|e| AssistantError::Stt(format!("invalid response: {}", e)))?;

        let text = body
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string();

        log::debug!("STT transcript: '{}'", text);
        Ok(text)
    }
}
