use std::thread;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::error::{AssistantError, Result};
use crate::services::ChatBackend;

#[derive(Serialize)]
struct ChatRequest<'a> {
    #[serde(rename = "userId")]
    user_id: &'a str,
    #[serde(rename = "activeAgent")]
    active_agent: &'a str,
    message: &'a str,
}

/// Blocking client for an n8n webhook. Transient failures (429 and 5xx)
/// are retried with a growing backoff; everything else fails fast.
pub struct N8nChatClient {
    agent: ureq::Agent,
    url: String,
    retries: u32,
}

impl N8nChatClient {
    pub fn new(url: &str, timeout: Duration, retries: u32) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout(timeout)
            .build();
        Self {
            agent,
            url: url.to_string(),
            retries: retries.max(1),
        }
    }

    fn send(&self, request: &ChatRequest<'_>) -> std::result::Result<String, ureq::Error> {
        let response = self.agent.post(&self.url).send_json(request)?;
        Ok(response.into_string()?)
    }
}

impl ChatBackend for N8nChatClient {
    fn chat(&self, session_id: &str, message: &str) -> Result<String> {
        let request = ChatRequest {
            user_id: session_id,
            active_agent: "assistant",
            message,
        };

        let mut last_error = String::new();
        for attempt in 1..=self.retries {
            match self.send(&request) {
                Ok(body) => return Ok(extract_answer(&body)),
                Err(ureq::Error::Status(code, _)) if code == 429 || code >= 500 => {
                    last_error = format!("HTTP {}", code);
                    let backoff = Duration::from_millis(500 * 2u64.pow(attempt - 1));
                    log::warn!(
                        "AI backend returned {} (attempt {}/{}), retrying in {:?}",
                        code,
                        attempt,
                        self.retries,
                        backoff
                    );
                    thread::sleep(backoff);
                }
                Err(e) => return Err(AssistantError::Chat(format!("request failed: {}", e))),
            }
        }

        Err(AssistantError::Chat(format!(
            "gave up after {} attempts: {}",
            self.retries, last_error
        )))
    }
}

/// n8n workflows answer in a handful of shapes: a JSON object keyed by
/// `output`/`message`/`response`/`text`, an array wrapping one such
/// object, or plain text. Take the first non-empty answer found.
fn extract_answer(body: &str) -> String {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return body.trim().to_string(),
    };

    let object = match &parsed {
        Value::Array(items) => items.first().unwrap_or(&Value::Null),
        other => other,
    };

    for key in ["output", "message", "response", "text"] {
        if let Some(answer) = object.get(key).and_then(|v| v.as_str()) {
            if !answer.trim().is_empty() {
                return answer.trim().to_string();
            }
        }
    }

    match object {
        Value::String(s) => s.trim().to_string(),
        _ => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_known_answer_keys() {
        assert_eq!(extract_answer(r#"{"output": "hello"}"#), "hello");
        assert_eq!(extract_answer(r#"{"message": "hi there"}"#), "hi there");
        assert_eq!(extract_answer(r#"{"response": "ok"}"#), "ok");
        assert_eq!(extract_answer(r#"{"text": "fine"}"#), "fine");
    }

    #[test]
    fn prefers_output_over_later_keys() {
        let body = r#"{"text": "secondary", "output": "primary"}"#;
        assert_eq!(extract_answer(body), "primary");
    }

    #[test]
    fn unwraps_single_element_arrays() {
        let body = r#"[{"output": "from array"}]"#;
        assert_eq!(extract_answer(body), "from array");
    }

    #[test]
    fn falls_back_to_plain_text() {
        assert_eq!(extract_answer("  just words  "), "just words");
        assert_eq!(extract_answer(r#""bare json string""#), "bare json string");
    }

    #[test]
    fn skips_empty_answers() {
        let body = r#"{"output": "", "message": "real answer"}"#;
        assert_eq!(extract_answer(body), "real answer");
    }
}
