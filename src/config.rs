use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::eyes::EyeModel;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },
}

/// Process-wide settings, loaded once at startup from the environment
/// (a `.env` file is honored in development).
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the STT/TTS service (`/stt` and `/tts` endpoints).
    pub server_api_url: String,
    /// n8n webhook URL for the AI backend. Empty disables AI dispatch.
    pub n8n_url: String,
    pub http_timeout: Duration,
    pub retries: u32,

    /// Conversation session identifier sent with every chat request.
    pub session_id: String,

    // Recorder format: 16 kHz / mono / 16-bit, 256-sample frames.
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_width: u16,
    pub chunk: usize,

    pub allow_interruption: bool,
    pub allow_wake_word: bool,
    pub eye_model: EyeModel,

    /// Directory holding the short WAV cues (bell, thinking, ...).
    pub cue_dir: PathBuf,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (for development)
        dotenvy::dotenv().ok();

        Ok(Self {
            server_api_url: env_string("SERVER_API_URL", "http://127.0.0.1:5055"),
            n8n_url: env_string("N8N_URL", ""),
            http_timeout: Duration::from_secs(env_parse("HTTP_TIMEOUT", 60u64)?),
            retries: env_parse("RETRIES", 3u32)?,
            session_id: env_string("SESSION_ID", "robot-1"),
            sample_rate: env_parse("REC_SAMPLE_RATE", 16_000u32)?,
            channels: env_parse("REC_CHANNELS", 1u16)?,
            sample_width: env_parse("REC_WIDTH", 2u16)?,
            chunk: env_parse("REC_CHUNK", 256usize)?,
            allow_interruption: env_bool("ALLOW_INTERRUPTION", false),
            allow_wake_word: env_bool("ALLOW_WAKE_WORD", false),
            eye_model: env_parse("EYE_MODEL", EyeModel::None)?,
            cue_dir: PathBuf::from(env_string("CUE_DIR", "resources/cues")),
        })
    }
}

fn env_string(var: &str, default: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default.to_string(),
    }
}

fn env_bool(var: &str, default: bool) -> bool {
    match env::var(var) {
        Ok(v) => matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"),
        Err(_) => default,
    }
}

fn env_parse<T>(var: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => {
            v.trim().parse().map_err(|e| ConfigError::InvalidValue {
                var: var.to_string(),
                reason: format!("{}", e),
            })
        }
        _ => Ok(default),
    }
}

/// Load settings with helpful error messages for development.
pub fn load_settings() -> Result<Settings, ConfigError> {
    match Settings::load() {
        Ok(settings) => {
            log::info!(
                "Settings loaded: STT/TTS at {}, AI backend {}",
                settings.server_api_url,
                if settings.n8n_url.is_empty() {
                    "disabled"
                } else {
                    "enabled"
                }
            );
            Ok(settings)
        }
        Err(e) => {
            log::error!("Configuration error: {}", e);
            log::error!("Check your environment or .env file");
            Err(e)
        }
    }
}
