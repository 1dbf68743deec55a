use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;

use assistant_edge::audio::{AudioFormat, CpalMicrophone};
use assistant_edge::config::load_settings;
use assistant_edge::conversation::{ConversationLoop, Cues};
use assistant_edge::eyes::{self, EyeModel};
use assistant_edge::interrupt;
use assistant_edge::playback::{AudioOutput, AudioPlayer};
use assistant_edge::services::{
    ChatBackend, HttpSttClient, HttpTtsClient, N8nChatClient, SpeechToText, TextToSpeech,
};
use assistant_edge::state::SystemState;
use assistant_edge::vad::Recorder;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable the barge-in listener (overrides ALLOW_INTERRUPTION)
    #[arg(long)]
    allow_interruption: Option<bool>,

    /// Require the wake word before acting (overrides ALLOW_WAKE_WORD)
    #[arg(long)]
    allow_wake_word: Option<bool>,

    /// Eye backend: none or console (overrides EYE_MODEL)
    #[arg(long)]
    eye_model: Option<EyeModel>,

    /// Directory holding the WAV cue files (overrides CUE_DIR)
    #[arg(long)]
    cue_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let mut settings = load_settings().context("Failed to load configuration")?;
    if let Some(v) = args.allow_interruption {
        settings.allow_interruption = v;
    }
    if let Some(v) = args.allow_wake_word {
        settings.allow_wake_word = v;
    }
    if let Some(v) = args.eye_model {
        settings.eye_model = v;
    }
    if let Some(v) = args.cue_dir {
        settings.cue_dir = v;
    }

    log::info!("🚀 Assistant starting — wake word: Ziko / زيكو");
    log::info!(
        "interruption={} wake_word={} eyes={}",
        settings.allow_interruption,
        settings.allow_wake_word,
        settings.eye_model
    );

    let format = AudioFormat::from_settings(&settings);
    let microphone = CpalMicrophone::open(format).context("Failed to open microphone")?;
    let recorder = Arc::new(Mutex::new(Recorder::new(microphone, format)));

    let audio_player = Arc::new(AudioPlayer::new().context("Failed to open audio output")?);
    let player: Arc<dyn AudioOutput> = audio_player.clone();

    let stt: Arc<dyn SpeechToText> = Arc::new(HttpSttClient::new(
        &settings.server_api_url,
        settings.http_timeout,
    ));
    let tts: Arc<dyn TextToSpeech> = Arc::new(HttpTtsClient::new(
        &settings.server_api_url,
        settings.http_timeout,
    ));
    let chat: Option<Arc<dyn ChatBackend>> = if settings.n8n_url.is_empty() {
        log::warn!("No AI backend configured (N8N_URL empty)");
        None
    } else {
        Some(Arc::new(N8nChatClient::new(
            &settings.n8n_url,
            settings.http_timeout,
            settings.retries,
        )))
    };

    let state = Arc::new(SystemState::new(settings.allow_interruption));
    let cues = Cues::new(settings.cue_dir.clone());

    let eye_thread = eyes::spawn(settings.eye_model, Arc::clone(&state));

    let interrupt_thread = if settings.allow_interruption {
        let recorder = Arc::clone(&recorder);
        let state = Arc::clone(&state);
        let player = Arc::clone(&player);
        let stt = Arc::clone(&stt);
        let cues = cues.clone();
        Some(
            thread::Builder::new()
                .name("barge-in".into())
                .spawn(move || interrupt::run_listener(recorder, state, player, stt, cues))
                .context("Failed to start barge-in listener")?,
        )
    } else {
        log::info!("Interruption disabled, barge-in listener not started");
        None
    };

    let mut conversation = ConversationLoop::new(
        recorder,
        Arc::clone(&state),
        player,
        stt,
        tts,
        chat,
        cues,
        settings.session_id.clone(),
        settings.allow_wake_word,
    );

    let conversation_thread = thread::Builder::new()
        .name("conversation".into())
        .spawn(move || conversation.run())
        .context("Failed to start conversation loop")?;

    // The conversation loop exits only on shutdown (repeated device
    // faults or an external stop); everything else follows it down.
    let _ = conversation_thread.join();
    state.shutdown();

    if let Some(handle) = interrupt_thread {
        let _ = handle.join();
    }
    if let Some(handle) = eye_thread {
        let _ = handle.join();
    }
    audio_player.shutdown();

    log::info!("✅ System stopped");
    Ok(())
}
