//! The conversation loop: listen, transcribe, classify, answer, speak.
//! One `turn()` per cycle so the routing logic is testable without a
//! microphone or network.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::audio::{wav, FrameSource};
use crate::error::Result;
use crate::playback::{AudioOutput, Sound};
use crate::services::{ChatBackend, SpeechToText, TextToSpeech};
use crate::state::SystemState;
use crate::text::{ControlAction, LocalCommandHandler, StopCommandDetector, WakeWordDetector};
use crate::vad::{RecordConfig, Recorder};

/// Consecutive device faults tolerated before the whole process gives up.
const MAX_DEVICE_FAULTS: u32 = 5;

/// Short WAV cues played between pipeline stages, loaded from a
/// directory so deployments can reskin the voice.
#[derive(Debug, Clone)]
pub struct Cues {
    dir: PathBuf,
}

impl Cues {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn sound(&self, name: &str) -> Sound {
        Sound::File(self.dir.join(name))
    }

    pub fn welcome(&self) -> Sound {
        self.sound("welcome.wav")
    }
    pub fn bell(&self) -> Sound {
        self.sound("bell.wav")
    }
    pub fn listening(&self) -> Sound {
        self.sound("listening.wav")
    }
    pub fn thinking(&self) -> Sound {
        self.sound("thinking.wav")
    }
    pub fn got_it(&self) -> Sound {
        self.sound("got_it.wav")
    }
    pub fn how_can_i_help(&self) -> Sound {
        self.sound("how_can_i_help.wav")
    }
}

/// What one loop iteration did, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Nothing recorded, or no speech in what was.
    NoAudio,
    /// Audio was captured but the transcript came back empty or failed.
    NoTranscript,
    /// A direct stop command triggered the interrupt sequence.
    Stopped,
    /// Wake-word enforcement discarded the utterance.
    Ignored,
    /// The utterance was answered, locally or via the AI backend.
    Answered { forwarded: bool },
}

pub struct ConversationLoop<S: FrameSource> {
    recorder: Arc<Mutex<Recorder<S>>>,
    state: Arc<SystemState>,
    player: Arc<dyn AudioOutput>,
    stt: Arc<dyn SpeechToText>,
    tts: Arc<dyn TextToSpeech>,
    /// `None` when no AI backend is configured; utterances that would
    /// be forwarded are then dropped after any local reply.
    chat: Option<Arc<dyn ChatBackend>>,
    wake: WakeWordDetector,
    stop: StopCommandDetector,
    commands: LocalCommandHandler,
    cues: Cues,
    session_id: String,
    enforce_wake: bool,
    turns: u64,
}

impl<S: FrameSource> ConversationLoop<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        recorder: Arc<Mutex<Recorder<S>>>,
        state: Arc<SystemState>,
        player: Arc<dyn AudioOutput>,
        stt: Arc<dyn SpeechToText>,
        tts: Arc<dyn TextToSpeech>,
        chat: Option<Arc<dyn ChatBackend>>,
        cues: Cues,
        session_id: String,
        enforce_wake: bool,
    ) -> Self {
        Self {
            recorder,
            state,
            player,
            stt,
            tts,
            chat,
            wake: WakeWordDetector::new(),
            stop: StopCommandDetector::new(),
            commands: LocalCommandHandler::new(),
            cues,
            session_id,
            enforce_wake,
            turns: 0,
        }
    }

    /// Drive turns until shutdown. Device faults are counted across
    /// consecutive turns; everything else resets the counter.
    pub fn run(&mut self) {
        self.player.play_blocking(self.cues.welcome(), None);

        let mut consecutive_faults = 0u32;
        while self.state.is_active() {
            match self.turn() {
                Ok(outcome) => {
                    consecutive_faults = 0;
                    log::debug!("Turn finished: {:?}", outcome);
                }
                Err(e) => {
                    consecutive_faults += 1;
                    log::error!(
                        "Capture failure ({}/{}): {}",
                        consecutive_faults,
                        MAX_DEVICE_FAULTS,
                        e
                    );
                    if consecutive_faults >= MAX_DEVICE_FAULTS {
                        log::error!("Microphone keeps failing, shutting down");
                        self.state.shutdown();
                        break;
                    }
                    thread::sleep(Duration::from_millis(200));
                }
            }
        }
        log::info!("Conversation loop exiting");
    }

    /// One full listen/classify/answer cycle. Only device faults come
    /// back as `Err`; service failures end the turn with an outcome.
    ///
    /// A paused loop still captures and transcribes every turn: the
    /// spoken resume phrases have to be heard somehow. Only the routing
    /// changes — see `paused_turn`.
    pub fn turn(&mut self) -> Result<TurnOutcome> {
        // This loop owns the microphone for the primary capture.
        self.state.pause_interruption();

        let listening = self.state.should_listen();
        if listening && self.turns > 0 {
            self.player.play_blocking(self.cues.bell(), None);
        }
        self.turns += 1;

        if listening {
            log::info!("Listening...");
        }
        let (recording, format) = {
            let mut recorder = lock_recorder(&self.recorder);
            let recording = recorder.record_until_silence(&RecordConfig::primary(), &self.state)?;
            (recording, *recorder.format())
        };

        if recording.pcm.is_empty() || !recording.speech_detected {
            log::debug!("No speech captured");
            return Ok(TurnOutcome::NoAudio);
        }

        let wav_bytes = wav::pcm_to_wav(&recording.pcm, &format)?;
        let transcript = match self.stt.transcribe(&wav_bytes) {
            Ok(text) => text,
            Err(e) => {
                log::error!("STT failed: {}", e);
                return Ok(TurnOutcome::NoTranscript);
            }
        };
        if transcript.trim().is_empty() {
            log::debug!("Empty transcription");
            return Ok(TurnOutcome::NoTranscript);
        }
        log::info!("User: {}", transcript);

        // Safety stop works without a wake word.
        if self.stop.is_stop_command(&transcript) {
            self.state.interrupt(&*self.player);
            log::info!("Stop command, cancelled speech");
            return Ok(TurnOutcome::Stopped);
        }

        if !listening {
            return Ok(self.paused_turn(&transcript));
        }

        let message = if self.enforce_wake {
            match self.wake.extract_after_wake(&transcript) {
                Some(m) => m.remainder,
                None => {
                    log::info!("Ignored (no wake word)");
                    return Ok(TurnOutcome::Ignored);
                }
            }
        } else {
            transcript
        };

        // A bare call with no command behind it.
        if message.is_empty() {
            self.player.play_blocking(self.cues.how_can_i_help(), None);
            return Ok(TurnOutcome::Answered { forwarded: false });
        }

        let outcome = self.commands.handle(&message);
        if let Some(action) = outcome.action {
            match action {
                ControlAction::Pause => self.state.pause_listening(),
                ControlAction::Resume => self.state.resume_listening(),
            }
        }

        if let Some(reply) = &outcome.reply {
            log::info!("Local reply: {}", reply);
            self.speak(reply);
        }

        if !outcome.forward_to_ai {
            return Ok(TurnOutcome::Answered { forwarded: false });
        }
        let chat = match &self.chat {
            Some(chat) => Arc::clone(chat),
            None => {
                log::debug!("No AI backend configured, dropping utterance");
                return Ok(TurnOutcome::Answered { forwarded: false });
            }
        };

        // Barge-in must be possible during the slow remote call and the
        // spoken answer.
        self.state.resume_interruption();
        if outcome.reply.is_none() {
            self.player.play_async(self.cues.thinking());
        }

        let prompt = if outcome.passthrough.is_empty() {
            message
        } else {
            outcome.passthrough
        };
        log::info!("Dispatching to AI: {}", prompt);
        match chat.chat(&self.session_id, &prompt) {
            Ok(answer) if !answer.trim().is_empty() => {
                log::info!("AI: {}", answer);
                self.player.play_async(self.cues.got_it());
                self.speak(&answer);
            }
            Ok(_) => log::warn!("AI returned an empty answer"),
            Err(e) => log::error!("AI dispatch failed: {}", e),
        }
        self.state.pause_interruption();

        Ok(TurnOutcome::Answered { forwarded: true })
    }

    /// Routing while listening is paused. The wake prefix is peeled off
    /// when present but never required; a sleeping assistant should be
    /// easy to wake. Everything except resume (and the stop command,
    /// handled before this point) is dropped without a reply.
    fn paused_turn(&self, transcript: &str) -> TurnOutcome {
        let message = match self.wake.extract_after_wake(transcript) {
            Some(m) if !m.remainder.is_empty() => m.remainder,
            _ => transcript.to_string(),
        };

        let outcome = self.commands.handle(&message);
        if outcome.action != Some(ControlAction::Resume) {
            log::debug!("Paused, ignoring: {}", transcript);
            return TurnOutcome::Ignored;
        }

        self.state.resume_listening();
        log::info!("Resumed listening");
        if let Some(reply) = &outcome.reply {
            self.speak(reply);
        }
        TurnOutcome::Answered { forwarded: false }
    }

    /// Synthesize and play a sentence, preempting any stale clip.
    /// Failures are logged; a turn never dies because TTS did.
    fn speak(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        let wav_reply = match self.tts.synthesize(text) {
            Ok(wav_reply) => wav_reply,
            Err(e) => {
                log::error!("TTS failed: {}", e);
                return;
            }
        };

        self.player.cancel_current();
        self.state.set_speaking(true);
        self.player.play_blocking(Sound::Wav(wav_reply), None);
        self.state.set_speaking(false);
    }
}

fn lock_recorder<S: FrameSource>(
    recorder: &Mutex<Recorder<S>>,
) -> std::sync::MutexGuard<'_, Recorder<S>> {
    recorder.lock().unwrap_or_else(|e| e.into_inner())
}
