//! Always-on barge-in listener: tiny capture windows raced against the
//! conversation loop, looking for a stop command while the assistant is
//! thinking or speaking.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::audio::{wav, FrameSource};
use crate::conversation::Cues;
use crate::playback::AudioOutput;
use crate::services::SpeechToText;
use crate::state::SystemState;
use crate::text::{StopCommandDetector, WakeWordDetector};
use crate::vad::{RecordConfig, Recorder};

/// Sleep while the gate is closed.
const GATE_POLL: Duration = Duration::from_millis(100);
/// Pause after an empty window.
const EMPTY_WINDOW_PAUSE: Duration = Duration::from_millis(50);
/// Back-off after a triggered interrupt, so residual audio from the
/// same utterance cannot re-trigger it.
const COOLDOWN: Duration = Duration::from_millis(300);

/// Run until `is_active` clears. Every iteration's failure is swallowed:
/// this loop runs unattended for the process lifetime and must survive
/// transient device and service errors.
pub fn run_listener<S: FrameSource>(
    recorder: Arc<Mutex<Recorder<S>>>,
    state: Arc<SystemState>,
    player: Arc<dyn AudioOutput>,
    stt: Arc<dyn SpeechToText>,
    cues: Cues,
) {
    let stop = StopCommandDetector::new();
    let wake = WakeWordDetector::new();
    let config = RecordConfig::barge_in();

    log::info!("Barge-in listener running");
    while state.is_active() {
        if !state.barge_in_allowed() {
            thread::sleep(GATE_POLL);
            continue;
        }

        // Never contend with an in-flight primary capture; the gate
        // should prevent it, try_lock is the backstop.
        let window = match recorder.try_lock() {
            Ok(mut recorder) => {
                let format = *recorder.format();
                match recorder.record_until_silence(&config, &state) {
                    Ok(recording) if recording.speech_detected => {
                        wav::pcm_to_wav(&recording.pcm, &format).ok()
                    }
                    Ok(_) => None,
                    Err(e) => {
                        log::debug!("Barge-in capture failed: {}", e);
                        thread::sleep(GATE_POLL);
                        continue;
                    }
                }
            }
            Err(_) => {
                thread::sleep(GATE_POLL);
                continue;
            }
        };

        let wav_bytes = match window {
            Some(wav_bytes) => wav_bytes,
            None => {
                thread::sleep(EMPTY_WINDOW_PAUSE);
                continue;
            }
        };

        // Tiny windows mistranscribe constantly; skip silently.
        let partial = match stt.transcribe(&wav_bytes) {
            Ok(text) => text,
            Err(_) => continue,
        };
        if partial.trim().is_empty() {
            continue;
        }

        if stop.is_stop_with_optional_wake(&partial, &wake) {
            log::warn!("BARGE-IN: stop detected in '{}'", partial);
            state.interrupt(&*player);
            player.play_blocking(cues.listening(), None);
            state.resume_listening();
            thread::sleep(COOLDOWN);
        }
    }
    log::info!("Barge-in listener exiting");
}
