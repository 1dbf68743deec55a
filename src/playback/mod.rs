//! Audio output: a single worker thread draining a bounded job queue
//! into a persistent cpal output stream.
//!
//! Jobs can be played fire-and-forget or awaited; the current clip can
//! be cancelled at chunk granularity and pending jobs flushed without
//! blocking, which is the contract the global interrupt sequence relies
//! on.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::audio::wav;
use crate::error::{AssistantError, Result};

/// Playback queue rate; decoded clips are resampled to this before
/// being handed to the device callback.
const QUEUE_SAMPLE_RATE: u32 = 16_000;
const JOB_QUEUE_CAPACITY: usize = 8;

/// A clip to play: a WAV file on disk (audio cues) or in-memory WAV
/// bytes (TTS output).
#[derive(Debug, Clone)]
pub enum Sound {
    File(PathBuf),
    Wav(Vec<u8>),
}

/// The minimal cancellation contract the interrupt sequence needs from
/// the audio-output worker. Both calls are fire-and-forget and safe
/// when nothing is playing or queued.
pub trait PlaybackControl: Send + Sync {
    /// Stop the clip currently playing, if any.
    fn cancel_current(&self);
    /// Discard every queued-but-unstarted clip, unblocking any waiters.
    fn flush_pending(&self);
}

/// Playback surface used by the conversation loop.
pub trait AudioOutput: PlaybackControl {
    fn play_async(&self, sound: Sound);
    /// Play and wait for completion (or cancellation). Returns false
    /// only if the timeout expired first.
    fn play_blocking(&self, sound: Sound, timeout: Option<Duration>) -> bool;
}

struct PlaybackJob {
    sound: Sound,
    cancelled: Arc<AtomicBool>,
    done: Sender<()>,
}

/// The cancel flags a `cancel_current` call has to reach: the job the
/// worker is playing right now and the most recently submitted one,
/// which may still be sitting in the queue. The two can be different
/// jobs whenever submissions outpace playback.
struct CancelRegistry {
    submitted: Mutex<Option<Arc<AtomicBool>>>,
    active: Mutex<Option<Arc<AtomicBool>>>,
}

impl CancelRegistry {
    fn new() -> Self {
        Self {
            submitted: Mutex::new(None),
            active: Mutex::new(None),
        }
    }

    fn register_submitted(&self, flag: &Arc<AtomicBool>) {
        *lock_ignore_poison(&self.submitted) = Some(Arc::clone(flag));
    }

    fn register_active(&self, flag: &Arc<AtomicBool>) {
        *lock_ignore_poison(&self.active) = Some(Arc::clone(flag));
    }

    fn cancel_current(&self) {
        for slot in [&self.active, &self.submitted] {
            if let Some(flag) = lock_ignore_poison(slot).as_ref() {
                flag.store(true, Ordering::Release);
            }
        }
    }
}

pub struct AudioPlayer {
    job_tx: Sender<PlaybackJob>,
    /// Second receiver handle on the job queue so `flush_pending` can
    /// drain it atomically with respect to the worker.
    job_rx: Receiver<PlaybackJob>,
    cancels: Arc<CancelRegistry>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl AudioPlayer {
    /// Open the default output device and start the worker. An absent
    /// audio backend is an unrecoverable startup error.
    pub fn new() -> Result<Self> {
        let (job_tx, job_rx) = bounded::<PlaybackJob>(JOB_QUEUE_CAPACITY);
        let (ready_tx, ready_rx) = bounded::<std::result::Result<(), String>>(1);
        let running = Arc::new(AtomicBool::new(true));
        let cancels = Arc::new(CancelRegistry::new());

        let worker = {
            let job_rx = job_rx.clone();
            let running = Arc::clone(&running);
            let cancels = Arc::clone(&cancels);
            thread::Builder::new()
                .name("audio-player".into())
                .spawn(move || player_thread(job_rx, ready_tx, running, cancels))
                .map_err(|e| AssistantError::Playback(format!("player thread: {}", e)))?
        };

        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => {}
            Ok(Err(msg)) => return Err(AssistantError::Playback(msg)),
            Err(_) => return Err(AssistantError::Playback("player did not start".into())),
        }

        Ok(Self {
            job_tx,
            job_rx,
            cancels,
            running,
            worker: Mutex::new(Some(worker)),
        })
    }

    fn submit(&self, sound: Sound) -> (Receiver<()>, Arc<AtomicBool>) {
        let (done_tx, done_rx) = bounded(1);
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut job = PlaybackJob {
            sound,
            cancelled: Arc::clone(&cancelled),
            done: done_tx,
        };

        // Full queue: drop the oldest pending clip rather than the new
        // one; stale cues are worthless once fresher audio exists.
        loop {
            match self.job_tx.try_send(job) {
                Ok(()) => break,
                Err(TrySendError::Full(rejected)) => {
                    job = rejected;
                    if let Ok(stale) = self.job_rx.try_recv() {
                        stale.cancelled.store(true, Ordering::Release);
                        let _ = stale.done.send(());
                    }
                }
                Err(TrySendError::Disconnected(_)) => {
                    log::warn!("Playback worker gone, dropping clip");
                    break;
                }
            }
        }

        // Remember the cancel flag so cancel_current can reach the job
        // even before the worker picks it up.
        self.cancels.register_submitted(&cancelled);
        (done_rx, cancelled)
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        self.cancel_current();
        self.flush_pending();
        if let Some(worker) = lock_ignore_poison(&self.worker).take() {
            let _ = worker.join();
        }
    }
}

impl PlaybackControl for AudioPlayer {
    fn cancel_current(&self) {
        self.cancels.cancel_current();
    }

    fn flush_pending(&self) {
        while let Ok(job) = self.job_rx.try_recv() {
            job.cancelled.store(true, Ordering::Release);
            let _ = job.done.send(());
        }
    }
}

impl AudioOutput for AudioPlayer {
    fn play_async(&self, sound: Sound) {
        let _ = self.submit(sound);
    }

    fn play_blocking(&self, sound: Sound, timeout: Option<Duration>) -> bool {
        let (done_rx, _cancelled) = self.submit(sound);
        match timeout {
            Some(limit) => done_rx.recv_timeout(limit).is_ok(),
            None => done_rx.recv().is_ok(),
        }
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        if self.running.load(Ordering::Acquire) {
            self.shutdown();
        }
    }
}

fn lock_ignore_poison<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn player_thread(
    job_rx: Receiver<PlaybackJob>,
    ready_tx: Sender<std::result::Result<(), String>>,
    running: Arc<AtomicBool>,
    cancels: Arc<CancelRegistry>,
) {
    let sample_queue: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));

    let stream = match build_output_stream(Arc::clone(&sample_queue)) {
        Ok(stream) => {
            let _ = ready_tx.send(Ok(()));
            stream
        }
        Err(msg) => {
            let _ = ready_tx.send(Err(msg));
            return;
        }
    };

    if let Err(e) = stream.play() {
        log::error!("Failed to start playback stream: {}", e);
        return;
    }

    while running.load(Ordering::Acquire) {
        let job = match job_rx.recv_timeout(Duration::from_millis(500)) {
            Ok(job) => job,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if job.cancelled.load(Ordering::Acquire) {
            let _ = job.done.send(());
            continue;
        }

        // Publish which job owns the speakers so cancel_current can
        // reach it even after newer submissions overwrite the
        // submitted slot.
        cancels.register_active(&job.cancelled);

        match decode_sound(&job.sound) {
            Ok(samples) => {
                lock_ignore_poison(&sample_queue).extend_from_slice(&samples);

                // Wait for the clip to drain, checking the cancel flag
                // at chunk granularity.
                loop {
                    if !running.load(Ordering::Acquire) || job.cancelled.load(Ordering::Acquire)
                    {
                        lock_ignore_poison(&sample_queue).clear();
                        break;
                    }
                    if lock_ignore_poison(&sample_queue).is_empty() {
                        break;
                    }
                    thread::sleep(Duration::from_millis(10));
                }
            }
            Err(e) => log::warn!("Skipping unplayable clip: {}", e),
        }

        let _ = job.done.send(());
    }

    log::debug!("Playback worker exiting");
}

/// Decode a sound into mono f32 samples at the queue rate.
fn decode_sound(sound: &Sound) -> Result<Vec<f32>> {
    let wav_bytes = match sound {
        Sound::File(path) => std::fs::read(path)
            .map_err(|e| AssistantError::Playback(format!("{}: {}", path.display(), e)))?,
        Sound::Wav(bytes) => bytes.clone(),
    };

    let (samples, rate) = wav::wav_to_mono_i16(&wav_bytes)?;
    let samples_f32: Vec<f32> = samples
        .iter()
        .map(|&s| s as f32 / i16::MAX as f32)
        .collect();

    Ok(if rate == QUEUE_SAMPLE_RATE {
        samples_f32
    } else {
        resample_linear(&samples_f32, rate, QUEUE_SAMPLE_RATE)
    })
}

/// Linear-interpolation resample, good enough for speech cues.
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if samples.is_empty() || from_rate == to_rate {
        return samples.to_vec();
    }
    let out_len =
        ((samples.len() as u64 * to_rate as u64) / from_rate as u64).max(1) as usize;
    let step = from_rate as f32 / to_rate as f32;
    (0..out_len)
        .map(|i| {
            let pos = i as f32 * step;
            let idx = pos.floor() as usize;
            let fract = pos.fract();
            let a = samples.get(idx).copied().unwrap_or(0.0);
            let b = samples.get(idx + 1).copied().unwrap_or(a);
            a * (1.0 - fract) + b * fract
        })
        .collect()
}

fn build_output_stream(
    sample_queue: Arc<Mutex<Vec<f32>>>,
) -> std::result::Result<cpal::Stream, String> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| "no default output device found".to_string())?;

    let supported = device
        .default_output_config()
        .map_err(|e| format!("output config: {}", e))?;

    let output_rate = supported.sample_rate().0;
    let output_channels = supported.channels() as usize;
    log::info!(
        "Playback configured: {} channels @ {}Hz",
        output_channels,
        output_rate
    );

    let step = QUEUE_SAMPLE_RATE as f32 / output_rate as f32;

    device
        .build_output_stream(
            &supported.config(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut queue = lock_ignore_poison(&sample_queue);
                let output_frames = data.len() / output_channels;
                let needed = (output_frames as f32 * step).ceil() as usize;

                // Interpolate the 16 kHz queue up to the device rate,
                // writing the same sample to every channel; silence
                // when the queue is dry.
                let mut pos = 0.0f32;
                for frame in data.chunks_mut(output_channels) {
                    let sample = if queue.is_empty() {
                        0.0
                    } else {
                        let idx = pos.floor() as usize;
                        let fract = pos.fract();
                        let a = queue.get(idx).copied().unwrap_or(0.0);
                        let b = queue.get(idx + 1).copied().unwrap_or(a);
                        a * (1.0 - fract) + b * fract
                    };
                    for channel in frame.iter_mut() {
                        *channel = sample;
                    }
                    pos += step;
                }

                let used = needed.min(queue.len());
                queue.drain(0..used);
            },
            |err| log::error!("Playback stream error: {}", err),
            None,
        )
        .map_err(|e| format!("output stream: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFormat;

    #[test]
    fn resample_identity_and_ratios() {
        let input = vec![0.0, 0.5, 1.0, 0.5, 0.0];
        assert_eq!(resample_linear(&input, 16_000, 16_000), input);

        let up = resample_linear(&input, 16_000, 32_000);
        assert_eq!(up.len(), 10);
        // Interpolated midpoints sit between their neighbors.
        assert!((up[1] - 0.25).abs() < 1e-6);

        let down = resample_linear(&input, 16_000, 8_000);
        assert_eq!(down.len(), 2);

        assert!(resample_linear(&[], 16_000, 48_000).is_empty());
    }

    #[test]
    fn decode_rejects_garbage_and_accepts_wav() {
        assert!(decode_sound(&Sound::Wav(b"junk".to_vec())).is_err());

        let format = AudioFormat::default();
        let pcm: Vec<u8> = [0i16, 1000, -1000, 0]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let wav_bytes = crate::audio::wav::pcm_to_wav(&pcm, &format).unwrap();
        let samples = decode_sound(&Sound::Wav(wav_bytes)).unwrap();
        assert_eq!(samples.len(), 4);
    }

    #[test]
    fn missing_file_is_a_playback_error() {
        let err = decode_sound(&Sound::File(PathBuf::from("/nonexistent/cue.wav")));
        assert!(matches!(err, Err(AssistantError::Playback(_))));
    }

    #[test]
    fn cue_files_decode_from_disk() {
        let format = AudioFormat::default();
        let pcm: Vec<u8> = [500i16, -500].iter().flat_map(|s| s.to_le_bytes()).collect();
        let wav_bytes = crate::audio::wav::pcm_to_wav(&pcm, &format).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bell.wav");
        std::fs::write(&path, wav_bytes).unwrap();

        let samples = decode_sound(&Sound::File(path)).unwrap();
        assert_eq!(samples.len(), 2);
    }

    #[test]
    fn cancel_reaches_the_playing_clip_after_newer_submissions() {
        let registry = CancelRegistry::new();
        registry.cancel_current(); // nothing registered yet, must not panic

        let playing = Arc::new(AtomicBool::new(false));
        registry.register_submitted(&playing);
        registry.register_active(&playing);

        // A newer clip lands in the queue while the first is still
        // audible; cancelling must hit both, not just the newcomer.
        let queued = Arc::new(AtomicBool::new(false));
        registry.register_submitted(&queued);

        registry.cancel_current();
        assert!(playing.load(Ordering::Acquire));
        assert!(queued.load(Ordering::Acquire));
    }

    #[test]
    #[cfg_attr(
        not(feature = "test-audio"),
        ignore = "requires audio device - run with --features test-audio"
    )]
    fn player_plays_and_cancels() {
        let player = AudioPlayer::new().expect("open output device");

        // One second of a 440 Hz tone.
        let format = AudioFormat::default();
        let pcm: Vec<u8> = (0..16_000)
            .map(|i| {
                let t = i as f32 / 16_000.0;
                ((2.0 * std::f32::consts::PI * 440.0 * t).sin() * 8_000.0) as i16
            })
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let wav_bytes = crate::audio::wav::pcm_to_wav(&pcm, &format).unwrap();

        player.play_async(Sound::Wav(wav_bytes.clone()));
        thread::sleep(Duration::from_millis(100));
        player.cancel_current();

        // A cancelled clip must not hold up the next blocking play.
        let finished =
            player.play_blocking(Sound::Wav(wav_bytes), Some(Duration::from_secs(5)));
        assert!(finished);

        player.shutdown();
    }
}
