//! Speech endpoint detection over raw microphone frames.
//!
//! A hysteresis state machine: the noise floor is measured per session,
//! two thresholds are derived from it (louder to start than to stay
//! started), and the capture ends only after a run of quiet frames once a
//! minimum speech duration has elapsed. Calibration frames double as
//! pre-roll so the first words are not lost to detection latency.

use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::{energy, wav, AudioFormat, FrameSource};
use crate::error::Result;
use crate::state::SystemState;

/// Noise floor assumed when calibration is skipped or yields no frames.
/// Never zero: a zero floor would admit every frame as speech.
pub const DEFAULT_NOISE_FLOOR: f64 = 50.0;

/// Absolute minimums keeping thresholds sane in a silent room.
const START_THRESHOLD_MIN: f64 = 150.0;
const END_THRESHOLD_MIN: f64 = 100.0;

/// End threshold is this fraction of the start threshold's boost,
/// implementing hysteresis.
const END_THRESHOLD_RATIO: f64 = 0.55;

/// Idle wait when the device momentarily has no frame for us.
const IDLE_WAIT: Duration = Duration::from_millis(2);

/// Tuning for one `record_until_silence` call.
#[derive(Debug, Clone)]
pub struct RecordConfig {
    /// Hard wall-clock cap for the whole capture.
    pub max_duration: Duration,
    /// Ambient noise measurement window at the start (zero skips it).
    pub noise_calib_duration: Duration,
    /// Consecutive frames at/above the start threshold to enter speech.
    pub start_frames: u32,
    /// Consecutive frames below the end threshold to leave speech.
    pub end_frames: u32,
    /// Extra audio captured after the end condition fires.
    pub post_silence_hold: Duration,
    /// Audio kept from just before speech onset.
    pub pre_roll_ms: u64,
    /// Minimum time after the start transition before an end is allowed.
    pub min_speech_after_start: Duration,
    /// Multiplier applied to the noise floor to form the thresholds.
    pub threshold_boost: f64,
}

impl RecordConfig {
    /// Full-length capture for the primary conversation listen.
    pub fn primary() -> Self {
        Self {
            max_duration: Duration::from_secs(25),
            noise_calib_duration: Duration::from_millis(800),
            start_frames: 3,
            end_frames: 18,
            post_silence_hold: Duration::from_millis(350),
            pre_roll_ms: 350,
            min_speech_after_start: Duration::from_millis(1800),
            threshold_boost: 3.0,
        }
    }

    /// Short window tuned for the barge-in listener: minimum latency,
    /// no calibration, no hold. Accuracy matters less than turnaround.
    pub fn barge_in() -> Self {
        Self {
            max_duration: Duration::from_millis(1300),
            noise_calib_duration: Duration::ZERO,
            start_frames: 2,
            end_frames: 8,
            post_silence_hold: Duration::ZERO,
            pre_roll_ms: 200,
            min_speech_after_start: Duration::from_millis(200),
            threshold_boost: 0.0,
        }
    }
}

/// Ambient loudness measured once per recording session.
#[derive(Debug, Clone, Copy)]
pub struct NoiseProfile {
    pub floor: f64,
}

impl NoiseProfile {
    pub fn from_samples(values: &[f64]) -> Self {
        let floor = if values.is_empty() {
            DEFAULT_NOISE_FLOOR
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        };
        Self { floor }
    }
}

/// Start/end energy thresholds. `start >= end` holds by construction:
/// the end multiplier is strictly smaller and the absolute minimums
/// preserve the ordering.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub start: f64,
    pub end: f64,
}

impl Thresholds {
    pub fn derive(noise: &NoiseProfile, boost: f64) -> Self {
        Self {
            start: START_THRESHOLD_MIN.max(noise.floor * boost),
            end: END_THRESHOLD_MIN.max(noise.floor * boost * END_THRESHOLD_RATIO),
        }
    }
}

/// Result of one endpointed capture.
#[derive(Debug, Clone)]
pub struct Recording {
    /// Raw PCM in the recorder's format. Possibly empty if no frames
    /// were ever read.
    pub pcm: Vec<u8>,
    /// Whether the start transition fired. It can fire at most once per
    /// call; the detector never leaves the speaking state except by
    /// ending the capture.
    pub speech_detected: bool,
}

impl Recording {
    fn empty() -> Self {
        Self {
            pcm: Vec::new(),
            speech_detected: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }
}

/// Endpointing recorder over a blocking frame source.
pub struct Recorder<S: FrameSource> {
    source: S,
    format: AudioFormat,
}

impl<S: FrameSource> Recorder<S> {
    pub fn new(source: S, format: AudioFormat) -> Self {
        Self { source, format }
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    /// Wrap a captured buffer for the STT upload.
    pub fn pcm_to_wav(&self, pcm: &[u8]) -> Result<Vec<u8>> {
        wav::pcm_to_wav(pcm, &self.format)
    }

    /// Record a fixed duration with no endpointing.
    pub fn record_fixed(&mut self, duration: Duration, state: &SystemState) -> Result<Vec<u8>> {
        let deadline = Instant::now() + duration;
        let mut pcm = Vec::new();
        while Instant::now() < deadline && state.is_active() {
            match self.source.read_frame()? {
                Some(frame) => pcm.extend_from_slice(&frame),
                None => thread::sleep(IDLE_WAIT),
            }
        }
        Ok(pcm)
    }

    /// Record until real silence is detected, returning raw PCM.
    ///
    /// Phases: noise calibration (frames also seed the pre-roll ring),
    /// then the main loop appending every frame unconditionally while
    /// the hysteresis counters track speech, then a post-silence hold.
    /// The whole call is bounded by `max_duration` plus the hold, and
    /// aborts early at frame granularity when the system goes inactive.
    ///
    /// A device read failure is escalated to the caller; a stream that
    /// simply produces nothing yields an empty recording instead.
    pub fn record_until_silence(
        &mut self,
        cfg: &RecordConfig,
        state: &SystemState,
    ) -> Result<Recording> {
        let frame_bytes = self.format.frame_bytes();
        let pre_roll_bytes =
            (self.format.sample_rate as u64 * cfg.pre_roll_ms / 1000) as usize
                * self.format.bytes_per_point();
        let ring_capacity = (pre_roll_bytes / frame_bytes).max(1);
        let mut pre_roll: VecDeque<Vec<u8>> = VecDeque::with_capacity(ring_capacity);

        // Calibration: measure the ambient floor; every frame read here
        // is a candidate pre-roll frame, so the window is not wasted.
        let mut noise_values = Vec::new();
        if !cfg.noise_calib_duration.is_zero() {
            let calib_deadline = Instant::now() + cfg.noise_calib_duration;
            while Instant::now() < calib_deadline {
                if !state.is_active() {
                    return Ok(Recording::empty());
                }
                match self.source.read_frame()? {
                    Some(frame) => {
                        noise_values.push(energy::rms(&frame));
                        if pre_roll.len() == ring_capacity {
                            pre_roll.pop_front();
                        }
                        pre_roll.push_back(frame);
                    }
                    None => thread::sleep(IDLE_WAIT),
                }
            }
        }

        let noise = NoiseProfile::from_samples(&noise_values);
        let thresholds = Thresholds::derive(&noise, cfg.threshold_boost);
        log::debug!(
            "VAD session: noise_floor={:.1} start_thr={:.1} end_thr={:.1}",
            noise.floor,
            thresholds.start,
            thresholds.end
        );

        // Seed the output with the pre-roll, oldest first.
        let mut pcm: Vec<u8> = Vec::with_capacity(frame_bytes * 64);
        for frame in pre_roll.drain(..) {
            pcm.extend_from_slice(&frame);
        }

        let mut speaking = false;
        let mut over_count: u32 = 0;
        let mut under_count: u32 = 0;
        let mut start_time: Option<Instant> = None;
        let hard_deadline = Instant::now() + cfg.max_duration;

        while Instant::now() < hard_deadline && state.is_active() {
            let frame = match self.source.read_frame()? {
                Some(frame) => frame,
                None => {
                    thread::sleep(IDLE_WAIT);
                    continue;
                }
            };
            let level = energy::rms(&frame);

            // Every frame from calibration end to loop end belongs to
            // the returned buffer, detected speech or not.
            pcm.extend_from_slice(&frame);

            if !speaking {
                if level >= thresholds.start {
                    over_count += 1;
                    if over_count >= cfg.start_frames {
                        speaking = true;
                        start_time = Some(Instant::now());
                        under_count = 0;
                        log::debug!("VAD: speech started (level {:.1})", level);
                    }
                } else {
                    over_count = 0;
                }
            } else {
                if level < thresholds.end {
                    under_count += 1;
                } else {
                    under_count = 0;
                }

                let long_enough = start_time
                    .map(|t| t.elapsed() >= cfg.min_speech_after_start)
                    .unwrap_or(false);
                if long_enough && under_count >= cfg.end_frames {
                    log::debug!("VAD: end of speech after {} quiet frames", under_count);
                    self.capture_hold(cfg, state, hard_deadline, &mut pcm)?;
                    break;
                }
            }
        }

        Ok(Recording {
            pcm,
            speech_detected: speaking,
        })
    }

    /// Post-silence hold: keep appending for a little while after the
    /// end condition so a trailing soft syllable is not clipped. Still
    /// bounded by the session's hard deadline.
    fn capture_hold(
        &mut self,
        cfg: &RecordConfig,
        state: &SystemState,
        hard_deadline: Instant,
        pcm: &mut Vec<u8>,
    ) -> Result<()> {
        let hold_bytes = (self.format.sample_rate as f64
            * cfg.post_silence_hold.as_secs_f64()) as usize
            * self.format.bytes_per_point();
        let mut hold_frames = hold_bytes / self.format.frame_bytes();

        while hold_frames > 0 && Instant::now() < hard_deadline && state.is_active() {
            match self.source.read_frame()? {
                Some(frame) => {
                    pcm.extend_from_slice(&frame);
                    hold_frames -= 1;
                }
                None => thread::sleep(IDLE_WAIT),
            }
        }
        Ok(())
    }
}
