pub mod energy;
pub mod source;
pub mod wav;

pub use source::{CpalMicrophone, FrameSource};

use std::time::Duration;

use crate::config::Settings;

/// PCM format shared by capture, endpointing and the STT upload.
/// Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Bytes per sample (2 = 16-bit).
    pub sample_width: u16,
    /// Samples per frame read from the device.
    pub chunk: usize,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            sample_width: 2,
            chunk: 256,
        }
    }
}

impl AudioFormat {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            sample_rate: settings.sample_rate,
            channels: settings.channels,
            sample_width: settings.sample_width,
            chunk: settings.chunk,
        }
    }

    /// Bytes occupied by one multi-channel sample point.
    pub fn bytes_per_point(&self) -> usize {
        self.sample_width as usize * self.channels as usize
    }

    /// Bytes occupied by one frame of `chunk` sample points.
    pub fn frame_bytes(&self) -> usize {
        self.chunk * self.bytes_per_point()
    }

    /// Wall-clock duration of one frame.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.chunk as f64 / self.sample_rate as f64)
    }
}
