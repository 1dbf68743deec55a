use std::io::Cursor;

use crate::audio::AudioFormat;
use crate::error::{AssistantError, Result};

/// Wrap raw PCM into an in-memory WAV file. The STT endpoint expects a
/// RIFF header, not bare samples.
pub fn pcm_to_wav(pcm: &[u8], format: &AudioFormat) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: format.sample_width * 8,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| AssistantError::Device(format!("WAV writer: {}", e)))?;
        for bytes in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([bytes[0], bytes[1]]))
                .map_err(|e| AssistantError::Device(format!("WAV write: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| AssistantError::Device(format!("WAV finalize: {}", e)))?;
    }
    Ok(cursor.into_inner())
}

/// Decode 16-bit WAV bytes to mono i16 samples plus the source sample rate.
/// Stereo input is averaged down to mono.
pub fn wav_to_mono_i16(wav: &[u8]) -> Result<(Vec<i16>, u32)> {
    let mut reader = hound::WavReader::new(Cursor::new(wav))
        .map_err(|e| AssistantError::Playback(format!("WAV parse: {}", e)))?;
    let spec = reader.spec();

    if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        return Err(AssistantError::Playback(format!(
            "only 16-bit PCM WAV supported, got {}-bit {:?}",
            spec.bits_per_sample, spec.sample_format
        )));
    }

    let samples: Vec<i16> = reader
        .samples::<i16>()
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| AssistantError::Playback(format!("WAV samples: {}", e)))?;

    let mono = match spec.channels {
        1 => samples,
        2 => samples
            .chunks_exact(2)
            .map(|lr| ((lr[0] as i32 + lr[1] as i32) / 2) as i16)
            .collect(),
        n => {
            return Err(AssistantError::Playback(format!(
                "unsupported channel count: {}",
                n
            )))
        }
    };

    Ok((mono, spec.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_wrapping_preserves_samples() {
        let format = AudioFormat::default();
        let pcm: Vec<u8> = [100i16, -100, 32000, -32000]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();

        let wav = pcm_to_wav(&pcm, &format).unwrap();
        assert_eq!(&wav[..4], b"RIFF");

        let (samples, rate) = wav_to_mono_i16(&wav).unwrap();
        assert_eq!(rate, 16_000);
        assert_eq!(samples, vec![100, -100, 32000, -32000]);
    }

    #[test]
    fn stereo_is_averaged_to_mono() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in [100i16, 300, -50, -150] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }

        let (samples, _) = wav_to_mono_i16(&cursor.into_inner()).unwrap();
        assert_eq!(samples, vec![200, -100]);
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(wav_to_mono_i16(b"not a wav file").is_err());
    }
}
