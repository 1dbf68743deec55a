/// Root-mean-square amplitude of a frame of s16le PCM.
///
/// The loudness measure driving the endpoint detector's thresholds.
/// Trailing odd bytes are ignored.
pub fn rms(frame: &[u8]) -> f64 {
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for bytes in frame.chunks_exact(2) {
        let sample = i16::from_le_bytes([bytes[0], bytes[1]]) as f64;
        sum += sample * sample;
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    (sum / count as f64).sqrt()
}
