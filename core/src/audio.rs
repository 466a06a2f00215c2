//! PCM16 resampling and silence generation.
//!
//! Pure, allocation-only functions: no I/O, no retryable errors. A
//! non-positive sample rate is a programming error and panics rather than
//! returning a `Result` nobody can usefully recover from.

/// Resamples signed 16-bit little-endian mono PCM from `src_rate` to `dst_rate`.
///
/// Equal rates return the input unchanged; empty input returns empty output.
/// Otherwise applies rational polyphase resampling: zero-stuff by `up`,
/// convolve with a windowed-sinc lowpass FIR, decimate by `down`. This is
/// streaming-friendly (no global FFT across the whole buffer) so it can be
/// applied chunk-by-chunk without introducing seams between chunks.
///
/// # Panics
///
/// Panics if `src_rate` or `dst_rate` is zero.
#[must_use]
pub fn resample(pcm_bytes: &[u8], src_rate: u32, dst_rate: u32) -> Vec<u8> {
    assert!(src_rate > 0 && dst_rate > 0, "sample rates must be positive");

    if src_rate == dst_rate || pcm_bytes.is_empty() {
        return pcm_bytes.to_vec();
    }

    let samples = bytes_to_i16(pcm_bytes);
    let g = gcd(src_rate, dst_rate);
    let up = (dst_rate / g) as usize;
    let down = (src_rate / g) as usize;

    let resampled = polyphase_resample(&samples, up, down);
    i16_to_bytes(&resampled)
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Zero-stuffs by `up`, lowpass-filters with a windowed-sinc FIR sized to the
/// tighter of the two rates, then decimates by `down`.
fn polyphase_resample(samples: &[i16], up: usize, down: usize) -> Vec<i16> {
    if samples.is_empty() {
        return Vec::new();
    }
    if up == 1 && down == 1 {
        return samples.to_vec();
    }

    // Cutoff normalized to the smaller of the up/down rates, so we reject
    // both imaging artifacts from upsampling and aliasing from downsampling.
    let cutoff = 1.0 / (up.max(down) as f64);
    let half_taps = 16 * up.max(down).min(32);
    let filter = windowed_sinc_lowpass(cutoff, half_taps);

    // Zero-stuff: place each input sample every `up` positions in a virtual
    // upsampled stream, then convolve with the filter (scaled by `up` to
    // preserve energy), then pick every `down`-th output sample.
    let upsampled_len = samples.len() * up;
    let out_len = (upsampled_len + down - 1) / down;
    let mut output = Vec::with_capacity(out_len);

    let filter_half = filter.len() / 2;
    for out_idx in 0..out_len {
        let center = out_idx * down;
        let mut acc = 0.0_f64;
        for (k, coeff) in filter.iter().enumerate() {
            let tap_offset = k as isize - filter_half as isize;
            let upsampled_idx = center as isize + tap_offset;
            if upsampled_idx < 0 {
                continue;
            }
            let upsampled_idx = upsampled_idx as usize;
            if upsampled_idx % up != 0 {
                continue;
            }
            let sample_idx = upsampled_idx / up;
            if sample_idx >= samples.len() {
                continue;
            }
            acc += f64::from(samples[sample_idx]) * coeff * (up as f64);
        }
        output.push(saturate_i16(acc));
    }

    output
}

/// Windowed-sinc lowpass FIR with `2 * half_taps + 1` coefficients.
fn windowed_sinc_lowpass(cutoff: f64, half_taps: usize) -> Vec<f64> {
    let n = 2 * half_taps + 1;
    let mut coeffs = Vec::with_capacity(n);
    for i in 0..n {
        let m = i as f64 - half_taps as f64;
        let sinc = if m.abs() < 1e-12 {
            2.0 * cutoff
        } else {
            (2.0 * std::f64::consts::PI * cutoff * m).sin() / (std::f64::consts::PI * m)
        };
        // Hamming window to tame the sinc's slow decay.
        let window = 0.54 - 0.46 * (2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64).cos();
        coeffs.push(sinc * window);
    }
    let sum: f64 = coeffs.iter().sum();
    if sum.abs() > 1e-12 {
        for c in &mut coeffs {
            *c /= sum;
        }
    }
    coeffs
}

fn saturate_i16(value: f64) -> i16 {
    value.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

fn bytes_to_i16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

fn i16_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

/// Generates the silence tail appended after the user stops speaking, so the
/// remote model's voice-activity detector has enough trailing silence to
/// close the turn.
///
/// Emits `floor(duration_ms * rate / 1000)` total samples of zeros, split
/// into full chunks of `chunk_samples` plus one final partial chunk holding
/// the remainder, if any. Yields nothing when `duration_ms` is zero or
/// negative.
#[must_use]
pub fn silence_chunks(duration_ms: i64, rate: u32, chunk_samples: usize) -> Vec<Vec<u8>> {
    if duration_ms <= 0 {
        return Vec::new();
    }
    assert!(rate > 0 && chunk_samples > 0, "rate and chunk size must be positive");

    let total_samples = (duration_ms as u128 * u128::from(rate) / 1000) as usize;
    let mut chunks = Vec::new();
    let full_chunks = total_samples / chunk_samples;
    for _ in 0..full_chunks {
        chunks.push(vec![0u8; chunk_samples * 2]);
    }
    let remainder = total_samples % chunk_samples;
    if remainder > 0 {
        chunks.push(vec![0u8; remainder * 2]);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_equal_rates_is_identity() {
        let pcm = vec![1, 0, 2, 0, 3, 0];
        assert_eq!(resample(&pcm, 16_000, 16_000), pcm);
    }

    #[test]
    fn resample_empty_is_empty() {
        assert_eq!(resample(&[], 16_000, 24_000), Vec::<u8>::new());
    }

    #[test]
    fn resample_zero_signal_upsample_length() {
        let samples = vec![0i16; 16];
        let pcm = i16_to_bytes(&samples);
        let out = resample(&pcm, 16_000, 24_000);
        let out_samples = out.len() / 2;
        // floor(16 * 24000/16000) = 24
        assert_eq!(out_samples, 24);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn resample_zero_signal_downsample_length() {
        let samples = vec![0i16; 24];
        let pcm = i16_to_bytes(&samples);
        let out = resample(&pcm, 24_000, 16_000);
        let out_samples = out.len() / 2;
        // floor(24 * 16000/24000) = 16
        assert_eq!(out_samples, 16);
    }

    #[test]
    fn silence_chunks_zero_duration_is_empty() {
        assert!(silence_chunks(0, 16_000, 160).is_empty());
        assert!(silence_chunks(-5, 16_000, 160).is_empty());
    }

    #[test]
    fn silence_chunks_100ms_at_16k_yields_10_chunks_of_320_bytes() {
        let chunks = silence_chunks(100, 16_000, 160);
        assert_eq!(chunks.len(), 10);
        for chunk in &chunks {
            assert_eq!(chunk.len(), 320);
        }
    }

    #[test]
    fn silence_chunks_emits_partial_final_chunk() {
        // total_samples = 16000 * 150 / 1000 = 2400; chunk_samples = 1024
        // full_chunks = 2, remainder = 352
        let chunks = silence_chunks(150, 16_000, 1024);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1024 * 2);
        assert_eq!(chunks[1].len(), 1024 * 2);
        assert_eq!(chunks[2].len(), 352 * 2);
    }
}
