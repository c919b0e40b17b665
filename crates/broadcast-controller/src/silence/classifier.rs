//! Per-chunk silence classification.
//!
//! Chunks are opaque compressed payloads, not PCM, so this is a byte-level
//! heuristic rather than an exact measurement: tiny chunks, zero-dominated
//! prefixes, and runs of a repeated filler byte (0x00/0xFF/0x80) are what
//! encoders emit for digital silence. False positives and negatives are
//! acceptable — the result only gates the safety disconnect, never stream
//! correctness. Thresholds are carried over from the original tuning and may
//! need re-tuning per codec.

/// Chunks smaller than this are treated as silent outright.
pub const MIN_AUDIBLE_CHUNK_BYTES: usize = 100;

/// Only the first so many bytes of a chunk are inspected.
pub const SAMPLE_PREFIX_BYTES: usize = 1000;

/// Zero-byte ratio above which the sampled prefix counts as silent.
pub const ZERO_RATIO_THRESHOLD: f32 = 0.8;

/// Number of sampled offsets inspected for filler-byte windows.
const SAMPLED_OFFSETS: usize = 20;

/// Window length checked at each sampled offset.
const PATTERN_WINDOW_BYTES: usize = 8;

/// Sampled offsets that must hit a filler window for the chunk to be silent.
pub const PATTERN_MATCH_THRESHOLD: usize = 10;

/// Filler bytes encoders emit for digital silence.
const FILLER_BYTES: [u8; 3] = [0x00, 0xFF, 0x80];

/// Classify one compressed chunk as silent or not.
///
/// Pure and deterministic: identical input always yields identical output.
#[must_use]
pub fn is_silent(chunk: &[u8]) -> bool {
    if chunk.len() < MIN_AUDIBLE_CHUNK_BYTES {
        return true;
    }

    let prefix = chunk.get(..SAMPLE_PREFIX_BYTES).unwrap_or(chunk);

    let zero_count = prefix.iter().filter(|&&b| b == 0).count();
    #[allow(clippy::cast_precision_loss)] // prefix is at most 1000 bytes
    let zero_ratio = zero_count as f32 / prefix.len() as f32;
    if zero_ratio > ZERO_RATIO_THRESHOLD {
        return true;
    }

    has_repeated_filler_pattern(prefix)
}

/// Check the prefix for repeated fixed-length filler windows.
///
/// Samples `SAMPLED_OFFSETS` evenly spaced offsets; an offset hits when the
/// window starting there is uniformly one of the filler bytes.
fn has_repeated_filler_pattern(prefix: &[u8]) -> bool {
    if prefix.len() < PATTERN_WINDOW_BYTES {
        return false;
    }

    let span = prefix.len() - PATTERN_WINDOW_BYTES;
    let stride = (span / SAMPLED_OFFSETS).max(1);

    let mut hits = 0usize;
    let mut offset = 0usize;
    while offset <= span {
        if let Some(window) = prefix.get(offset..offset + PATTERN_WINDOW_BYTES) {
            let uniform_filler = FILLER_BYTES.iter().any(|&filler| {
                window.iter().all(|&b| b == filler)
            });
            if uniform_filler {
                hits += 1;
                if hits >= PATTERN_MATCH_THRESHOLD {
                    return true;
                }
            }
        }
        offset += stride;
    }

    false
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    /// Deterministic pseudo-random bytes with no zeros and no filler runs.
    fn noisy_bytes(len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| {
                let b = ((i as u32).wrapping_mul(167).wrapping_add(13) % 251) as u8;
                // Keep well clear of the filler bytes.
                match b {
                    0x00 => 0x11,
                    0xFF => 0x22,
                    0x80 => 0x33,
                    other => other,
                }
            })
            .collect()
    }

    #[test]
    fn test_tiny_chunk_is_silent() {
        assert!(is_silent(&noisy_bytes(50)));
        assert!(is_silent(&[]));
        assert!(is_silent(&noisy_bytes(MIN_AUDIBLE_CHUNK_BYTES - 1)));
    }

    #[test]
    fn test_noisy_chunk_is_not_silent() {
        assert!(!is_silent(&noisy_bytes(1000)));
        assert!(!is_silent(&noisy_bytes(4096)));
    }

    #[test]
    fn test_all_zero_chunk_is_silent() {
        assert!(is_silent(&vec![0u8; 1000]));
    }

    #[test]
    fn test_zero_dominated_chunk_is_silent() {
        // 85% zeros, rest noise.
        let mut chunk = noisy_bytes(1000);
        for b in chunk.iter_mut().take(850) {
            *b = 0;
        }
        assert!(is_silent(&chunk));
    }

    #[test]
    fn test_zero_ratio_below_threshold_is_not_silent() {
        // 70% zeros stays under the 0.8 ratio and the interleaved noise
        // breaks up filler windows.
        let noise = noisy_bytes(1000);
        let chunk: Vec<u8> = (0..1000)
            .map(|i| if i % 10 < 7 { 0 } else { noise[i] })
            .collect();
        assert!(!is_silent(&chunk));
    }

    #[test]
    fn test_ff_filler_chunk_is_silent() {
        assert!(is_silent(&vec![0xFFu8; 1000]));
    }

    #[test]
    fn test_dc_filler_chunk_is_silent() {
        assert!(is_silent(&vec![0x80u8; 1000]));
    }

    #[test]
    fn test_only_inspects_prefix() {
        // Noise in the first 1000 bytes, filler after: non-silent.
        let mut chunk = noisy_bytes(1000);
        chunk.extend(std::iter::repeat(0xFF).take(3000));
        assert!(!is_silent(&chunk));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let chunk = noisy_bytes(1000);
        let first = is_silent(&chunk);
        for _ in 0..10 {
            assert_eq!(is_silent(&chunk), first);
        }
    }
}
