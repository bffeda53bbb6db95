//! WAV reading, writing and clip extraction.
//!
//! All pipeline audio is 16-bit PCM, downmixed to mono and resampled to
//! 16kHz on read. Clip extraction works on millisecond offsets.

use crate::defaults::SAMPLE_RATE;
use crate::error::{Result, SpeechsetError};
use std::path::Path;

/// Read a WAV file as 16kHz mono i16 samples.
///
/// Stereo input is downmixed; other sample rates are resampled with linear
/// interpolation.
pub fn read_wav_mono(path: &Path) -> Result<Vec<i16>> {
    let mut reader = hound::WavReader::open(path).map_err(|e| SpeechsetError::Input {
        path: path.to_path_buf(),
        message: format!("failed to parse WAV: {e}"),
    })?;

    let spec = reader.spec();
    let raw: Vec<i16> = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| SpeechsetError::Input {
            path: path.to_path_buf(),
            message: format!("failed to read samples: {e}"),
        })?;

    let mono = if spec.channels == 2 {
        raw.chunks_exact(2)
            .map(|chunk| {
                let left = chunk[0] as i32;
                let right = chunk[1] as i32;
                ((left + right) / 2) as i16
            })
            .collect()
    } else if spec.channels == 1 {
        raw
    } else {
        return Err(SpeechsetError::Input {
            path: path.to_path_buf(),
            message: format!("unsupported channel count: {}", spec.channels),
        });
    };

    Ok(if spec.sample_rate == SAMPLE_RATE {
        mono
    } else {
        resample(&mono, spec.sample_rate, SAMPLE_RATE)
    })
}

/// Write 16kHz mono i16 samples as a WAV file.
pub fn write_wav_mono(path: &Path, samples: &[i16]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(|e| SpeechsetError::Audio {
        message: format!("failed to create {}: {e}", path.display()),
    })?;
    for &s in samples {
        writer.write_sample(s).map_err(|e| SpeechsetError::Audio {
            message: format!("failed to write {}: {e}", path.display()),
        })?;
    }
    writer.finalize().map_err(|e| SpeechsetError::Audio {
        message: format!("failed to finalize {}: {e}", path.display()),
    })?;
    Ok(())
}

/// Duration of a WAV file in milliseconds, without reading the samples.
pub fn duration_ms(path: &Path) -> Result<u64> {
    let reader = hound::WavReader::open(path).map_err(|e| SpeechsetError::Input {
        path: path.to_path_buf(),
        message: format!("failed to parse WAV: {e}"),
    })?;
    let spec = reader.spec();
    let frames = reader.duration() as u64;
    Ok(frames * 1000 / spec.sample_rate as u64)
}

/// Millisecond offset to sample index at 16kHz.
#[must_use]
pub fn ms_to_samples(ms: u64) -> usize {
    (ms * SAMPLE_RATE as u64 / 1000) as usize
}

/// Sample index to millisecond offset at 16kHz.
#[must_use]
pub fn samples_to_ms(index: usize) -> u64 {
    index as u64 * 1000 / SAMPLE_RATE as u64
}

/// Slice `[start_ms - pad_start_ms, end_ms + pad_end_ms)` out of `samples`,
/// clamped to the buffer. Padding extends into the surrounding recording
/// rather than inserting synthetic silence.
#[must_use]
pub fn clip_samples(
    samples: &[i16],
    start_ms: u64,
    end_ms: u64,
    pad_start_ms: u64,
    pad_end_ms: u64,
) -> Vec<i16> {
    let start = ms_to_samples(start_ms.saturating_sub(pad_start_ms)).min(samples.len());
    let end = ms_to_samples(end_ms + pad_end_ms).min(samples.len());
    if end <= start {
        return Vec::new();
    }
    samples[start..end].to_vec()
}

/// Rate conversion by walking the source with a fractional cursor; each
/// output sample is the distance-weighted blend of the two source samples
/// the cursor sits between.
fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let out_len =
        ((samples.len() as u64 * to_rate as u64).div_ceil(from_rate as u64)) as usize;
    let step = from_rate as f64 / to_rate as f64;
    let last = samples.len() - 1;

    let mut out = Vec::with_capacity(out_len);
    let mut cursor = 0.0f64;
    for _ in 0..out_len {
        let left = cursor as usize;
        if left >= last {
            out.push(samples[last]);
        } else {
            let weight = cursor - left as f64;
            let blended =
                samples[left] as f64 * (1.0 - weight) + samples[left + 1] as f64 * weight;
            out.push(blended.round() as i16);
        }
        cursor += step;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<i16> = (0..16_000).map(|i| ((i % 100) * 50) as i16).collect();

        write_wav_mono(&path, &samples).unwrap();
        let loaded = read_wav_mono(&path).unwrap();
        assert_eq!(loaded, samples);
    }

    #[test]
    fn test_duration_ms() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("two_sec.wav");
        write_wav_mono(&path, &vec![0i16; 32_000]).unwrap();
        assert_eq!(duration_ms(&path).unwrap(), 2000);
    }

    #[test]
    fn test_ms_sample_conversions() {
        assert_eq!(ms_to_samples(1000), 16_000);
        assert_eq!(ms_to_samples(50), 800);
        assert_eq!(samples_to_ms(16_000), 1000);
        assert_eq!(samples_to_ms(800), 50);
    }

    #[test]
    fn test_clip_samples_basic() {
        let samples: Vec<i16> = (0..16_000).map(|i| i as i16).collect();
        let clip = clip_samples(&samples, 100, 200, 0, 0);
        assert_eq!(clip.len(), 1600);
        assert_eq!(clip[0], samples[1600]);
    }

    #[test]
    fn test_clip_samples_with_padding() {
        let samples = vec![7i16; 16_000];
        let clip = clip_samples(&samples, 100, 200, 50, 50);
        // 50ms on each side: 200ms total = 3200 samples
        assert_eq!(clip.len(), 3200);
    }

    #[test]
    fn test_clip_samples_clamps_to_buffer() {
        let samples = vec![1i16; 1600]; // 100ms
        let clip = clip_samples(&samples, 50, 150, 100, 100);
        // Start clamps to 0, end clamps to buffer length.
        assert_eq!(clip.len(), 1600);
    }

    #[test]
    fn test_clip_samples_empty_range() {
        let samples = vec![1i16; 1600];
        let clip = clip_samples(&samples, 500, 600, 0, 0);
        assert!(clip.is_empty());
    }

    #[test]
    fn test_read_missing_file() {
        let result = read_wav_mono(Path::new("/nonexistent/file.wav"));
        assert!(matches!(result, Err(SpeechsetError::Input { .. })));
    }

    #[test]
    fn test_resample_halves_length() {
        let samples = vec![100i16; 32_000];
        let out = resample(&samples, 32_000, 16_000);
        assert!((out.len() as i64 - 16_000).abs() <= 1);
    }

    #[test]
    fn test_stereo_downmix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(1000i16).unwrap();
            writer.write_sample(3000i16).unwrap();
        }
        writer.finalize().unwrap();

        let loaded = read_wav_mono(&path).unwrap();
        assert_eq!(loaded.len(), 100);
        assert!(loaded.iter().all(|&s| s == 2000));
    }
}
