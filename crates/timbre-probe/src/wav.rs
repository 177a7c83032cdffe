//! WAV input/output (mono f32)

use std::path::Path;

use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

/// Decoded mono audio
pub struct MonoAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Read a WAV file, downmixing to mono and normalizing to [-1, 1]
pub fn read_mono(path: &Path) -> Result<MonoAudio> {
    let mut reader =
        WavReader::open(path).with_context(|| format!("Failed to open WAV file: {:?}", path))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .context("Failed to decode float samples")?,
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                bail!("Unsupported bit depth {}", spec.bits_per_sample);
            }
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .context("Failed to decode integer samples")?
        }
    };

    let samples = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    Ok(MonoAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Write mono 32-bit float WAV
pub fn write_mono(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {:?}", path))?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_int_downmix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..4 {
            writer.write_sample(16384_i16).unwrap();
            writer.write_sample(0_i16).unwrap();
        }
        writer.finalize().unwrap();

        let audio = read_mono(&path).unwrap();
        assert_eq!(audio.sample_rate, 48_000);
        assert_eq!(audio.samples.len(), 4);
        assert!(audio.samples.iter().all(|s| (s - 0.25).abs() < 1e-4));
    }

    #[test]
    fn test_float_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        write_mono(&path, &[0.5, -0.25, 0.0], 48_000).unwrap();

        let audio = read_mono(&path).unwrap();
        assert_eq!(audio.samples, vec![0.5, -0.25, 0.0]);
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = read_mono(Path::new("/nonexistent/in.wav")).err().unwrap();
        assert!(err.to_string().contains("Failed to open WAV file"));
    }
}
