use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};
use rubato::{FftFixedIn, Resampler};
use std::path::Path;
use tracing::info;

use super::frame::SAMPLE_RATE;

/// Input block size handed to the resampler
const RESAMPLER_CHUNK_SIZE: usize = 1024;

/// A WAV file loaded fully into memory as normalized samples
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to read audio samples")?
            }
        };

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels.max(1) as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Down-mix to mono and convert to 16 kHz
    ///
    /// Whole multiples of 16 kHz are decimated; any other rate above it goes
    /// through an FFT resampler. Files below 16 kHz are rejected.
    pub fn to_mono_16khz(&self) -> Result<Vec<f32>> {
        if self.sample_rate < SAMPLE_RATE {
            anyhow::bail!(
                "Cannot upsample {}Hz audio to {}Hz",
                self.sample_rate,
                SAMPLE_RATE
            );
        }

        let mono = stereo_to_mono(&self.samples, self.channels);
        if self.sample_rate % SAMPLE_RATE != 0 {
            return resample(&mono, self.sample_rate, SAMPLE_RATE);
        }

        let ratio = (self.sample_rate / SAMPLE_RATE) as usize;
        if ratio <= 1 {
            return Ok(mono);
        }

        Ok(mono.into_iter().step_by(ratio).collect())
    }
}

/// Resample mono audio, compensating for the resampler's delay
fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    let mut resampler = FftFixedIn::<f32>::new(from as usize, to as usize, RESAMPLER_CHUNK_SIZE, 1, 1)
        .context("Failed to create resampler")?;

    let expected = (samples.len() as u64 * to as u64 / from as u64) as usize;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected + delay + RESAMPLER_CHUNK_SIZE);

    let mut block = vec![0.0f32; RESAMPLER_CHUNK_SIZE];
    for chunk in samples.chunks(RESAMPLER_CHUNK_SIZE) {
        block.fill(0.0);
        block[..chunk.len()].copy_from_slice(chunk);
        let resampled = resampler
            .process(&[&block[..]], None)
            .context("Resampling failed")?;
        output.extend_from_slice(&resampled[0]);
    }

    // Push silence through until the delayed tail has come out
    block.fill(0.0);
    let mut flushes = 0;
    while output.len() < expected + delay && flushes < 16 {
        let resampled = resampler
            .process(&[&block[..]], None)
            .context("Resampling failed")?;
        output.extend_from_slice(&resampled[0]);
        flushes += 1;
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    Ok(output)
}

/// Average interleaved channels into one
fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks_exact(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
