pub mod level;
pub mod wav;

pub use level::{calculate_rms, to_dbfs};

use crate::error::{DubError, Result};

/// Mono PCM audio held in memory, samples normalized to `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Digital silence of the given length. Negative lengths give an empty clip.
    pub fn silence(seconds: f64, sample_rate: u32) -> Self {
        let len = (seconds.max(0.0) * sample_rate as f64).round() as usize;
        Self::new(vec![0.0; len], sample_rate)
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// RMS energy of the whole clip.
    pub fn rms(&self) -> f64 {
        calculate_rms(&self.samples)
    }

    /// Loudness in dBFS, `None` for digital silence or an empty clip.
    pub fn dbfs(&self) -> Option<f64> {
        to_dbfs(self.rms())
    }

    /// Append another clip, converting its sample rate to ours first.
    pub fn append(&mut self, other: &AudioClip) {
        if other.sample_rate == self.sample_rate {
            self.samples.extend_from_slice(&other.samples);
        } else {
            self.samples
                .extend_from_slice(&other.resample(self.sample_rate).samples);
        }
    }

    /// Append `seconds` of silence.
    pub fn pad(&mut self, seconds: f64) {
        let len = (seconds.max(0.0) * self.sample_rate as f64).round() as usize;
        self.samples.resize(self.samples.len() + len, 0.0);
    }

    /// Join clips in order at the first clip's sample rate.
    pub fn concat(clips: &[AudioClip]) -> Result<AudioClip> {
        let first = clips
            .first()
            .ok_or_else(|| DubError::InvalidInput("no clips to concatenate".to_string()))?;

        let total: usize = clips.iter().map(|c| c.samples.len()).sum();
        let mut out = AudioClip::new(Vec::with_capacity(total), first.sample_rate);
        for clip in clips {
            out.append(clip);
        }
        Ok(out)
    }

    /// Convert to another sample rate with linear interpolation.
    pub fn resample(&self, target_rate: u32) -> AudioClip {
        if target_rate == self.sample_rate || self.sample_rate == 0 {
            return AudioClip::new(self.samples.clone(), target_rate);
        }
        let target_len = (self.samples.len() as f64 * target_rate as f64
            / self.sample_rate as f64)
            .round() as usize;
        AudioClip::new(interpolate(&self.samples, target_len), target_rate)
    }

    /// Play back `ratio` times faster by resampling in place of the original
    /// rate. Pitch shifts with the speed.
    pub fn stretch(&self, ratio: f64) -> AudioClip {
        if ratio <= 0.0 || (ratio - 1.0).abs() < f64::EPSILON {
            return self.clone();
        }
        let target_len = (self.samples.len() as f64 / ratio).round() as usize;
        AudioClip::new(interpolate(&self.samples, target_len), self.sample_rate)
    }
}

/// Linearly interpolate `samples` onto `target_len` evenly spaced points.
fn interpolate(samples: &[f32], target_len: usize) -> Vec<f32> {
    match (samples.len(), target_len) {
        (0, _) | (_, 0) => Vec::new(),
        (1, n) => vec![samples[0]; n],
        (len, n) => {
            let step = (len - 1) as f64 / (n.max(2) - 1) as f64;
            (0..n)
                .map(|i| {
                    let pos = i as f64 * step;
                    let idx = (pos.floor() as usize).min(len - 1);
                    let next = (idx + 1).min(len - 1);
                    let frac = (pos - idx as f64) as f32;
                    samples[idx] + (samples[next] - samples[idx]) * frac
                })
                .collect()
        }
    }
}
