use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::debug;

use super::AudioClip;
use crate::error::{DubError, Result};

fn decode<R: std::io::Read>(reader: WavReader<R>) -> Result<AudioClip> {
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
        }
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>(),
    }
    .map_err(|e| DubError::AudioDecode(format!("corrupt WAV samples: {e}")))?;

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    debug!(
        "Decoded WAV: {} Hz, {} channels, {} samples",
        spec.sample_rate,
        spec.channels,
        samples.len()
    );

    Ok(AudioClip::new(samples, spec.sample_rate))
}

impl AudioClip {
    /// Decode an in-memory WAV file, mixing multichannel audio down to mono.
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<AudioClip> {
        let reader = WavReader::new(Cursor::new(bytes))
            .map_err(|e| DubError::AudioDecode(format!("not a WAV stream: {e}")))?;
        decode(reader)
    }

    pub fn read_wav(path: &Path) -> Result<AudioClip> {
        if !path.exists() {
            return Err(DubError::FileNotFound(path.display().to_string()));
        }
        let reader = WavReader::open(path)
            .map_err(|e| DubError::AudioDecode(format!("{}: {e}", path.display())))?;
        decode(reader)
    }

    fn spec(&self) -> WavSpec {
        WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }

    fn write_samples<W: std::io::Write + std::io::Seek>(
        &self,
        mut writer: WavWriter<W>,
    ) -> Result<()> {
        for &s in &self.samples {
            let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
            writer.write_sample(v)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Encode as 16-bit mono PCM WAV.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write_samples(WavWriter::new(&mut cursor, self.spec())?)?;
        Ok(cursor.into_inner())
    }

    pub fn write_wav(&self, path: &Path) -> Result<()> {
        self.write_samples(WavWriter::create(path, self.spec())?)
    }
}
