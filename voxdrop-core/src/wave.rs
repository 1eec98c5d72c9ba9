//! Wave header inspection.
//!
//! A TTS engine that is still writing usually leaves a truncated or zeroed
//! RIFF header behind, so a header that parses with non-zero format fields
//! and a non-empty data chunk is the structural readiness signal for a pair.

use std::io::{Read, Seek};
use std::path::Path;

use hound::WavReader;
use serde::Serialize;

use crate::error::{EngineError, Result};

/// Format fields of a validated wave stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct WaveInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    /// Sample frames (samples per channel).
    pub frames: u32,
}

impl WaveInfo {
    pub fn duration_secs(&self) -> f64 {
        f64::from(self.frames) / f64::from(self.sample_rate)
    }
}

/// Parse and validate the header of the wave file at `path`.
pub fn inspect(path: &Path) -> Result<WaveInfo> {
    let reader = WavReader::open(path).map_err(|err| invalid(path, err))?;
    validate(path, reader)
}

/// Same as [`inspect`] for an already opened stream.
pub fn inspect_reader<R: Read + Seek>(path: &Path, stream: R) -> Result<WaveInfo> {
    let reader = WavReader::new(stream).map_err(|err| invalid(path, err))?;
    validate(path, reader)
}

fn validate<R: Read>(path: &Path, reader: WavReader<R>) -> Result<WaveInfo> {
    let spec = reader.spec();
    let frames = reader.duration();
    if spec.sample_rate == 0
        || spec.channels == 0
        || spec.bits_per_sample == 0
        || reader.len() == 0
    {
        return Err(EngineError::InvalidWave {
            path: path.to_path_buf(),
            reason: format!(
                "implausible header (rate {}, channels {}, bits {}, samples {})",
                spec.sample_rate,
                spec.channels,
                spec.bits_per_sample,
                reader.len()
            ),
        });
    }

    Ok(WaveInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bits_per_sample: spec.bits_per_sample,
        frames,
    })
}

fn invalid(path: &Path, err: hound::Error) -> EngineError {
    match err {
        hound::Error::IoError(io) => EngineError::Io(io),
        other => EngineError::InvalidWave {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}

/// Write a silent 16-bit PCM wave file. Test fixture helper.
#[cfg(test)]
pub(crate) fn write_silence(
    path: &Path,
    sample_rate: u32,
    channels: u16,
    frames: u32,
) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for _ in 0..frames * u32::from(channels) {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
}
