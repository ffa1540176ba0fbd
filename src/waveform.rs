// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The recorded waveform played back by every voice.
//!
//! The waveform is decoded entirely into memory at startup and shared
//! read-only between voices.

use std::fs::File;
use std::path::Path;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, info};

/// Errors produced while loading or validating a waveform.
#[derive(Debug, thiserror::Error)]
pub enum WaveformError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio file error: {0}")]
    Decode(#[from] SymphoniaError),

    #[error("No audio track found in {0}")]
    NoAudioTrack(String),

    #[error("Sample rate not specified in {0}")]
    MissingSampleRate(String),

    #[error("Waveform has no channels")]
    NoChannels,

    #[error("Waveform needs at least 2 frames, found {0}")]
    TooShort(usize),

    #[error("Channel {channel} out of range, waveform has {channels} channel(s)")]
    ChannelOutOfRange { channel: u16, channels: u16 },

    #[error("Invalid loop region [{start}, {end}) for waveform of {frames} frames")]
    InvalidLoop {
        start: usize,
        end: usize,
        frames: usize,
    },
}

/// Interleaved f32 audio held in memory.
pub struct Waveform {
    data: Vec<f32>,
    frames: usize,
    channels: u16,
    sample_rate: u32,
}

impl Waveform {
    /// Creates a waveform from interleaved samples. Trailing samples that do
    /// not form a complete frame are discarded.
    pub fn from_samples(
        mut data: Vec<f32>,
        channels: u16,
        sample_rate: u32,
    ) -> Result<Waveform, WaveformError> {
        if channels == 0 {
            return Err(WaveformError::NoChannels);
        }
        let frames = data.len() / channels as usize;
        if frames < 2 {
            return Err(WaveformError::TooShort(frames));
        }
        data.truncate(frames * channels as usize);

        Ok(Waveform {
            data,
            frames,
            channels,
            sample_rate,
        })
    }

    /// Decodes an audio file (any format symphonia understands) into memory.
    pub fn load(path: &Path) -> Result<Waveform, WaveformError> {
        info!(path = ?path, "Loading waveform");

        let file = File::open(path).map_err(|e| {
            WaveformError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let probed = get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let mut format_reader = probed.format;

        let file_name = path.display().to_string();
        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| WaveformError::NoAudioTrack(file_name.clone()))?;
        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| WaveformError::MissingSampleRate(file_name.clone()))?;
        let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

        let mut data: Vec<f32> = Vec::new();
        let mut channels: u16 = 0;

        loop {
            let packet = match format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break
                }
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    // A corrupt packet is skipped rather than failing the whole file.
                    debug!(error = e, "Skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let spec = *decoded.spec();
            channels = spec.channels.count() as u16;
            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buffer.copy_interleaved_ref(decoded);
            data.extend_from_slice(buffer.samples());
        }

        let waveform = Waveform::from_samples(data, channels, sample_rate)?;
        info!(
            path = ?path,
            channels = waveform.channels,
            sample_rate = waveform.sample_rate,
            frames = waveform.frames,
            duration_ms = waveform.duration().as_millis(),
            "Waveform loaded"
        );
        Ok(waveform)
    }

    /// Number of frames (samples per channel).
    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// The rate the waveform was recorded at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Reads one sample. The frame must be below [`Waveform::frames`].
    #[inline]
    pub fn sample(&self, frame: usize, channel: u16) -> f32 {
        self.data[frame * self.channels as usize + channel as usize]
    }

    /// Playback length at the recorded rate.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames as f64 / self.sample_rate.max(1) as f64)
    }

    /// Returns an error unless the channel exists in this waveform.
    pub fn check_channel(&self, channel: u16) -> Result<(), WaveformError> {
        if channel >= self.channels {
            return Err(WaveformError::ChannelOutOfRange {
                channel,
                channels: self.channels,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for Waveform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waveform")
            .field("frames", &self.frames)
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

/// The frame range a cursor cycles through once playback reaches its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopRegion {
    start: usize,
    end: usize,
}

impl LoopRegion {
    /// Validates `start < end <= frames`.
    pub fn new(start: usize, end: usize, waveform: &Waveform) -> Result<LoopRegion, WaveformError> {
        let region = LoopRegion { start, end };
        region.check(waveform)?;
        Ok(region)
    }

    /// Returns an error unless the region is non-empty and fits the waveform.
    pub fn check(&self, waveform: &Waveform) -> Result<(), WaveformError> {
        if self.start >= self.end || self.end > waveform.frames() {
            return Err(WaveformError::InvalidLoop {
                start: self.start,
                end: self.end,
                frames: waveform.frames(),
            });
        }
        Ok(())
    }

    /// Loops the last three quarters of the waveform, stopping one frame short
    /// of the end so interpolation always has a right-hand neighbour.
    pub fn default_for(waveform: &Waveform) -> LoopRegion {
        let frames = waveform.frames();
        LoopRegion {
            start: frames / 4,
            end: frames - 1,
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Length of the region in frames. Always at least one.
    pub fn len(&self) -> usize {
        self.end - self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{sine_samples, write_wav};

    #[test]
    fn test_from_samples_rejects_bad_input() {
        assert!(matches!(
            Waveform::from_samples(vec![0.0; 10], 0, 44100),
            Err(WaveformError::NoChannels)
        ));
        assert!(matches!(
            Waveform::from_samples(vec![0.5], 1, 44100),
            Err(WaveformError::TooShort(1))
        ));
        assert!(matches!(
            Waveform::from_samples(vec![0.5, 0.5, 0.5], 2, 44100),
            Err(WaveformError::TooShort(1))
        ));
    }

    #[test]
    fn test_interleaved_access() {
        let waveform =
            Waveform::from_samples(vec![0.0, 1.0, 0.1, 1.1, 0.2, 1.2, 9.9], 2, 48000).unwrap();
        assert_eq!(waveform.frames(), 3);
        assert_eq!(waveform.channels(), 2);
        assert_eq!(waveform.sample(0, 0), 0.0);
        assert_eq!(waveform.sample(2, 1), 1.2);
        assert!(waveform.check_channel(1).is_ok());
        assert!(matches!(
            waveform.check_channel(2),
            Err(WaveformError::ChannelOutOfRange {
                channel: 2,
                channels: 2
            })
        ));
    }

    #[test]
    fn test_loop_region_validation() {
        let waveform = Waveform::from_samples(vec![0.0; 100], 1, 44100).unwrap();
        assert!(LoopRegion::new(10, 90, &waveform).is_ok());
        assert!(LoopRegion::new(10, 100, &waveform).is_ok());
        assert!(LoopRegion::new(50, 50, &waveform).is_err());
        assert!(LoopRegion::new(60, 50, &waveform).is_err());
        assert!(LoopRegion::new(10, 101, &waveform).is_err());

        let default = LoopRegion::default_for(&waveform);
        assert_eq!(default.start(), 25);
        assert_eq!(default.end(), 99);
        assert_eq!(default.len(), 74);
        assert!(default.check(&waveform).is_ok());

        let shorter = Waveform::from_samples(vec![0.0; 50], 1, 44100).unwrap();
        assert!(default.check(&shorter).is_err());
        assert!(LoopRegion::default_for(&shorter).check(&waveform).is_ok());
    }

    #[test]
    fn test_load_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sine.wav");
        let samples = sine_samples(220.0, 44100, 4410);
        write_wav(&path, &samples, 44100).unwrap();

        let waveform = Waveform::load(&path).unwrap();
        assert_eq!(waveform.channels(), 1);
        assert_eq!(waveform.sample_rate(), 44100);
        assert_eq!(waveform.frames(), 4410);
        for (i, expected) in samples.iter().enumerate().step_by(97) {
            assert!((waveform.sample(i, 0) - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_load_missing_file() {
        let result = Waveform::load(Path::new("/definitely/not/here.wav"));
        assert!(matches!(result, Err(WaveformError::Io(_))));
    }
}
