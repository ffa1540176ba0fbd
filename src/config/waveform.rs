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
use serde::Deserialize;

use super::error::ConfigError;
use crate::waveform::{self, LoopRegion, WaveformError};

const DEFAULT_BASE_FREQUENCY: f32 = 220.0;

/// A YAML representation of the waveform and its loop points.
#[derive(Deserialize, Clone)]
pub struct Waveform {
    /// The audio file, relative to the config file.
    file: String,

    /// Pitch of the recording in Hz (default: 220)
    base_frequency: Option<f32>,

    /// The channel of the file to play (default: 0)
    channel: Option<u16>,

    /// First frame of the sustain loop (default: a quarter of the way in)
    loop_start: Option<usize>,

    /// Frame the sustain loop wraps at (default: one frame before the end)
    loop_end: Option<usize>,
}

impl Waveform {
    /// New will create a new waveform configuration.
    pub fn new(file: &str) -> Waveform {
        Waveform {
            file: file.to_string(),
            base_frequency: None,
            channel: None,
            loop_start: None,
            loop_end: None,
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn base_frequency(&self) -> f32 {
        self.base_frequency.unwrap_or(DEFAULT_BASE_FREQUENCY)
    }

    pub fn channel(&self) -> u16 {
        self.channel.unwrap_or(0)
    }

    /// The configured loop points, if any.
    pub fn loop_bounds(&self) -> (Option<usize>, Option<usize>) {
        (self.loop_start, self.loop_end)
    }

    /// Builds the loop region for the loaded waveform. Missing bounds fall back
    /// to the defaults for its length.
    pub fn loop_region(&self, waveform: &waveform::Waveform) -> Result<LoopRegion, WaveformError> {
        let default = LoopRegion::default_for(waveform);
        LoopRegion::new(
            self.loop_start.unwrap_or(default.start()),
            self.loop_end.unwrap_or(default.end()),
            waveform,
        )
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        let base_frequency = self.base_frequency();
        if !base_frequency.is_finite() || base_frequency <= 0.0 {
            return Err(ConfigError::invalid(
                "waveform.base_frequency",
                format!("{} must be positive", base_frequency),
            ));
        }
        if let (Some(start), Some(end)) = (self.loop_start, self.loop_end) {
            if start >= end {
                return Err(ConfigError::invalid(
                    "waveform.loop_start",
                    format!("loop start {} is not before loop end {}", start, end),
                ));
            }
        }
        Ok(())
    }
}
