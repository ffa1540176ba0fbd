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
use std::str::FromStr;

use serde::Deserialize;

use super::error::ConfigError;
use crate::audio::{OutputFormat, SampleFormat};

const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_BITS_PER_SAMPLE: u16 = 32;

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Default)]
pub struct Audio {
    /// The audio device. Must be set before playing live, either here or on
    /// the command line.
    device: Option<String>,

    /// Output sample rate in Hz (default: 44100)
    sample_rate: Option<u32>,

    /// Output sample format (default: "float")
    sample_format: Option<String>,

    /// Bits per sample for integer output (default: 32)
    bits_per_sample: Option<u16>,

    /// Fixed stream period in frames. The backend default is used when unset.
    buffer_size: Option<u32>,
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: Some(device.to_string()),
            ..Default::default()
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// Overrides the device.
    pub fn set_device(&mut self, device: &str) {
        self.device = Some(device.to_string());
    }

    /// Returns the output sample rate (default: 44100)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Overrides the output sample rate.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = Some(sample_rate);
    }

    /// Returns the output sample format (default: Float)
    pub fn sample_format(&self) -> Result<SampleFormat, ConfigError> {
        match self.sample_format.as_deref() {
            Some(format) => SampleFormat::from_str(format)
                .map_err(|e| ConfigError::invalid("audio.sample_format", e.to_string())),
            None => Ok(SampleFormat::Float),
        }
    }

    /// Returns the bits per sample (default: 32)
    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample.unwrap_or(DEFAULT_BITS_PER_SAMPLE)
    }

    /// Returns the fixed stream period, if any.
    pub fn buffer_size(&self) -> Option<u32> {
        self.buffer_size
    }

    /// Returns the complete output format.
    pub fn output_format(&self) -> Result<OutputFormat, ConfigError> {
        OutputFormat::new(
            self.sample_rate(),
            self.sample_format()?,
            self.bits_per_sample(),
        )
        .map_err(|e| ConfigError::invalid("audio", e.to_string()))
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == Some(0) {
            return Err(ConfigError::invalid(
                "audio.buffer_size",
                "must be at least one frame",
            ));
        }
        self.output_format().map(|_| ())
    }
}
