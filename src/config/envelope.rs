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
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::synth::EnvelopeSettings;

/// A YAML representation of the amplitude envelope. Times are duration
/// strings such as `50ms` or `2s`.
#[derive(Deserialize, Clone, Default)]
pub struct Envelope {
    /// Time to ramp from silence to full level (default: 50ms)
    attack: Option<String>,

    /// Time to fall from full level to the sustain level (default: 300ms)
    decay: Option<String>,

    /// Level held while the note is down, 0 to 1 (default: 0.7)
    sustain: Option<f32>,

    /// Time to fade out after the note is released (default: 2s)
    release: Option<String>,
}

impl Envelope {
    /// Parses the envelope into settings, filling in defaults.
    pub fn settings(&self) -> Result<EnvelopeSettings, ConfigError> {
        let defaults = EnvelopeSettings::default();

        let sustain = self.sustain.unwrap_or(defaults.sustain);
        if !(0.0..=1.0).contains(&sustain) {
            return Err(ConfigError::invalid(
                "envelope.sustain",
                format!("{} is outside 0 to 1", sustain),
            ));
        }

        Ok(EnvelopeSettings {
            attack: parse_duration("envelope.attack", &self.attack, defaults.attack)?,
            decay: parse_duration("envelope.decay", &self.decay, defaults.decay)?,
            sustain,
            release: parse_duration("envelope.release", &self.release, defaults.release)?,
        })
    }
}

fn parse_duration(
    field: &'static str,
    value: &Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => DurationString::from_string(value.clone())
            .map(Into::into)
            .map_err(|e| ConfigError::Duration {
                field,
                value: value.clone(),
                reason: e.to_string(),
            }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use config::{Config, File, FileFormat};

    use super::*;

    fn parse(yaml: &str) -> Envelope {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_partial_envelope() {
        let settings = parse("{attack: 5ms, sustain: 0.0}").settings().unwrap();
        assert_eq!(settings.attack, Duration::from_millis(5));
        assert_eq!(settings.decay, Duration::from_millis(300));
        assert_eq!(settings.sustain, 0.0);
        assert_eq!(settings.release, Duration::from_secs(2));
    }

    #[test]
    fn test_bad_duration() {
        match parse("{release: forever}").settings() {
            Err(ConfigError::Duration { field, value, .. }) => {
                assert_eq!(field, "envelope.release");
                assert_eq!(value, "forever");
            }
            other => panic!("unexpected result {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_sustain_out_of_range() {
        assert!(parse("{sustain: -0.1}").settings().is_err());
        assert!(parse("{sustain: 1.0}").settings().is_ok());
    }
}
