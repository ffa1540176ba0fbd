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

const DEFAULT_VOICES: usize = 10;
const DEFAULT_HEADROOM: f32 = 0.3;
const DEFAULT_PITCH_BEND_RANGE: f32 = 200.0;
const DEFAULT_EVENT_QUEUE: usize = 1024;

/// Which voice to cut when every voice is sounding and none is releasing.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StealFallback {
    /// Always take the first slot.
    #[default]
    FirstSlot,
    /// Take the slot with the lowest envelope level, whatever its stage.
    Quietest,
}

/// A YAML representation of the voice pool and mixer settings.
#[derive(Deserialize, Clone, Default)]
pub struct Synth {
    /// Number of voices that can sound at once (default: 10)
    voices: Option<usize>,

    /// Gain applied to the mix when more than one voice sounds (default: 0.3)
    headroom: Option<f32>,

    /// Bend in cents at full pitch wheel deflection (default: 200)
    pitch_bend_range: Option<f32>,

    /// Capacity of the queue between MIDI input and audio output (default: 1024)
    event_queue: Option<usize>,

    /// Steal policy when no voice is releasing (default: first_slot)
    steal_fallback: Option<StealFallback>,
}

impl Synth {
    pub fn voices(&self) -> usize {
        self.voices.unwrap_or(DEFAULT_VOICES)
    }

    pub fn headroom(&self) -> f32 {
        self.headroom.unwrap_or(DEFAULT_HEADROOM)
    }

    pub fn pitch_bend_range(&self) -> f32 {
        self.pitch_bend_range.unwrap_or(DEFAULT_PITCH_BEND_RANGE)
    }

    pub fn event_queue(&self) -> usize {
        self.event_queue.unwrap_or(DEFAULT_EVENT_QUEUE)
    }

    pub fn steal_fallback(&self) -> StealFallback {
        self.steal_fallback.unwrap_or_default()
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.voices() == 0 {
            return Err(ConfigError::invalid(
                "synth.voices",
                "at least one voice is required",
            ));
        }
        let headroom = self.headroom();
        if !headroom.is_finite() || headroom <= 0.0 {
            return Err(ConfigError::invalid(
                "synth.headroom",
                format!("{} must be positive", headroom),
            ));
        }
        if !self.pitch_bend_range().is_finite() {
            return Err(ConfigError::invalid("synth.pitch_bend_range", "not a number"));
        }
        if self.event_queue() == 0 {
            return Err(ConfigError::invalid(
                "synth.event_queue",
                "the queue must hold at least one event",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use config::{Config, File, FileFormat};

    use super::*;

    fn parse(yaml: &str) -> Synth {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_steal_fallback() {
        assert_eq!(parse("{voices: 2}").steal_fallback(), StealFallback::FirstSlot);
        assert_eq!(
            parse("{steal_fallback: first_slot}").steal_fallback(),
            StealFallback::FirstSlot
        );
        assert_eq!(
            parse("{steal_fallback: quietest}").steal_fallback(),
            StealFallback::Quietest
        );
    }

    #[test]
    fn test_unknown_steal_fallback() {
        let result = Config::builder()
            .add_source(File::from_str(
                "{steal_fallback: loudest}",
                FileFormat::Yaml,
            ))
            .build()
            .unwrap()
            .try_deserialize::<Synth>();
        assert!(result.is_err());
    }

    #[test]
    fn test_negative_bend_range_is_allowed() {
        let synth = parse("{pitch_bend_range: -200}");
        synth.validate().unwrap();
        assert_eq!(synth.pitch_bend_range(), -200.0);
    }
}
