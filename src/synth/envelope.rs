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

//! ADSR amplitude envelope.
//!
//! The attack is a linear ramp, decay and release are geometric approaches
//! toward the sustain level and zero respectively. Time only moves forward on
//! [`Envelope::next`], so the level can be read any number of times per sample.

use std::time::Duration;

/// Level below which a released voice is considered silent (-96 dBFS).
pub const INAUDIBLE_LEVEL: f32 = 1.584_893_2e-5;

/// The envelope stages, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Time constants and sustain level for an envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeSettings {
    pub attack: Duration,
    pub decay: Duration,
    pub sustain: f32,
    pub release: Duration,
}

impl Default for EnvelopeSettings {
    fn default() -> Self {
        EnvelopeSettings {
            attack: Duration::from_millis(50),
            decay: Duration::from_millis(300),
            sustain: 0.7,
            release: Duration::from_secs(2),
        }
    }
}

/// A per-voice envelope. Cheap to copy, never allocates.
#[derive(Debug, Clone, Copy)]
pub struct Envelope {
    stage: Stage,
    level: f32,
    /// Samples spent in the attack. The attack level is derived from this
    /// rather than accumulated, so long attacks still reach the peak.
    attack_elapsed: u32,
    attack_increment: f32,
    decay_factor: f32,
    sustain_level: f32,
    release_factor: f32,
}

impl Envelope {
    /// Derives the per-sample coefficients for the given output sample rate.
    /// The envelope starts in the attack stage at level zero.
    pub fn new(settings: &EnvelopeSettings, sample_rate: u32) -> Envelope {
        let rate = sample_rate as f32;
        let attack_samples = settings.attack.as_secs_f32() * rate;

        Envelope {
            stage: Stage::Attack,
            level: 0.0,
            attack_elapsed: 0,
            attack_increment: if attack_samples > 0.0 {
                1.0 / attack_samples
            } else {
                1.0
            },
            decay_factor: geometric_factor(settings.decay, rate),
            sustain_level: settings.sustain.clamp(0.0, 1.0),
            release_factor: geometric_factor(settings.release, rate),
        }
    }

    /// Restarts the attack from silence.
    pub fn reset(&mut self) {
        self.stage = Stage::Attack;
        self.level = 0.0;
        self.attack_elapsed = 0;
    }

    /// Moves into the release stage from wherever the envelope currently is.
    pub fn sustain_off(&mut self) {
        self.stage = Stage::Release;
    }

    /// The current level.
    #[inline]
    pub fn output(&self) -> f32 {
        self.level
    }

    /// The current stage.
    #[inline]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Advances the envelope by one sample.
    #[inline]
    pub fn next(&mut self) {
        match self.stage {
            Stage::Attack => {
                self.attack_elapsed = self.attack_elapsed.saturating_add(1);
                self.level = self.attack_elapsed as f32 * self.attack_increment;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = Stage::Decay;
                }
            }
            Stage::Decay => {
                self.level =
                    self.sustain_level + (self.level - self.sustain_level) * self.decay_factor;
                if (self.level - self.sustain_level).abs() < INAUDIBLE_LEVEL {
                    self.level = self.sustain_level;
                    self.stage = Stage::Sustain;
                }
            }
            Stage::Sustain => {}
            Stage::Release => {
                self.level *= self.release_factor;
            }
        }
    }
}

/// The multiplier that shrinks a distance of 1.0 down to the inaudible level
/// over the given duration. Zero durations collapse immediately.
fn geometric_factor(time: Duration, sample_rate: f32) -> f32 {
    let samples = time.as_secs_f32() * sample_rate;
    if samples <= 0.0 {
        return 0.0;
    }
    INAUDIBLE_LEVEL.powf(1.0 / samples)
}
