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

//! Variable-rate playback of a shared waveform with a sustain loop.

use std::sync::Arc;

use crate::waveform::{LoopRegion, Waveform};

/// Smallest rate a player will accept. Anything at or below zero would stall
/// or run backwards out of the waveform.
const MIN_RATE: f64 = 1e-9;

/// A playback cursor over one channel of a waveform.
///
/// The cursor starts at frame zero, plays through once and then cycles
/// through the loop region for as long as it is advanced.
#[derive(Clone)]
pub struct Resampler {
    waveform: Arc<Waveform>,
    channel: u16,
    position: f64,
    base_rate: f64,
    multiplier: f64,
    loop_region: LoopRegion,
}

impl Resampler {
    /// Creates a cursor at the start of the waveform. The channel and loop
    /// region are expected to have been validated against the waveform.
    pub fn new(
        waveform: Arc<Waveform>,
        channel: u16,
        rate: f64,
        loop_region: LoopRegion,
    ) -> Resampler {
        Resampler {
            waveform,
            channel,
            position: 0.0,
            base_rate: sanitize_rate(rate),
            multiplier: 1.0,
            loop_region,
        }
    }

    /// Linear interpolation between the two frames around the cursor.
    #[inline]
    pub fn output(&self) -> f32 {
        let index = self.position as usize;
        let frac = (self.position - index as f64) as f32;
        let last = self.waveform.frames() - 1;

        let s0 = self.waveform.sample(index.min(last), self.channel);
        let s1 = self.waveform.sample((index + 1).min(last), self.channel);
        s0 + (s1 - s0) * frac
    }

    /// Advances the cursor by the current rate, wrapping into the loop region.
    #[inline]
    pub fn next(&mut self) {
        self.position += self.rate();

        let end = self.loop_region.end() as f64;
        if self.position >= end {
            let start = self.loop_region.start() as f64;
            let len = self.loop_region.len() as f64;
            self.position = start + (self.position - start) % len;
        }
    }

    /// Re-rates playback to `base_rate * 2^(cents / 1200)`. The position is
    /// left untouched.
    pub fn pitch_offset(&mut self, cents: f32) {
        self.multiplier = 2f64.powf(cents as f64 / 1200.0);
    }

    /// Rewinds to the start of the waveform.
    pub fn reset(&mut self) {
        self.position = 0.0;
    }

    /// Rewinds and sets a new base rate with no pitch offset. Used when a voice
    /// slot is handed to a new note.
    pub fn restart(&mut self, rate: f64) {
        self.base_rate = sanitize_rate(rate);
        self.multiplier = 1.0;
        self.reset();
    }

    /// Frames advanced per output sample, including the pitch offset.
    #[inline]
    pub fn rate(&self) -> f64 {
        self.base_rate * self.multiplier
    }

    /// The fractional frame the next read comes from.
    pub fn position(&self) -> f64 {
        self.position
    }
}

fn sanitize_rate(rate: f64) -> f64 {
    if rate.is_finite() && rate > MIN_RATE {
        rate
    } else {
        MIN_RATE
    }
}

impl std::fmt::Debug for Resampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resampler")
            .field("channel", &self.channel)
            .field("position", &self.position)
            .field("rate", &self.rate())
            .field("loop_region", &self.loop_region)
            .finish()
    }
}
