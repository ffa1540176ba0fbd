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

//! Voice management for polyphonic wavetable playback.
//!
//! Handles voice allocation, retriggering, stealing and note-off behavior.
//! The pool is a fixed arena of voice records created up front; starting a
//! note only overwrites a slot in place, so nothing is allocated while audio
//! is being rendered.

use super::envelope::{Envelope, Stage, INAUDIBLE_LEVEL};
use super::resample::Resampler;
use crate::config::StealFallback;

/// One slot in the voice pool.
#[derive(Debug, Clone)]
pub struct Voice {
    /// The MIDI note this voice is playing.
    note: u8,
    /// The MIDI channel (0-15) that started this voice.
    channel: u8,
    /// Note velocity, normalized to [0, 1].
    velocity: f32,
    /// Whether this voice contributes to the mix.
    active: bool,
    envelope: Envelope,
    player: Resampler,
}

impl Voice {
    /// Returns true if the voice is sounding.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn player(&self) -> &Resampler {
        &self.player
    }

    /// Checks if this voice should respond to a note-off.
    pub fn matches_note_off(&self, channel: u8, note: u8) -> bool {
        self.active && self.note == note && self.channel == channel
    }

    /// The voice's current contribution to the mix.
    #[inline]
    fn sample(&self) -> f32 {
        self.player.output() * self.envelope.output() * self.velocity
    }

    /// Advances the voice one sample and drops it once its release is inaudible.
    #[inline]
    fn advance(&mut self) {
        self.player.next();
        self.envelope.next();

        if self.envelope.stage() == Stage::Release && self.envelope.output() < INAUDIBLE_LEVEL {
            self.active = false;
        }
    }
}

/// A fixed-size pool of voices.
pub struct VoicePool {
    voices: Vec<Voice>,
    steal_fallback: StealFallback,
    /// Read from outside the render path, which never logs.
    steals: u64,
}

impl VoicePool {
    /// Creates a pool of `size` inactive voices (at least one). Every slot
    /// gets its own copy of the player and envelope templates.
    pub fn new(
        size: usize,
        player: &Resampler,
        envelope: Envelope,
        steal_fallback: StealFallback,
    ) -> VoicePool {
        let voices = (0..size.max(1))
            .map(|_| Voice {
                note: 0,
                channel: 0,
                velocity: 0.0,
                active: false,
                envelope,
                player: player.clone(),
            })
            .collect();

        VoicePool {
            voices,
            steal_fallback,
            steals: 0,
        }
    }

    /// Picks the slot a new note should play in.
    ///
    /// In order of preference: the slot already playing this note, the first
    /// free slot, the quietest slot in its release stage, and finally the
    /// configured fallback.
    pub fn allocate(&self, note: u8) -> usize {
        if let Some(slot) = self
            .voices
            .iter()
            .position(|v| v.active && v.note == note)
        {
            return slot;
        }

        if let Some(slot) = self.voices.iter().position(|v| !v.active) {
            return slot;
        }

        if let Some(slot) = quietest(
            self.voices
                .iter()
                .enumerate()
                .filter(|(_, v)| v.envelope.stage() == Stage::Release),
        ) {
            return slot;
        }

        match self.steal_fallback {
            StealFallback::FirstSlot => 0,
            StealFallback::Quietest => quietest(self.voices.iter().enumerate()).unwrap_or(0),
        }
    }

    /// Starts a note, returning the slot it was assigned to. Whatever the slot
    /// was playing is cut, and its envelope and cursor start over.
    pub fn note_on(
        &mut self,
        channel: u8,
        note: u8,
        velocity: f32,
        envelope: Envelope,
        rate: f64,
        cents: f32,
    ) -> usize {
        let slot = self.allocate(note);
        let voice = &mut self.voices[slot];
        if voice.active && voice.note != note {
            self.steals += 1;
        }

        voice.envelope = envelope;
        voice.envelope.reset();
        voice.player.restart(rate);
        voice.player.pitch_offset(cents);
        voice.note = note;
        voice.channel = channel;
        voice.velocity = velocity.clamp(0.0, 1.0);
        voice.active = true;

        slot
    }

    /// Moves every voice playing the note on the channel into its release.
    /// Returns how many voices matched; zero is not an error.
    pub fn note_off(&mut self, channel: u8, note: u8) -> usize {
        let mut released = 0;
        for voice in self
            .voices
            .iter_mut()
            .filter(|v| v.matches_note_off(channel, note))
        {
            voice.envelope.sustain_off();
            released += 1;
        }
        released
    }

    /// Releases every sounding voice on the channel.
    pub fn release_channel(&mut self, channel: u8) -> usize {
        let mut released = 0;
        for voice in self
            .voices
            .iter_mut()
            .filter(|v| v.active && v.channel == channel)
        {
            voice.envelope.sustain_off();
            released += 1;
        }
        released
    }

    /// Cuts every voice on the channel immediately.
    pub fn silence_channel(&mut self, channel: u8) -> usize {
        let mut silenced = 0;
        for voice in self
            .voices
            .iter_mut()
            .filter(|v| v.active && v.channel == channel)
        {
            voice.active = false;
            silenced += 1;
        }
        silenced
    }

    /// Re-rates every sounding voice on the channel.
    pub fn pitch_bend(&mut self, channel: u8, cents: f32) {
        for voice in self
            .voices
            .iter_mut()
            .filter(|v| v.active && v.channel == channel)
        {
            voice.player.pitch_offset(cents);
        }
    }

    /// Sums the active voices. Returns the sum and how many voices took part.
    #[inline]
    pub fn mix(&self) -> (f32, usize) {
        self.voices
            .iter()
            .filter(|v| v.active)
            .fold((0.0, 0), |(sum, count), v| (sum + v.sample(), count + 1))
    }

    /// Advances every active voice by one sample.
    #[inline]
    pub fn advance(&mut self) {
        for voice in self.voices.iter_mut().filter(|v| v.active) {
            voice.advance();
        }
    }

    /// Returns the current number of active voices.
    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.active).count()
    }

    /// Returns the voice in the given slot.
    pub fn voice(&self, slot: usize) -> Option<&Voice> {
        self.voices.get(slot)
    }

    /// Returns the number of slots.
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    /// Returns how many sounding voices were cut to make room for another note.
    pub fn steals(&self) -> u64 {
        self.steals
    }
}

/// The slot with the lowest envelope level. The first one wins ties.
fn quietest<'a>(voices: impl Iterator<Item = (usize, &'a Voice)>) -> Option<usize> {
    voices
        .fold(None, |best: Option<(usize, f32)>, (slot, voice)| {
            let level = voice.envelope.output();
            match best {
                Some((_, best_level)) if best_level <= level => best,
                _ => Some((slot, level)),
            }
        })
        .map(|(slot, _)| slot)
}

impl std::fmt::Debug for VoicePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoicePool")
            .field("active_voices", &self.active_count())
            .field("max_voices", &self.voices.len())
            .field("steal_fallback", &self.steal_fallback)
            .field("steals", &self.steals)
            .finish()
    }
}
