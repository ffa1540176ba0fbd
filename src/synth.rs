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

//! The polyphonic synthesizer core.
//!
//! A [`Synth`] routes [`SynthEvent`]s to a fixed pool of voices and mixes them
//! into a single sample stream. It is owned by whichever thread renders audio;
//! other threads talk to it through a channel that is drained between blocks
//! with [`Synth::process_events`].

use std::sync::Arc;

use crossbeam_channel::Receiver;
use tracing::info;

use crate::config::StealFallback;
use crate::waveform::{LoopRegion, Waveform, WaveformError};

mod envelope;
mod event;
mod resample;
mod voice;

pub use self::envelope::{Envelope, EnvelopeSettings, Stage, INAUDIBLE_LEVEL};
pub use self::event::SynthEvent;
pub use self::resample::Resampler;
pub use self::voice::{Voice, VoicePool};

/// Number of MIDI channels with their own pitch bend.
pub const MIDI_CHANNELS: usize = 16;

/// Highest valid note number and velocity.
const MIDI_MAX: u8 = 127;

/// Everything needed to build a synth besides the waveform.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthSettings {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Size of the voice pool.
    pub voices: usize,
    /// Gain applied to the mix when more than one voice sounds.
    pub headroom: f32,
    /// Bend in cents at full pitch wheel deflection.
    pub pitch_bend_range: f32,
    pub steal_fallback: StealFallback,
    /// Pitch of the recorded waveform in Hz.
    pub base_frequency: f32,
    /// The waveform channel voices read from.
    pub channel: u16,
    pub envelope: EnvelopeSettings,
}

impl Default for SynthSettings {
    fn default() -> Self {
        SynthSettings {
            sample_rate: 44100,
            voices: 10,
            headroom: 0.3,
            pitch_bend_range: 200.0,
            steal_fallback: StealFallback::FirstSlot,
            base_frequency: 220.0,
            channel: 0,
            envelope: EnvelopeSettings::default(),
        }
    }
}

/// Equal-tempered frequency of a MIDI note, with A4 (69) at 440 Hz.
pub fn note_to_frequency(note: u8) -> f32 {
    440.0 * 2f32.powf((note as f32 - 69.0) / 12.0)
}

/// Mixer and event router over a pool of voices.
pub struct Synth {
    pool: VoicePool,
    /// Template copied into a voice on every note-on.
    envelope: Envelope,
    /// Last pitch wheel position per channel, in [-1, 1].
    pitch_bends: [f32; MIDI_CHANNELS],
    /// Playback rate of the recorded pitch: recorded rate over output rate.
    rate_ratio: f64,
    settings: SynthSettings,
    /// Events dropped as out of range. Counted rather than logged since
    /// events are applied on the audio thread.
    ignored_events: u64,
}

impl Synth {
    /// Builds a synth with every voice idle. Fails if the configured channel
    /// does not exist in the waveform.
    pub fn new(
        waveform: Arc<Waveform>,
        loop_region: LoopRegion,
        settings: SynthSettings,
    ) -> Result<Synth, WaveformError> {
        waveform.check_channel(settings.channel)?;
        loop_region.check(&waveform)?;

        let rate_ratio = waveform.sample_rate() as f64 / settings.sample_rate.max(1) as f64;
        let envelope = Envelope::new(&settings.envelope, settings.sample_rate);
        let player = Resampler::new(waveform, settings.channel, rate_ratio, loop_region);
        let pool = VoicePool::new(settings.voices, &player, envelope, settings.steal_fallback);

        info!(
            voices = pool.len(),
            sample_rate = settings.sample_rate,
            loop_start = loop_region.start(),
            loop_end = loop_region.end(),
            steal_fallback = ?settings.steal_fallback,
            "Synth created"
        );

        Ok(Synth {
            pool,
            envelope,
            pitch_bends: [0.0; MIDI_CHANNELS],
            rate_ratio,
            settings,
            ignored_events: 0,
        })
    }

    /// The current mixed sample. Reading has no side effects.
    #[inline]
    pub fn output(&self) -> f32 {
        let (sum, count) = self.pool.mix();
        if count > 1 {
            sum * self.settings.headroom
        } else {
            sum
        }
    }

    /// Advances every active voice by one sample.
    #[inline]
    pub fn next(&mut self) {
        self.pool.advance();
    }

    /// Fills the buffer with consecutive samples.
    pub fn render(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.output();
            self.next();
        }
    }

    /// Applies every event waiting in the queue without blocking. Returns the
    /// number of events applied.
    pub fn process_events(&mut self, events: &Receiver<SynthEvent>) -> usize {
        let mut count = 0;
        while let Ok(event) = events.try_recv() {
            self.handle(event);
            count += 1;
        }
        count
    }

    /// Routes a single event.
    pub fn handle(&mut self, event: SynthEvent) {
        match event {
            SynthEvent::NoteOn {
                channel,
                note,
                velocity,
            } => self.note_on(channel, note, velocity),
            SynthEvent::NoteOff { channel, note } => self.note_off(channel, note),
            SynthEvent::PitchBend { channel, value } => self.pitch_bend(channel, value),
            SynthEvent::AllNotesOff { channel } => self.all_notes_off(channel),
            SynthEvent::AllSoundOff { channel } => self.all_sound_off(channel),
        }
    }

    /// Starts a note. A velocity of zero releases the note instead.
    pub fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        if !valid_channel(channel) || note > MIDI_MAX || velocity > MIDI_MAX {
            self.ignored_events += 1;
            return;
        }
        if velocity == 0 {
            self.note_off(channel, note);
            return;
        }

        self.pool.note_on(
            channel,
            note,
            velocity as f32 / MIDI_MAX as f32,
            self.envelope,
            self.playback_rate(note),
            self.pitch_bend_cents(channel),
        );
    }

    /// Releases a note. Unmatched note-offs are ignored.
    pub fn note_off(&mut self, channel: u8, note: u8) {
        if !valid_channel(channel) || note > MIDI_MAX {
            self.ignored_events += 1;
            return;
        }
        self.pool.note_off(channel, note);
    }

    /// Records the channel's pitch wheel position and re-rates its voices.
    pub fn pitch_bend(&mut self, channel: u8, value: f32) {
        if !valid_channel(channel) || !value.is_finite() {
            self.ignored_events += 1;
            return;
        }
        self.pitch_bends[channel as usize] = value.clamp(-1.0, 1.0);
        self.pool.pitch_bend(channel, self.pitch_bend_cents(channel));
    }

    /// Releases every voice on the channel.
    pub fn all_notes_off(&mut self, channel: u8) {
        if !valid_channel(channel) {
            self.ignored_events += 1;
            return;
        }
        self.pool.release_channel(channel);
    }

    /// Cuts every voice on the channel without a release.
    pub fn all_sound_off(&mut self, channel: u8) {
        if !valid_channel(channel) {
            self.ignored_events += 1;
            return;
        }
        self.pool.silence_channel(channel);
    }

    /// Frames of waveform per output sample that reproduce the note's pitch,
    /// before any pitch bend.
    pub fn playback_rate(&self, note: u8) -> f64 {
        let frequency = note_to_frequency(note) as f64;
        frequency / self.settings.base_frequency as f64 * self.rate_ratio
    }

    /// The channel's current bend in cents. Zero for invalid channels.
    pub fn pitch_bend_cents(&self, channel: u8) -> f32 {
        self.pitch_bends
            .get(channel as usize)
            .map_or(0.0, |value| value * self.settings.pitch_bend_range)
    }

    /// Returns the number of sounding voices.
    pub fn active_voices(&self) -> usize {
        self.pool.active_count()
    }

    /// Returns true when nothing is sounding.
    pub fn is_silent(&self) -> bool {
        self.active_voices() == 0
    }

    /// Returns how many events were ignored for being out of range.
    pub fn ignored_events(&self) -> u64 {
        self.ignored_events
    }

    /// Returns the voice pool.
    pub fn voices(&self) -> &VoicePool {
        &self.pool
    }

    /// Returns the output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.settings.sample_rate
    }
}

fn valid_channel(channel: u8) -> bool {
    (channel as usize) < MIDI_CHANNELS
}

impl std::fmt::Debug for Synth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synth")
            .field("pool", &self.pool)
            .field("pitch_bends", &self.pitch_bends)
            .field("settings", &self.settings)
            .field("ignored_events", &self.ignored_events)
            .finish()
    }
}
