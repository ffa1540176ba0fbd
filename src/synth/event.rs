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
use midly::live::LiveEvent;
use midly::MidiMessage;

/// Controller number for "all sound off".
const CC_ALL_SOUND_OFF: u8 = 120;

/// Controller number for "all notes off".
const CC_ALL_NOTES_OFF: u8 = 123;

/// Center value of the 14 bit pitch wheel.
const PITCH_BEND_CENTER: f32 = 8192.0;

/// An event the synth reacts to. Channels are 0-15.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SynthEvent {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    /// Pitch wheel position in [-1, 1].
    PitchBend { channel: u8, value: f32 },
    AllNotesOff { channel: u8 },
    AllSoundOff { channel: u8 },
}

impl SynthEvent {
    /// Decodes raw MIDI bytes. Returns None for anything unparsable or for
    /// messages the synth ignores.
    pub fn parse(raw: &[u8]) -> Option<SynthEvent> {
        match LiveEvent::parse(raw) {
            Ok(event) => SynthEvent::from_live(&event),
            Err(_) => None,
        }
    }

    /// Converts a parsed MIDI event.
    pub fn from_live(event: &LiveEvent) -> Option<SynthEvent> {
        let LiveEvent::Midi { channel, message } = event else {
            return None;
        };
        SynthEvent::from_message(channel.as_int(), message)
    }

    /// Converts a channel message. Shared between live input and MIDI files.
    pub fn from_message(channel: u8, message: &MidiMessage) -> Option<SynthEvent> {
        match *message {
            MidiMessage::NoteOn { key, vel } => Some(SynthEvent::NoteOn {
                channel,
                note: key.as_int(),
                velocity: vel.as_int(),
            }),
            MidiMessage::NoteOff { key, .. } => Some(SynthEvent::NoteOff {
                channel,
                note: key.as_int(),
            }),
            MidiMessage::PitchBend { bend } => Some(SynthEvent::PitchBend {
                channel,
                value: ((bend.0.as_int() as f32 - PITCH_BEND_CENTER) / PITCH_BEND_CENTER)
                    .clamp(-1.0, 1.0),
            }),
            MidiMessage::Controller { controller, .. } => match controller.as_int() {
                CC_ALL_SOUND_OFF => Some(SynthEvent::AllSoundOff { channel }),
                CC_ALL_NOTES_OFF => Some(SynthEvent::AllNotesOff { channel }),
                _ => None,
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_notes() {
        assert_eq!(
            SynthEvent::parse(&[0x90, 60, 100]),
            Some(SynthEvent::NoteOn {
                channel: 0,
                note: 60,
                velocity: 100
            })
        );
        assert_eq!(
            SynthEvent::parse(&[0x83, 64, 0]),
            Some(SynthEvent::NoteOff {
                channel: 3,
                note: 64
            })
        );
        // Velocity zero is passed through; the synth treats it as a note-off.
        assert_eq!(
            SynthEvent::parse(&[0x9F, 64, 0]),
            Some(SynthEvent::NoteOn {
                channel: 15,
                note: 64,
                velocity: 0
            })
        );
    }

    #[test]
    fn test_parse_pitch_bend() {
        let value = |lsb: u8, msb: u8| match SynthEvent::parse(&[0xE1, lsb, msb]) {
            Some(SynthEvent::PitchBend { channel: 1, value }) => value,
            other => panic!("unexpected event {:?}", other),
        };

        assert_eq!(value(0x00, 0x40), 0.0);
        assert_eq!(value(0x00, 0x00), -1.0);
        assert!((value(0x7F, 0x7F) - 1.0).abs() < 1e-3);
        assert_eq!(value(0x00, 0x60), 0.5);
    }

    #[test]
    fn test_parse_channel_mode_controllers() {
        assert_eq!(
            SynthEvent::parse(&[0xB2, 123, 0]),
            Some(SynthEvent::AllNotesOff { channel: 2 })
        );
        assert_eq!(
            SynthEvent::parse(&[0xB2, 120, 0]),
            Some(SynthEvent::AllSoundOff { channel: 2 })
        );
        assert_eq!(SynthEvent::parse(&[0xB2, 7, 100]), None);
    }

    #[test]
    fn test_parse_ignores_other_input() {
        assert_eq!(SynthEvent::parse(&[]), None);
        assert_eq!(SynthEvent::parse(&[0xC0, 5]), None);
        assert_eq!(SynthEvent::parse(&[0xF8]), None);
    }
}
