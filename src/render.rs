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
use std::{error::Error, fs, path::Path, time::Duration};

use hound::{SampleFormat, WavSpec, WavWriter};
use midly::{Format, MetaMessage, Smf, Timing, TrackEventKind};
use tracing::{debug, info, span, Level};

use crate::{
    audio::OutputFormat,
    config::Config,
    session,
    synth::{Synth, SynthEvent},
};

/// Tempo assumed until the file sets one, in microseconds per quarter note.
const DEFAULT_TEMPO: u32 = 500_000;

/// Frames rendered per block while waiting for the tail to die out.
const TAIL_BLOCK: usize = 512;

/// How long to keep rendering after the last event when nothing else is given.
pub const DEFAULT_TAIL: Duration = Duration::from_secs(5);

/// Longest output a render may produce, events and tail together.
pub const MAX_RENDER: Duration = Duration::from_secs(60 * 60);

/// A synth event scheduled at an absolute sample offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedEvent {
    pub at: u64,
    pub event: SynthEvent,
}

/// What a render produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSummary {
    pub events: usize,
    pub frames: usize,
    pub sample_rate: u32,
}

impl RenderSummary {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames as f64 / self.sample_rate.max(1) as f64)
    }
}

/// An event in file order, before tick times are turned into samples.
enum Scheduled {
    Tempo(u32),
    Event(SynthEvent),
}

/// Flattens every track of a MIDI file into one list ordered by sample offset.
/// Single track and sequential files play their tracks back to back, parallel
/// files play them at once. Messages the synth ignores are dropped.
pub fn schedule(smf: &Smf, sample_rate: u32) -> Result<Vec<TimedEvent>, Box<dyn Error>> {
    let sequential = matches!(smf.header.format, Format::SingleTrack | Format::Sequential);

    let mut merged: Vec<(u64, Scheduled)> = Vec::new();
    let mut track_start = 0u64;
    for track in &smf.tracks {
        let mut tick = track_start;
        for event in track {
            tick += u64::from(event.delta.as_int());
            match event.kind {
                TrackEventKind::Midi { channel, message } => {
                    if let Some(event) = SynthEvent::from_message(channel.as_int(), &message) {
                        merged.push((tick, Scheduled::Event(event)));
                    }
                }
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                    merged.push((tick, Scheduled::Tempo(tempo.as_int())));
                }
                _ => {}
            }
        }
        if sequential {
            track_start = tick;
        }
    }
    // Stable, so events sharing a tick keep track order.
    merged.sort_by_key(|(tick, _)| *tick);

    let rate = f64::from(sample_rate);
    let mut scheduled = Vec::with_capacity(merged.len());
    match smf.header.timing {
        Timing::Metrical(ticks_per_beat) => {
            let ticks_per_beat = f64::from(ticks_per_beat.as_int());
            if ticks_per_beat == 0.0 {
                return Err("MIDI file has zero ticks per beat".into());
            }

            let mut tempo = DEFAULT_TEMPO;
            let mut last_tick = 0u64;
            let mut seconds = 0.0f64;
            for (tick, item) in merged {
                seconds += (tick - last_tick) as f64 * f64::from(tempo) / 1_000_000.0 / ticks_per_beat;
                last_tick = tick;
                match item {
                    Scheduled::Tempo(new_tempo) => tempo = new_tempo,
                    Scheduled::Event(event) => scheduled.push(TimedEvent {
                        at: (seconds * rate).round() as u64,
                        event,
                    }),
                }
            }
        }
        Timing::Timecode(fps, subframes) => {
            let ticks_per_second = f64::from(fps.as_f32()) * f64::from(subframes);
            if ticks_per_second == 0.0 {
                return Err("MIDI file has zero ticks per second".into());
            }

            for (tick, item) in merged {
                if let Scheduled::Event(event) = item {
                    scheduled.push(TimedEvent {
                        at: (tick as f64 / ticks_per_second * rate).round() as u64,
                        event,
                    });
                }
            }
        }
    }

    Ok(scheduled)
}

/// Plays the events through the synth, then keeps rendering until every voice
/// is silent or the tail runs out. Fails before rendering anything if the
/// result could run past [`MAX_RENDER`].
pub fn render(
    synth: &mut Synth,
    events: &[TimedEvent],
    tail: Duration,
) -> Result<Vec<f32>, Box<dyn Error>> {
    let rate = f64::from(synth.sample_rate());
    let max_frames = (MAX_RENDER.as_secs_f64() * rate) as u64;
    let tail_frames = (tail.as_secs_f64() * rate).round() as u64;
    let last = events.iter().map(|timed| timed.at).max().unwrap_or(0);
    if last.saturating_add(tail_frames) > max_frames {
        return Err(format!(
            "render would run for {:.1}s, longer than the {}s limit",
            last.saturating_add(tail_frames) as f64 / rate.max(1.0),
            MAX_RENDER.as_secs()
        )
        .into());
    }
    let tail_frames = tail_frames as usize;

    let mut output: Vec<f32> = Vec::new();
    for timed in events {
        let at = timed.at as usize;
        if at > output.len() {
            let start = output.len();
            output.resize(at, 0.0);
            synth.render(&mut output[start..]);
        }
        synth.handle(timed.event);
    }

    let mut rendered = 0;
    let mut block = [0.0f32; TAIL_BLOCK];
    while rendered < tail_frames && !synth.is_silent() {
        let frames = TAIL_BLOCK.min(tail_frames - rendered);
        synth.render(&mut block[..frames]);
        output.extend_from_slice(&block[..frames]);
        rendered += frames;
    }
    debug!(tail_frames = rendered, "Rendered tail");

    Ok(output)
}

/// Writes mono 32 bit float samples to a WAV file.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), Box<dyn Error>> {
    let mut writer = WavWriter::create(
        path,
        WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    )?;
    for sample in samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Renders a MIDI file through the configured synth into a WAV file. The
/// sample rate comes from the audio section, if there is one.
pub fn render_file(
    config: &Config,
    midi_file: &Path,
    output: &Path,
    tail: Duration,
) -> Result<RenderSummary, Box<dyn Error>> {
    let span = span!(Level::INFO, "render");
    let _enter = span.enter();

    let sample_rate = config
        .audio()
        .map(|audio| audio.sample_rate())
        .unwrap_or(OutputFormat::default().sample_rate);
    let mut synth = session::build_synth(config, sample_rate)?;

    let buf: Vec<u8> = fs::read(midi_file)?;
    let smf = Smf::parse(&buf)?;
    let events = schedule(&smf, sample_rate)?;
    info!(
        midi_file = ?midi_file,
        events = events.len(),
        sample_rate,
        "Rendering MIDI file"
    );

    let samples = render(&mut synth, &events, tail)?;
    write_wav(output, &samples, sample_rate)?;

    let summary = RenderSummary {
        events: events.len(),
        frames: samples.len(),
        sample_rate,
    };
    info!(
        output = ?output,
        duration = ?summary.duration(),
        steals = synth.voices().steals(),
        ignored_events = synth.ignored_events(),
        "Render complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use midly::{
        num::{u15, u24, u28, u4, u7},
        Fps, Header, MidiMessage, TrackEvent,
    };

    use super::*;
    use crate::synth::{EnvelopeSettings, SynthSettings};
    use crate::testutil::{read_wav, rms, sine_samples};
    use crate::waveform::{LoopRegion, Waveform};

    fn midi(delta: u32, message: MidiMessage) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message,
            },
        }
    }

    fn note_on(delta: u32, key: u8) -> TrackEvent<'static> {
        midi(
            delta,
            MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(100),
            },
        )
    }

    fn note_off(delta: u32, key: u8) -> TrackEvent<'static> {
        midi(
            delta,
            MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(0),
            },
        )
    }

    fn tempo(delta: u32, micros: u32) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(micros))),
        }
    }

    fn end_of_track() -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        }
    }

    fn smf(format: Format, timing: Timing, tracks: Vec<Vec<TrackEvent<'static>>>) -> Smf<'static> {
        let mut smf = Smf::new(Header::new(format, timing));
        smf.tracks = tracks;
        smf
    }

    fn offsets(events: &[TimedEvent]) -> Vec<u64> {
        events.iter().map(|timed| timed.at).collect()
    }

    fn test_synth(release: Duration) -> Synth {
        let waveform = Waveform::from_samples(sine_samples(220.0, 44100, 44100), 1, 44100).unwrap();
        let loop_region = LoopRegion::default_for(&waveform);
        Synth::new(
            Arc::new(waveform),
            loop_region,
            SynthSettings {
                envelope: EnvelopeSettings {
                    attack: Duration::from_millis(1),
                    decay: Duration::from_millis(1),
                    sustain: 1.0,
                    release,
                },
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_schedule_default_tempo() {
        let smf = smf(
            Format::SingleTrack,
            Timing::Metrical(u15::new(480)),
            vec![vec![note_on(0, 60), note_off(480, 60), end_of_track()]],
        );

        let events = schedule(&smf, 44100).unwrap();
        assert_eq!(offsets(&events), vec![0, 22050]);
        assert_eq!(
            events[1].event,
            SynthEvent::NoteOff {
                channel: 0,
                note: 60
            }
        );
    }

    #[test]
    fn test_schedule_tempo_change() {
        let smf = smf(
            Format::SingleTrack,
            Timing::Metrical(u15::new(480)),
            vec![vec![
                note_on(0, 60),
                tempo(480, 250_000),
                note_off(480, 60),
                end_of_track(),
            ]],
        );

        assert_eq!(offsets(&schedule(&smf, 44100).unwrap()), vec![0, 33075]);
    }

    #[test]
    fn test_schedule_parallel_tracks_merge() {
        let smf = smf(
            Format::Parallel,
            Timing::Metrical(u15::new(96)),
            vec![
                vec![tempo(0, 1_000_000), end_of_track()],
                vec![note_on(96, 60), note_off(96, 60), end_of_track()],
                vec![note_on(48, 64), note_off(96, 64), end_of_track()],
            ],
        );

        let events = schedule(&smf, 1000).unwrap();
        assert_eq!(offsets(&events), vec![500, 1000, 1500, 2000]);
        assert_eq!(
            events[0].event,
            SynthEvent::NoteOn {
                channel: 0,
                note: 64,
                velocity: 100
            }
        );
    }

    #[test]
    fn test_schedule_sequential_tracks_follow_each_other() {
        let smf = smf(
            Format::Sequential,
            Timing::Metrical(u15::new(100)),
            vec![
                vec![note_on(0, 60), note_off(100, 60), end_of_track()],
                vec![note_on(0, 62), note_off(100, 62), end_of_track()],
            ],
        );

        assert_eq!(
            offsets(&schedule(&smf, 1000).unwrap()),
            vec![0, 500, 500, 1000]
        );
    }

    #[test]
    fn test_schedule_timecode() {
        let smf = smf(
            Format::SingleTrack,
            Timing::Timecode(Fps::Fps25, 40),
            vec![vec![note_on(0, 60), note_off(1000, 60), end_of_track()]],
        );

        assert_eq!(offsets(&schedule(&smf, 48000).unwrap()), vec![0, 48000]);
    }

    #[test]
    fn test_schedule_drops_ignored_messages() {
        let smf = smf(
            Format::SingleTrack,
            Timing::Metrical(u15::new(480)),
            vec![vec![
                midi(
                    0,
                    MidiMessage::ProgramChange {
                        program: u7::new(3),
                    },
                ),
                note_on(0, 60),
                end_of_track(),
            ]],
        );

        assert_eq!(schedule(&smf, 44100).unwrap().len(), 1);
    }

    #[test]
    fn test_render_places_events_and_stops_when_silent() {
        let mut synth = test_synth(Duration::from_millis(10));
        let events = [
            TimedEvent {
                at: 1000,
                event: SynthEvent::NoteOn {
                    channel: 0,
                    note: 57,
                    velocity: 127,
                },
            },
            TimedEvent {
                at: 5000,
                event: SynthEvent::NoteOff {
                    channel: 0,
                    note: 57,
                },
            },
        ];

        let output = render(&mut synth, &events, DEFAULT_TAIL).unwrap();
        assert!(output[..1000].iter().all(|sample| *sample == 0.0));
        assert!(rms(&output[1000..5000]) > 0.1);
        // The release dies out well before the tail cap.
        assert!(output.len() > 5000);
        assert!(output.len() < 5000 + 44100);
        assert!(synth.is_silent());
    }

    #[test]
    fn test_render_tail_is_capped() {
        let mut synth = test_synth(Duration::from_secs(60));
        let events = [TimedEvent {
            at: 0,
            event: SynthEvent::NoteOn {
                channel: 0,
                note: 57,
                velocity: 127,
            },
        }];

        let output = render(&mut synth, &events, Duration::from_millis(100)).unwrap();
        assert_eq!(output.len(), 4410);
        assert!(!synth.is_silent());
    }

    #[test]
    fn test_render_rejects_runaway_length() {
        let mut synth = test_synth(Duration::from_millis(10));
        let note = SynthEvent::NoteOn {
            channel: 0,
            note: 57,
            velocity: 127,
        };

        // Slowest tempo and longest delta a file can hold.
        let smf = smf(
            Format::SingleTrack,
            Timing::Metrical(u15::new(1)),
            vec![vec![
                tempo(0, 0x00FF_FFFF),
                note_on(0x0FFF_FFFF, 57),
                end_of_track(),
            ]],
        );
        let events = schedule(&smf, 44100).unwrap();
        assert!(events[0].at > 1 << 40);
        assert!(render(&mut synth, &events, DEFAULT_TAIL).is_err());
        assert!(synth.is_silent());

        let at_limit = TimedEvent {
            at: MAX_RENDER.as_secs() * 44100,
            event: note,
        };
        assert!(render(&mut synth, &[at_limit], Duration::from_secs(1)).is_err());
        assert!(render(&mut synth, &[], MAX_RENDER + Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_render_file() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(
            &dir.path().join("sine.wav"),
            &sine_samples(220.0, 44100, 44100),
            44100,
        )
        .unwrap();
        let config_path = dir.path().join("synth.yaml");
        fs::write(
            &config_path,
            "waveform:\n  file: sine.wav\naudio:\n  sample_rate: 22050\nenvelope:\n  release: 50ms\n",
        )
        .unwrap();
        let config = Config::deserialize(&config_path).unwrap();

        let midi_path = dir.path().join("song.mid");
        smf(
            Format::SingleTrack,
            Timing::Metrical(u15::new(480)),
            vec![vec![note_on(0, 57), note_off(960, 57), end_of_track()]],
        )
        .save(&midi_path)
        .unwrap();

        let output_path = dir.path().join("out.wav");
        let summary = render_file(&config, &midi_path, &output_path, DEFAULT_TAIL).unwrap();
        assert_eq!(summary.events, 2);
        assert_eq!(summary.sample_rate, 22050);
        assert!(summary.duration() >= Duration::from_secs(1));
        assert!(summary.duration() < Duration::from_secs(2));

        let (spec, samples) = read_wav(&output_path).unwrap();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 22050);
        assert_eq!(spec.bits_per_sample, 32);
        assert_eq!(spec.sample_format, SampleFormat::Float);
        assert_eq!(samples.len(), summary.frames);
        assert!(rms(&samples[..22050]) > 0.1);
    }

    #[test]
    fn test_render_file_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("sine.wav"), &sine_samples(220.0, 44100, 4410), 44100)
            .unwrap();
        let config_path = dir.path().join("synth.yaml");
        fs::write(&config_path, "waveform:\n  file: sine.wav\n").unwrap();
        let config = Config::deserialize(&config_path).unwrap();

        let midi_path = dir.path().join("song.mid");
        fs::write(&midi_path, b"not a midi file").unwrap();
        assert!(render_file(&config, &midi_path, &dir.path().join("out.wav"), DEFAULT_TAIL).is_err());
    }
}
