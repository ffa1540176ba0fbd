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
use std::{error::Error, sync::Arc};

use tracing::{info, span, Level};

use crate::{
    audio,
    config::Config,
    midi,
    playsync::StopHandle,
    synth::Synth,
    waveform::Waveform,
};

/// A synth wired to its audio output and, optionally, a MIDI input.
pub struct Session {
    synth: Synth,
    audio_device: Arc<dyn audio::Device>,
    midi_device: Option<Arc<dyn midi::Device>>,
    event_queue: usize,
}

impl Session {
    /// Resolves the devices and builds the synth. Nothing is started yet.
    pub fn from_config(config: &Config) -> Result<Session, Box<dyn Error>> {
        let audio_device = audio::get_device(config.audio())?;
        let midi_device = config
            .midi()
            .map(|midi| midi::get_device(midi.device()))
            .transpose()?;
        let synth = build_synth(config, audio_device.sample_rate())?;

        Ok(Session {
            synth,
            audio_device,
            midi_device,
            event_queue: config.synth().event_queue(),
        })
    }

    pub fn audio_device(&self) -> Arc<dyn audio::Device> {
        self.audio_device.clone()
    }

    pub fn midi_device(&self) -> Option<Arc<dyn midi::Device>> {
        self.midi_device.clone()
    }

    /// Plays until the stop handle fires. MIDI input is watched for the
    /// duration and released afterwards, even if the audio device fails.
    pub fn run(self, stop: StopHandle) -> Result<(), Box<dyn Error>> {
        let span = span!(Level::INFO, "session");
        let _enter = span.enter();

        if stop.is_stopped() {
            info!("Stop requested before the synth started.");
            return Ok(());
        }

        let (sender, receiver) = crossbeam_channel::bounded(self.event_queue);
        match &self.midi_device {
            Some(midi_device) => midi_device.watch_events(sender)?,
            None => info!("No MIDI input configured, nothing will trigger notes."),
        }

        info!(
            audio_device = self.audio_device.name(),
            midi_device = ?self.midi_device.as_ref().map(|device| device.name()),
            "Starting synth."
        );
        let result = self.audio_device.run(self.synth, receiver, stop);

        if let Some(midi_device) = &self.midi_device {
            midi_device.stop_watch_events();
        }
        info!("Synth stopped.");
        result
    }
}

/// Loads the configured waveform and builds a synth for the given output rate.
pub fn build_synth(config: &Config, sample_rate: u32) -> Result<Synth, Box<dyn Error>> {
    let waveform = Arc::new(Waveform::load(&config.waveform_path())?);
    let loop_region = config.waveform().loop_region(&waveform)?;
    let settings = config.synth_settings(sample_rate)?;
    Ok(Synth::new(waveform, loop_region, settings)?)
}
