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
use std::{error::Error, fmt, sync::Arc};

use crossbeam_channel::{Sender, TrySendError};
use tracing::{debug, warn};

use crate::synth::SynthEvent;

mod midir;
mod mock;

/// A MIDI device that can listen for inputs.
pub trait Device: fmt::Display + std::marker::Send + std::marker::Sync {
    /// Returns the name of the device.
    fn name(&self) -> String;

    /// Watches MIDI input for events and sends them to the given sender.
    fn watch_events(&self, sender: Sender<SynthEvent>) -> Result<(), Box<dyn Error>>;

    /// Stops watching events.
    fn stop_watch_events(&self);

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Device>, Box<dyn Error>>;
}

/// Lists devices known to midir.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    midir::list()
}

/// Gets a device with the given name.
pub fn get_device(name: &str) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(name)));
    };

    Ok(Arc::new(midir::get(name)?))
}

/// Decodes raw MIDI bytes and queues the result for the synth. Never blocks: when
/// the queue is full the event is dropped.
fn forward_event(sender: &Sender<SynthEvent>, raw_event: &[u8]) {
    let event = match SynthEvent::parse(raw_event) {
        Some(event) => event,
        None => {
            debug!(raw_event = ?raw_event, "Ignoring MIDI message.");
            return;
        }
    };

    match sender.try_send(event) {
        Ok(()) => debug!(event = ?event, "Received MIDI event."),
        Err(TrySendError::Full(event)) => {
            warn!(event = ?event, "Event queue is full, dropping MIDI event.")
        }
        Err(TrySendError::Disconnected(_)) => {
            debug!("Synth has stopped, dropping MIDI event.")
        }
    }
}
