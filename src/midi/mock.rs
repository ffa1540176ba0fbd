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

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::info;

use crate::synth::SynthEvent;

/// A mock device. Events are injected by hand instead of coming from hardware.
#[derive(Clone)]
pub struct Device {
    name: String,
    sender: Arc<Mutex<Option<Sender<SynthEvent>>>>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            sender: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns true while events are being watched.
    #[cfg(test)]
    pub fn is_watching(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Feeds raw MIDI bytes through as if they came from the device. Ignored
    /// unless events are being watched.
    #[cfg(test)]
    pub fn mock_event(&self, raw_event: &[u8]) {
        if let Some(sender) = self.sender.lock().as_ref() {
            super::forward_event(sender, raw_event);
        }
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    /// Watches MIDI input for events and sends them to the given sender.
    fn watch_events(&self, sender: Sender<SynthEvent>) -> Result<(), Box<dyn Error>> {
        let mut watching = self.sender.lock();
        if watching.is_some() {
            return Err("Already watching events.".into());
        }

        info!(device = self.name, "Watching MIDI events.");
        *watching = Some(sender);
        Ok(())
    }

    /// Stops watching events.
    fn stop_watch_events(&self) {
        self.sender.lock().take();
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Device>, Box<dyn Error>> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::Device as _;

    #[test]
    fn test_mock_events_flow_while_watching() {
        let device = Device::get("mock");
        let (sender, receiver) = crossbeam_channel::bounded(4);

        device.mock_event(&[0x90, 60, 100]);
        assert!(receiver.try_recv().is_err());

        device.watch_events(sender.clone()).unwrap();
        assert!(device.is_watching());
        assert!(device.watch_events(sender).is_err());

        device.mock_event(&[0x80, 60, 0]);
        assert_eq!(
            receiver.try_recv().unwrap(),
            SynthEvent::NoteOff {
                channel: 0,
                note: 60
            }
        );

        device.stop_watch_events();
        assert!(!device.is_watching());
        device.mock_event(&[0x90, 60, 100]);
        assert!(receiver.try_recv().is_err());
    }
}
