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
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::{info, span, Level};

use crate::{
    playsync::StopHandle,
    synth::{Synth, SynthEvent},
};

/// Frames rendered per block by the mock device.
const BLOCK_FRAMES: usize = 256;

/// Most samples kept in the capture buffer. Older samples are discarded.
const MAX_CAPTURED: usize = 10 * 44100;

/// A mock device. Renders the synth in real time blocks into memory.
#[derive(Clone)]
pub struct Device {
    name: String,
    sample_rate: u32,
    is_playing: Arc<AtomicBool>,
    captured: Arc<Mutex<Vec<f32>>>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str, sample_rate: u32) -> Device {
        Device {
            name: name.to_string(),
            sample_rate,
            is_playing: Arc::new(AtomicBool::new(false)),
            captured: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns true if the device is currently playing.
    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::Relaxed)
    }

    /// Returns a copy of the most recently rendered samples.
    pub fn captured(&self) -> Vec<f32> {
        self.captured.lock().clone()
    }
}

impl crate::audio::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Renders one block per block period until stopped.
    fn run(
        &self,
        mut synth: Synth,
        events: Receiver<SynthEvent>,
        stop: StopHandle,
    ) -> Result<(), Box<dyn Error>> {
        let span = span!(Level::INFO, "run synth (mock)");
        let _enter = span.enter();

        info!(device = self.name, "Mock output started");
        self.is_playing.store(true, Ordering::Relaxed);

        let period = Duration::from_secs_f64(BLOCK_FRAMES as f64 / self.sample_rate.max(1) as f64);
        let mut block = vec![0.0; BLOCK_FRAMES];
        loop {
            synth.process_events(&events);
            synth.render(&mut block);
            {
                let mut captured = self.captured.lock();
                captured.extend_from_slice(&block);
                let excess = captured.len().saturating_sub(MAX_CAPTURED);
                if excess > 0 {
                    captured.drain(..excess);
                }
            }

            if stop.wait_timeout(period) {
                break;
            }
        }

        self.is_playing.store(false, Ordering::Relaxed);
        info!(
            device = self.name,
            steals = synth.voices().steals(),
            ignored_events = synth.ignored_events(),
            "Mock output stopped"
        );
        Ok(())
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
