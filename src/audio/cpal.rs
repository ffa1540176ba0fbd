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
use std::{error::Error, fmt};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Receiver;
use tracing::{error, info, span, Level};

use super::thread_priority::CallbackPriority;
use crate::{
    audio::{Device as AudioDevice, OutputFormat, SampleFormat},
    config,
    playsync::StopHandle,
    synth::{Synth, SynthEvent},
};

/// Name that selects the host's default output device.
const DEFAULT_DEVICE: &str = "default";

/// A small wrapper around a cpal::Device.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// The format the stream is opened with.
    format: OutputFormat,
    /// Fixed stream period in frames, if any.
    buffer_size: Option<u32>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

/// Builds the output callback. The callback owns the synth: it drains pending
/// events, then writes one mono sample per frame into every channel.
fn create_callback<T>(
    mut synth: Synth,
    events: Receiver<SynthEvent>,
    channels: usize,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut priority = CallbackPriority::from_env();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        priority.apply();
        synth.process_events(&events);

        for frame in data.chunks_mut(channels) {
            let sample = T::from_sample(synth.output());
            synth.next();
            frame.fill(sample);
        }
    }
}

impl Device {
    /// Lists cpal devices and produces the Device trait.
    pub fn list() -> Result<Vec<Box<dyn AudioDevice>>, Box<dyn Error>> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|device| {
                let device: Box<dyn AudioDevice> = Box::new(device);
                device
            })
            .collect())
    }

    /// Lists cpal devices that have at least one output channel.
    fn list_cpal_devices() -> Result<Vec<Device>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                if let Some(device) = Device::from_cpal(host_id, device) {
                    devices.push(device);
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Wraps a cpal device, skipping anything without output channels.
    fn from_cpal(host_id: cpal::HostId, device: cpal::Device) -> Option<Device> {
        let max_channels = device
            .supported_output_configs()
            .ok()?
            .map(|config| config.channels())
            .max()
            .unwrap_or(0);
        if max_channels == 0 {
            return None;
        }

        Some(Device {
            name: device.name().ok()?,
            max_channels,
            host_id,
            device,
            format: OutputFormat::default(),
            buffer_size: None,
        })
    }

    /// Gets the given cpal device. "default" picks the default host's default output.
    pub fn get(config: &config::Audio) -> Result<Device, Box<dyn Error>> {
        let name = config.device().ok_or("there must be an audio device specified")?;

        let device = if name == DEFAULT_DEVICE {
            let host = cpal::default_host();
            host.default_output_device()
                .and_then(|device| Device::from_cpal(host.id(), device))
        } else {
            Device::list_cpal_devices()?
                .into_iter()
                .find(|device| device.name.trim() == name)
        };

        match device {
            Some(mut device) => {
                device.format = config.output_format()?;
                device.buffer_size = config.buffer_size();
                info!(
                    device = device.name,
                    format = device.format.to_string(),
                    buffer_size = ?device.buffer_size,
                    "Using audio device"
                );
                Ok(device)
            }
            None => Err(format!("no device found with name {}", name).into()),
        }
    }

    /// Opens the output stream for the configured format.
    fn build_stream(
        &self,
        synth: Synth,
        events: Receiver<SynthEvent>,
    ) -> Result<cpal::Stream, Box<dyn Error>> {
        let channels = self.device.default_output_config()?.channels().max(1);
        let config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(self.format.sample_rate),
            buffer_size: match self.buffer_size {
                Some(frames) => cpal::BufferSize::Fixed(frames),
                None => cpal::BufferSize::Default,
            },
        };
        let channels = channels as usize;
        let err_fn = |err: cpal::StreamError| error!(err = err.to_string(), "Output stream error");

        let stream = match (self.format.sample_format, self.format.bits_per_sample) {
            (SampleFormat::Float, _) => self.device.build_output_stream(
                &config,
                create_callback::<f32>(synth, events, channels),
                err_fn,
                None,
            )?,
            (SampleFormat::Int, 16) => self.device.build_output_stream(
                &config,
                create_callback::<i16>(synth, events, channels),
                err_fn,
                None,
            )?,
            (SampleFormat::Int, 32) => self.device.build_output_stream(
                &config,
                create_callback::<i32>(synth, events, channels),
                err_fn,
                None,
            )?,
            (SampleFormat::Int, bits) => {
                return Err(format!("Unsupported bit depth for integer format: {}", bits).into())
            }
        };

        Ok(stream)
    }
}

impl AudioDevice for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    /// Plays the synth through the device until stopped.
    fn run(
        &self,
        synth: Synth,
        events: Receiver<SynthEvent>,
        stop: StopHandle,
    ) -> Result<(), Box<dyn Error>> {
        let span = span!(Level::INFO, "run synth (cpal)");
        let _enter = span.enter();

        let stream = self.build_stream(synth, events)?;
        stream.play()?;
        info!(device = self.name, "Output stream started");

        stop.wait();

        // Dropping the stream stops the callback and drops the synth with it.
        drop(stream);
        info!(device = self.name, "Output stream stopped");
        Ok(())
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<std::sync::Arc<super::mock::Device>, Box<dyn Error>> {
        Err("not a mock".into())
    }
}
