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
use std::error::Error;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use duration_string::DurationString;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use wavesynth::config::{Config, Midi};
use wavesynth::playsync::StopHandle;
use wavesynth::session::Session;
use wavesynth::{audio, midi, render};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A polyphonic wavetable synthesizer."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the available MIDI input devices.
    MidiDevices {},
    /// Plays the synth from MIDI input until Enter is pressed.
    Start {
        /// The path to the synth config.
        config_path: String,
        /// Overrides the configured audio output device.
        #[arg[short, long]]
        device: Option<String>,
        /// Overrides the configured MIDI input device.
        #[arg[short, long]]
        midi_device: Option<String>,
        /// Overrides the configured output sample rate.
        #[arg[short, long]]
        sample_rate: Option<u32>,
    },
    /// Renders a MIDI file through the synth into a WAV file.
    Render {
        /// The path to the synth config.
        config_path: String,
        /// The MIDI file to play.
        midi_file: String,
        /// The WAV file to write.
        output: String,
        /// Longest time to keep rendering after the last event, e.g. 3s.
        #[arg[short, long]]
        tail: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::MidiDevices {} => {
            let devices = midi::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Start {
            config_path,
            device,
            midi_device,
            sample_rate,
        } => {
            let mut config = Config::deserialize(&PathBuf::from(config_path))?;
            if device.is_some() || sample_rate.is_some() {
                let mut audio = config.audio().cloned().unwrap_or_default();
                if let Some(device) = device {
                    audio.set_device(&device);
                }
                if let Some(sample_rate) = sample_rate {
                    audio.set_sample_rate(sample_rate);
                }
                config.set_audio(audio);
            }
            if let Some(midi_device) = midi_device {
                config.set_midi(Midi::new(&midi_device));
            }
            config.validate()?;

            let session = Session::from_config(&config)?;
            let stop = StopHandle::new();
            {
                let stop = stop.clone();
                thread::spawn(move || {
                    let mut line = String::new();
                    if let Err(e) = io::stdin().lock().read_line(&mut line) {
                        warn!(err = e.to_string(), "Unable to read from stdin, stopping");
                    }
                    stop.stop();
                });
            }

            println!("Playing, press Enter to stop.");
            session.run(stop)?;
        }
        Commands::Render {
            config_path,
            midi_file,
            output,
            tail,
        } => {
            let config = Config::deserialize(&PathBuf::from(config_path))?;
            let tail: Duration = match tail {
                Some(tail) => DurationString::from_string(tail)?.into(),
                None => render::DEFAULT_TAIL,
            };

            let summary = render::render_file(
                &config,
                &PathBuf::from(midi_file),
                &PathBuf::from(&output),
                tail,
            )?;
            println!(
                "Rendered {} events into {} ({:.2}s at {}Hz).",
                summary.events,
                output,
                summary.duration().as_secs_f64(),
                summary.sample_rate
            );
        }
    }

    Ok(())
}

