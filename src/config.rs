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
use std::path::{Path, PathBuf};

use config::{Environment, File};
use serde::Deserialize;
use tracing::debug;

use crate::synth::SynthSettings;

mod audio;
mod envelope;
mod error;
mod midi;
mod synth;
mod waveform;

pub use self::audio::Audio;
pub use self::envelope::Envelope;
pub use self::error::ConfigError;
pub use self::midi::Midi;
pub use self::synth::{StealFallback, Synth};
pub use self::waveform::Waveform;

/// Prefix for environment variable overrides, e.g. `WAVESYNTH_SYNTH__VOICES=4`.
const ENV_PREFIX: &str = "WAVESYNTH";

/// The full synthesizer configuration.
#[derive(Deserialize, Clone)]
pub struct Config {
    /// Audio output settings. Needed to play live, optional for rendering.
    audio: Option<Audio>,

    /// MIDI input settings. No input is opened when absent.
    midi: Option<Midi>,

    /// The waveform every voice plays.
    waveform: Waveform,

    /// Voice pool and mixer settings.
    synth: Option<Synth>,

    /// The amplitude envelope applied to each note.
    envelope: Option<Envelope>,

    /// Directory relative paths are resolved against.
    #[serde(skip)]
    base_path: PathBuf,
}

impl Config {
    /// Parses a configuration from a YAML file, applying environment overrides.
    pub fn deserialize(path: &Path) -> Result<Config, ConfigError> {
        let mut config = ::config::Config::builder()
            .add_source(File::from(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Config>()?;

        config.base_path = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        config.validate()?;
        debug!(path = ?path, base_path = ?config.base_path, "Parsed config");
        Ok(config)
    }

    /// Checks every section for out of range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(audio) = &self.audio {
            audio.validate()?;
        }
        self.waveform.validate()?;
        self.synth().validate()?;
        self.envelope().settings()?;
        Ok(())
    }

    /// Returns the audio configuration.
    pub fn audio(&self) -> Option<&Audio> {
        self.audio.as_ref()
    }

    /// Returns the MIDI configuration.
    pub fn midi(&self) -> Option<&Midi> {
        self.midi.as_ref()
    }

    pub fn waveform(&self) -> &Waveform {
        &self.waveform
    }

    /// Returns the synth section, or its defaults.
    pub fn synth(&self) -> Synth {
        self.synth.clone().unwrap_or_default()
    }

    /// Returns the envelope section, or its defaults.
    pub fn envelope(&self) -> Envelope {
        self.envelope.clone().unwrap_or_default()
    }

    /// Resolves the waveform file against the config file's directory.
    pub fn waveform_path(&self) -> PathBuf {
        self.base_path.join(self.waveform.file())
    }

    /// Collects the settings the synth is built from. The output sample rate
    /// comes from the audio section when present.
    pub fn synth_settings(&self, sample_rate: u32) -> Result<SynthSettings, ConfigError> {
        let synth = self.synth();
        Ok(SynthSettings {
            sample_rate,
            voices: synth.voices(),
            headroom: synth.headroom(),
            pitch_bend_range: synth.pitch_bend_range(),
            steal_fallback: synth.steal_fallback(),
            base_frequency: self.waveform.base_frequency(),
            channel: self.waveform.channel(),
            envelope: self.envelope().settings()?,
        })
    }

    /// Replaces the audio section, e.g. from command line flags.
    pub fn set_audio(&mut self, audio: Audio) {
        self.audio = Some(audio);
    }

    /// Replaces the MIDI section.
    pub fn set_midi(&mut self, midi: Midi) {
        self.midi = Some(midi);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use config::FileFormat;

    use super::*;

    fn parse(yaml: &str) -> Config {
        ::config::Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(
            r#"
            waveform:
              file: WavetableSynth.wav
            "#,
        );
        assert!(config.audio().is_none());
        assert!(config.midi().is_none());
        config.validate().unwrap();

        let settings = config.synth_settings(44100).unwrap();
        assert_eq!(settings.sample_rate, 44100);
        assert_eq!(settings.voices, 10);
        assert_eq!(settings.headroom, 0.3);
        assert_eq!(settings.pitch_bend_range, 200.0);
        assert_eq!(settings.steal_fallback, StealFallback::FirstSlot);
        assert_eq!(settings.base_frequency, 220.0);
        assert_eq!(settings.channel, 0);
        assert_eq!(settings.envelope.attack, Duration::from_millis(50));
        assert_eq!(settings.envelope.decay, Duration::from_millis(300));
        assert_eq!(settings.envelope.sustain, 0.7);
        assert_eq!(settings.envelope.release, Duration::from_secs(2));
    }

    #[test]
    fn test_full_config() {
        let config = parse(
            r#"
            audio:
              device: UltraLite-mk5
              sample_rate: 48000
              sample_format: int
              bits_per_sample: 16
              buffer_size: 128
            midi:
              device: Keystation
            waveform:
              file: pad.flac
              base_frequency: 110.0
              channel: 1
              loop_start: 1000
              loop_end: 40000
            synth:
              voices: 4
              headroom: 0.5
              pitch_bend_range: 1200
              event_queue: 64
              steal_fallback: quietest
            envelope:
              attack: 10ms
              decay: 1s
              sustain: 0.25
              release: 500ms
            "#,
        );
        config.validate().unwrap();

        let audio = config.audio().unwrap();
        assert_eq!(audio.device(), Some("UltraLite-mk5"));
        assert_eq!(audio.sample_rate(), 48000);
        assert_eq!(audio.buffer_size(), Some(128));
        assert_eq!(config.midi().unwrap().device(), "Keystation");
        assert_eq!(config.waveform().loop_bounds(), (Some(1000), Some(40000)));
        assert_eq!(config.synth().event_queue(), 64);

        let settings = config.synth_settings(audio.sample_rate()).unwrap();
        assert_eq!(settings.sample_rate, 48000);
        assert_eq!(settings.voices, 4);
        assert_eq!(settings.headroom, 0.5);
        assert_eq!(settings.pitch_bend_range, 1200.0);
        assert_eq!(settings.steal_fallback, StealFallback::Quietest);
        assert_eq!(settings.base_frequency, 110.0);
        assert_eq!(settings.channel, 1);
        assert_eq!(settings.envelope.attack, Duration::from_millis(10));
        assert_eq!(settings.envelope.release, Duration::from_millis(500));
    }

    #[test]
    fn test_invalid_values_rejected() {
        for yaml in [
            "waveform: {file: a.wav, base_frequency: 0}",
            "waveform: {file: a.wav, loop_start: 10, loop_end: 5}",
            "{waveform: {file: a.wav}, synth: {voices: 0}}",
            "{waveform: {file: a.wav}, synth: {headroom: -1}}",
            "{waveform: {file: a.wav}, synth: {event_queue: 0}}",
            "{waveform: {file: a.wav}, envelope: {sustain: 1.5}}",
            "{waveform: {file: a.wav}, envelope: {attack: soon}}",
            "{waveform: {file: a.wav}, audio: {sample_rate: 0}}",
            "{waveform: {file: a.wav}, audio: {sample_format: double}}",
        ] {
            assert!(parse(yaml).validate().is_err(), "accepted {}", yaml);
        }
    }

    #[test]
    fn test_deserialize_file_resolves_waveform_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synth.yaml");
        std::fs::write(
            &path,
            "waveform:\n  file: sounds/pad.wav\nenvelope:\n  release: 1s\n",
        )
        .unwrap();

        let config = Config::deserialize(&path).unwrap();
        assert_eq!(config.waveform_path(), dir.path().join("sounds/pad.wav"));
        assert_eq!(
            config.envelope().settings().unwrap().release,
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_deserialize_missing_file() {
        let result = Config::deserialize(Path::new("/definitely/not/here.yaml"));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_deserialize_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synth.yaml");
        std::fs::write(&path, "waveform:\n  file: a.wav\nsynth:\n  voices: 0\n").unwrap();

        assert!(matches!(
            Config::deserialize(&path),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
