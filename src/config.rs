//! Runtime configuration
//!
//! Loaded from an optional JSON file, then overridden from the command line.
//! Every field has a default, so an empty `{}` is a valid file.

use crate::transport::TransportSettings;
use anyhow::{bail, Context, Result};
use metro_core::tempo::{
    saturating_duration, DEFAULT_BEATS_PER_BAR, DEFAULT_BPM, DEFAULT_PULSES_PER_BEAT,
};
use metro_core::{Tempo, DEFAULT_SPIN_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Where clock pulses come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ClockSource {
    /// Pace pulses ourselves from the configured tempo
    #[default]
    Internal,
    /// Follow clock pulses from the input port
    External,
}

impl fmt::Display for ClockSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockSource::Internal => write!(f, "internal"),
            ClockSource::External => write!(f, "external"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Substring of the MIDI port name, matched against inputs and outputs
    pub port: String,
    pub bpm: f64,
    pub pulses_per_beat: u32,
    pub beats_per_bar: u32,
    pub sleep_resolution_ms: f64,
    pub spin_threshold: f64,
    pub marker_delay_ms: f64,
    /// Capacity of the inbound event queue and the control queue
    pub queue_capacity: usize,
    pub clock: ClockSource,
    /// Name of the voice started on the root track
    pub voice: String,
    pub log_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: "Virtual".to_string(),
            bpm: DEFAULT_BPM,
            pulses_per_beat: DEFAULT_PULSES_PER_BEAT,
            beats_per_bar: DEFAULT_BEATS_PER_BAR,
            sleep_resolution_ms: 1.0,
            spin_threshold: DEFAULT_SPIN_THRESHOLD,
            marker_delay_ms: 1.0,
            queue_capacity: 256,
            clock: ClockSource::Internal,
            voice: crate::voices::DEFAULT_VOICE.to_string(),
            log_capacity: crate::log::DEFAULT_CAPACITY,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?;
        Self::from_json(&text).with_context(|| format!("invalid config '{}'", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.tempo()?;
        if self.queue_capacity == 0 {
            bail!("queue_capacity must be at least 1");
        }
        if !(self.spin_threshold.is_finite() && self.spin_threshold >= 0.0) {
            bail!("spin_threshold must be a non-negative number");
        }
        for (name, value) in [
            ("sleep_resolution_ms", self.sleep_resolution_ms),
            ("marker_delay_ms", self.marker_delay_ms),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                bail!("{name} must be a non-negative number of milliseconds");
            }
        }
        if crate::voices::by_name(&self.voice).is_none() {
            bail!(
                "unknown voice '{}', expected one of: {}",
                self.voice,
                crate::voices::NAMES.join(", ")
            );
        }
        Ok(())
    }

    pub fn tempo(&self) -> Result<Tempo> {
        Ok(Tempo::with_meter(
            self.bpm,
            self.pulses_per_beat,
            self.beats_per_bar,
        )?)
    }

    pub fn settings(&self) -> Result<TransportSettings> {
        Ok(TransportSettings {
            tempo: self.tempo()?,
            sleep_resolution: millis(self.sleep_resolution_ms),
            spin_threshold: self.spin_threshold,
            marker_delay: millis(self.marker_delay_ms),
            log_capacity: self.log_capacity,
        })
    }
}

fn millis(ms: f64) -> Duration {
    saturating_duration(ms / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config, Config::default());
        let settings = config.settings().unwrap();
        assert_eq!(settings.tempo.bpm(), 120.0);
        assert_eq!(settings.sleep_resolution, Duration::from_millis(1));
    }

    #[test]
    fn test_partial_override() {
        let config =
            Config::from_json(r#"{ "bpm": 90, "clock": "external", "port": "IAC" }"#).unwrap();
        assert_eq!(config.bpm, 90.0);
        assert_eq!(config.clock, ClockSource::External);
        assert_eq!(config.port, "IAC");
        assert_eq!(config.pulses_per_beat, 24);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Config::from_json(r#"{ "bpm": 0 }"#).is_err());
        assert!(Config::from_json(r#"{ "pulses_per_beat": 0 }"#).is_err());
        assert!(Config::from_json(r#"{ "queue_capacity": 0 }"#).is_err());
        assert!(Config::from_json(r#"{ "voice": "nope" }"#).is_err());
        assert!(Config::from_json(r#"{ "tempo": 120 }"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "bpm": 140.5, "voice": "groove" }}"#).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.bpm, 140.5);
        assert_eq!(config.voice, "groove");

        let missing = Config::load(Path::new("/nonexistent/metro.json"));
        assert!(missing.is_err());
    }
}
