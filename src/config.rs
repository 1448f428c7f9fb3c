//! Runtime configuration
//!
//! Every field defaults to the compiled-in constants, so a config file is
//! optional and may set only the fields it cares about.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::device::OutputSpec;
use crate::audio::synth::ToneShape;
use crate::constants::*;
use crate::dispatch::{DispatchLimits, ToneMap};
use crate::error::ConfigError;
use crate::network::prefix::LocalNetwork;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SonifierConfig {
    pub tones: TonesConfig,
    pub network: NetworkConfig,
    pub dispatch: DispatchConfig,
    pub synth: SynthConfig,
    pub audio: AudioConfig,
}

/// Frequency per protocol and direction, in Hz
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TonesConfig {
    pub tcp_upstream_hz: u32,
    pub tcp_downstream_hz: u32,
    pub udp_upstream_hz: u32,
    pub udp_downstream_hz: u32,
}

impl Default for TonesConfig {
    fn default() -> Self {
        Self {
            tcp_upstream_hz: TCP_UPSTREAM_HZ,
            tcp_downstream_hz: TCP_DOWNSTREAM_HZ,
            udp_upstream_hz: UDP_UPSTREAM_HZ,
            udp_downstream_hz: UDP_DOWNSTREAM_HZ,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// CIDR prefixes whose source addresses count as upstream
    pub local_prefixes: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            local_prefixes: LOCAL_NETWORK_PREFIXES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub max_concurrent_tones: usize,
    pub max_queue_size: usize,
    pub shutdown_grace_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tones: MAX_CONCURRENT_TONES,
            max_queue_size: MAX_QUEUE_SIZE,
            shutdown_grace_ms: SHUTDOWN_GRACE_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub volume: f32,
    pub fade_secs: f64,
    /// Render every tone once at startup
    pub precompute: bool,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            duration_secs: TONE_DURATION_SECS,
            sample_rate: DEFAULT_SAMPLE_RATE,
            volume: TONE_VOLUME,
            fade_secs: TONE_FADE_SECS,
            precompute: true,
        }
    }
}

/// How playback reaches the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkMode {
    /// One short-lived stream per tone
    #[default]
    PerTask,
    /// One long-lived stream behind a single-writer lock
    Shared,
    /// No audio output
    Null,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sink: SinkMode,
    /// Output device name; default device when unset
    pub device: Option<String>,
    pub frames_per_buffer: u32,
    /// Device buffers the shared stream may queue ahead
    pub shared_queue_chunks: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sink: SinkMode::default(),
            device: None,
            frames_per_buffer: FRAMES_PER_BUFFER,
            shared_queue_chunks: 64,
        }
    }
}

impl SonifierConfig {
    /// Per-user config file location
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "traffic-sonifier")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load `path` if given, else the per-user file if it exists, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => {
                tracing::info!("Loading config from {}", path.display());
                Self::load(path)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| {
            Err(ConfigError::InvalidValue {
                field,
                reason: reason.to_string(),
            })
        };

        let tones = &self.tones;
        if [
            tones.tcp_upstream_hz,
            tones.tcp_downstream_hz,
            tones.udp_upstream_hz,
            tones.udp_downstream_hz,
        ]
        .contains(&0)
        {
            return invalid("tones", "frequencies must be positive");
        }
        if self.dispatch.max_concurrent_tones == 0 {
            return invalid("dispatch.max_concurrent_tones", "must be at least 1");
        }
        if self.dispatch.max_queue_size == 0 {
            return invalid("dispatch.max_queue_size", "must be at least 1");
        }
        if self.audio.frames_per_buffer == 0 {
            return invalid("audio.frames_per_buffer", "must be at least 1");
        }
        if self.audio.shared_queue_chunks == 0 {
            return invalid("audio.shared_queue_chunks", "must be at least 1");
        }

        self.tone_shape()
            .validate()
            .map_err(|e| ConfigError::InvalidValue {
                field: "synth",
                reason: e.to_string(),
            })?;
        self.local_network()?;
        Ok(())
    }

    pub fn tone_map(&self) -> ToneMap {
        ToneMap {
            tcp_upstream_hz: self.tones.tcp_upstream_hz,
            tcp_downstream_hz: self.tones.tcp_downstream_hz,
            udp_upstream_hz: self.tones.udp_upstream_hz,
            udp_downstream_hz: self.tones.udp_downstream_hz,
        }
    }

    pub fn local_network(&self) -> Result<LocalNetwork, ConfigError> {
        LocalNetwork::parse(&self.network.local_prefixes)
    }

    pub fn limits(&self) -> DispatchLimits {
        DispatchLimits {
            max_concurrent_tones: self.dispatch.max_concurrent_tones,
            max_queue_size: self.dispatch.max_queue_size,
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.dispatch.shutdown_grace_ms)
    }

    pub fn tone_shape(&self) -> ToneShape {
        ToneShape {
            duration_secs: self.synth.duration_secs,
            sample_rate: self.synth.sample_rate,
            volume: self.synth.volume,
            fade_secs: self.synth.fade_secs,
        }
    }

    pub fn output_spec(&self) -> OutputSpec {
        OutputSpec {
            sample_rate: self.synth.sample_rate,
            channels: DEFAULT_CHANNELS,
            frames_per_buffer: self.audio.frames_per_buffer,
        }
    }
}
