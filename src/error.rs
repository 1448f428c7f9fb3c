//! Error types for the traffic sonifier

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Synth error: {0}")]
    Synth(#[from] SynthError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio output errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Failed to start stream: {0}")]
    PlayError(String),

    #[error("Playback timed out after {0} ms")]
    Timeout(u64),

    #[error("Output stream closed")]
    StreamClosed,
}

/// Tone synthesis errors
#[derive(Error, Debug, PartialEq)]
pub enum SynthError {
    #[error("Invalid tone duration: {0} s")]
    InvalidDuration(f64),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("Volume must be in (0, 1], got {0}")]
    InvalidVolume(f32),

    #[error("Invalid fade duration: {0} s")]
    InvalidFade(f64),
}

/// Packet capture source errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Not a pcap file (magic {0:#010x})")]
    BadMagic(u32),

    #[error("Truncated capture: {0}")]
    Truncated(String),

    #[error("Unsupported link type: {0}")]
    UnsupportedLinkType(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid network prefix: {0}")]
    InvalidPrefix(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::from(AudioError::DeviceNotFound("USB DAC".to_string()));
        assert_eq!(err.to_string(), "Audio error: Device not found: USB DAC");

        let err = Error::from(SynthError::InvalidVolume(1.5));
        assert_eq!(err.to_string(), "Synth error: Volume must be in (0, 1], got 1.5");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            field: "dispatch.max_queue_size",
            reason: "must be at least 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid value for dispatch.max_queue_size: must be at least 1"
        );
    }

    #[test]
    fn test_capture_error_magic() {
        let err = CaptureError::BadMagic(0xdeadbeef);
        assert_eq!(err.to_string(), "Not a pcap file (magic 0xdeadbeef)");
    }
}
