//! Output device lookup and stream construction

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};

use crate::constants::{DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE, FRAMES_PER_BUFFER};
use crate::error::AudioError;

/// Fixed output stream parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub frames_per_buffer: u32,
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            frames_per_buffer: FRAMES_PER_BUFFER,
        }
    }
}

impl OutputSpec {
    pub fn stream_config(&self) -> cpal::StreamConfig {
        cpal::StreamConfig {
            channels: self.channels,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(self.frames_per_buffer),
        }
    }

    /// Interleaved samples in one device buffer
    pub fn samples_per_buffer(&self) -> usize {
        self.frames_per_buffer as usize * self.channels as usize
    }
}

/// Summary of an output device for listing
#[derive(Debug, Clone)]
pub struct OutputDeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

/// Wrapper around a cpal output device
pub struct OutputDevice {
    inner: cpal::Device,
    pub name: String,
}

impl OutputDevice {
    pub fn from_cpal(device: cpal::Device) -> Self {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        Self {
            inner: device,
            name,
        }
    }

    pub fn inner(&self) -> &cpal::Device {
        &self.inner
    }

    /// Build and start an output stream pulling interleaved i16 samples
    /// from `fill`.
    ///
    /// Samples are converted to the device's native format inside the
    /// callback. `on_error` runs on the audio thread when the backend
    /// reports a stream failure. The stream stops when the returned handle
    /// is dropped.
    pub fn open_stream<F, E>(
        &self,
        spec: &OutputSpec,
        fill: F,
        on_error: E,
    ) -> Result<cpal::Stream, AudioError>
    where
        F: FnMut(&mut [i16]) + Send + 'static,
        E: FnMut(cpal::StreamError) + Send + 'static,
    {
        let format = self
            .inner
            .default_output_config()
            .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?
            .sample_format();
        let config = spec.stream_config();

        let stream = match format {
            SampleFormat::I16 => build_stream::<i16, F, E>(&self.inner, &config, fill, on_error),
            SampleFormat::I32 => build_stream::<i32, F, E>(&self.inner, &config, fill, on_error),
            SampleFormat::U16 => build_stream::<u16, F, E>(&self.inner, &config, fill, on_error),
            SampleFormat::F32 => build_stream::<f32, F, E>(&self.inner, &config, fill, on_error),
            SampleFormat::F64 => build_stream::<f64, F, E>(&self.inner, &config, fill, on_error),
            other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
        }?;

        stream
            .play()
            .map_err(|e| AudioError::PlayError(e.to_string()))?;
        Ok(stream)
    }
}

fn build_stream<T, F, E>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut fill: F,
    on_error: E,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + FromSample<i16>,
    F: FnMut(&mut [i16]) + Send + 'static,
    E: FnMut(cpal::StreamError) + Send + 'static,
{
    let mut scratch: Vec<i16> = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if scratch.len() < data.len() {
                    scratch.resize(data.len(), 0);
                }
                let pcm = &mut scratch[..data.len()];
                fill(pcm);
                for (out, sample) in data.iter_mut().zip(pcm.iter()) {
                    *out = T::from_sample(*sample);
                }
            },
            on_error,
            None,
        )
        .map_err(|e| AudioError::StreamError(e.to_string()))
}

/// List all available output devices
pub fn list_output_devices() -> Vec<OutputDeviceInfo> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());
    let mut devices = Vec::new();

    if let Ok(output_devices) = host.output_devices() {
        for device in output_devices {
            if let Ok(name) = device.name() {
                let (sample_rates, channels) = get_device_capabilities(&device);
                devices.push(OutputDeviceInfo {
                    is_default: default_name.as_ref() == Some(&name),
                    name,
                    sample_rates,
                    channels,
                });
            }
        }
    }

    devices
}

fn get_device_capabilities(device: &cpal::Device) -> (Vec<u32>, Vec<u16>) {
    let mut sample_rates = Vec::new();
    let mut channels = Vec::new();

    if let Ok(configs) = device.supported_output_configs() {
        for config in configs {
            for rate_val in [44100u32, 48000, 88200, 96000] {
                let rate = cpal::SampleRate(rate_val);
                if rate >= config.min_sample_rate()
                    && rate <= config.max_sample_rate()
                    && !sample_rates.contains(&rate_val)
                {
                    sample_rates.push(rate_val);
                }
            }
            let ch = config.channels();
            if !channels.contains(&ch) {
                channels.push(ch);
            }
        }
    }

    sample_rates.sort();
    channels.sort();
    (sample_rates, channels)
}

/// Get an output device by name, or the default one when `name` is `None`
pub fn get_output_device(name: Option<&str>) -> Result<OutputDevice, AudioError> {
    let host = cpal::default_host();

    let Some(name) = name else {
        return host
            .default_output_device()
            .map(OutputDevice::from_cpal)
            .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string()));
    };

    let devices = host
        .output_devices()
        .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?;

    for device in devices {
        if device.name().ok().as_deref() == Some(name) {
            return Ok(OutputDevice::from_cpal(device));
        }
    }

    Err(AudioError::DeviceNotFound(name.to_string()))
}
