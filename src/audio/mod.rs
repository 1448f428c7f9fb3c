//! Audio subsystem: tone synthesis, caching and device output

pub mod buffer;
pub mod cache;
pub mod device;
pub mod playback;
pub mod sink;
pub mod synth;

pub use cache::{ToneBank, ToneCache};
pub use device::{get_output_device, list_output_devices, OutputDevice, OutputSpec};
pub use playback::{PerTaskSink, SharedStreamSink};
pub use sink::{AudioSink, NullSink};
pub use synth::{render_tone, Channel, StereoBuffer, ToneDescriptor, ToneShape, ToneSynthesizer};
