//! Precomputed tone buffers
//!
//! The descriptor space is tiny (four frequencies times two channels), so
//! every buffer can be rendered once before capture starts. Playback then
//! costs a hash lookup and an `Arc` clone.

use std::collections::HashMap;

use crate::audio::synth::{StereoBuffer, ToneDescriptor, ToneSynthesizer};

/// Read-only descriptor → buffer map, built once at startup
#[derive(Debug, Clone, Default)]
pub struct ToneCache {
    tones: HashMap<ToneDescriptor, StereoBuffer>,
}

impl ToneCache {
    /// Render every descriptor up front
    pub fn build<I>(synth: &ToneSynthesizer, descriptors: I) -> Self
    where
        I: IntoIterator<Item = ToneDescriptor>,
    {
        let tones = descriptors
            .into_iter()
            .map(|descriptor| (descriptor, synth.render(&descriptor)))
            .collect();
        Self { tones }
    }

    pub fn get(&self, descriptor: &ToneDescriptor) -> Option<&StereoBuffer> {
        self.tones.get(descriptor)
    }

    pub fn len(&self) -> usize {
        self.tones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tones.is_empty()
    }
}

/// Source of tone buffers for playback workers.
///
/// With a cache, lookups never synthesize; descriptors missing from the
/// cache fall back to live rendering with the same shape.
#[derive(Debug, Clone)]
pub struct ToneBank {
    synth: ToneSynthesizer,
    cache: Option<ToneCache>,
}

impl ToneBank {
    /// Render on every request
    pub fn live(synth: ToneSynthesizer) -> Self {
        Self { synth, cache: None }
    }

    /// Precompute the given descriptors
    pub fn precomputed<I>(synth: ToneSynthesizer, descriptors: I) -> Self
    where
        I: IntoIterator<Item = ToneDescriptor>,
    {
        let cache = ToneCache::build(&synth, descriptors);
        tracing::info!("Precomputed {} tone buffers", cache.len());
        Self {
            synth,
            cache: Some(cache),
        }
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    pub fn synthesizer(&self) -> &ToneSynthesizer {
        &self.synth
    }

    pub fn tone(&self, descriptor: &ToneDescriptor) -> StereoBuffer {
        if let Some(buffer) = self.cache.as_ref().and_then(|c| c.get(descriptor)) {
            return buffer.clone();
        }
        self.synth.render(descriptor)
    }
}
