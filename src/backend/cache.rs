//! Reference-counted sampler cache owned by a backend context.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use super::SamplerDesc;

/// Samplers shared between textures with identical descriptions
///
/// Entries live as long as some texture holds the `Arc` returned by
/// [`acquire`](Self::acquire); [`release_unused`](Self::release_unused)
/// drops the ones nobody references anymore.
pub struct SamplerCache<S> {
    entries: HashMap<SamplerDesc, Arc<S>>,
}

impl<S> Default for SamplerCache<S> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<S> SamplerCache<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached sampler for `desc`, creating it on first use
    pub fn acquire(&mut self, desc: SamplerDesc, create: impl FnOnce(&SamplerDesc) -> S) -> Arc<S> {
        let entry = self.entries.entry(desc).or_insert_with(|| {
            debug!("creating sampler {:?}", desc);
            Arc::new(create(&desc))
        });
        Arc::clone(entry)
    }

    /// Drop entries whose only owner is the cache; returns how many were dropped
    pub fn release_unused(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, sampler| Arc::strong_count(sampler) > 1);
        before - self.entries.len()
    }

    /// Number of textures currently referencing `desc`
    pub fn ref_count(&self, desc: &SamplerDesc) -> usize {
        self.entries
            .get(desc)
            .map_or(0, |sampler| Arc::strong_count(sampler) - 1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
