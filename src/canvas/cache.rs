use std::collections::HashMap;

use super::Surface;

pub const MASK: &str = "mask";
pub const BLURRED_MASK: &str = "blurred-mask";
pub const BLURRED: &str = "blurred";

/// Name-keyed registry of reusable offscreen surfaces
///
/// Surfaces are created on first use and never dropped, so a name maps to
/// the same surface for the lifetime of the cache. Callers resize them per use.
/// Not synchronized: one cache per render loop.
#[derive(Debug, Default)]
pub struct OffscreenCache {
    slots: Vec<Surface>,
    index: HashMap<String, usize>,
}

impl OffscreenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The surface registered under `name`, created if missing
    pub fn surface(&mut self, name: &str) -> &mut Surface {
        let slot = self.slot(name);
        &mut self.slots[slot]
    }

    pub fn get(&self, name: &str) -> Option<&Surface> {
        self.index.get(name).map(|&slot| &self.slots[slot])
    }

    /// Two distinct surfaces at once, both created if missing
    ///
    /// Returns `None` when `a` and `b` name the same surface.
    pub fn pair_mut(&mut self, a: &str, b: &str) -> Option<(&mut Surface, &mut Surface)> {
        if a == b {
            return None;
        }
        let ia = self.slot(a);
        let ib = self.slot(b);
        if ia < ib {
            let (lo, hi) = self.slots.split_at_mut(ib);
            Some((&mut lo[ia], &mut hi[0]))
        } else {
            let (lo, hi) = self.slots.split_at_mut(ia);
            Some((&mut hi[0], &mut lo[ib]))
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&mut self, name: &str) -> usize {
        if let Some(&slot) = self.index.get(name) {
            return slot;
        }
        tracing::debug!("Creating offscreen surface '{}'", name);
        let slot = self.slots.len();
        self.slots.push(Surface::blank());
        self.index.insert(name.to_string(), slot);
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_returns_same_surface() {
        let mut cache = OffscreenCache::new();
        let first = cache.surface(MASK).id();
        cache.surface(BLURRED_MASK);
        cache.surface(MASK).resize(64, 48).unwrap();

        assert_eq!(cache.surface(MASK).id(), first);
        assert_eq!(cache.get(MASK).unwrap().dimensions(), (64, 48));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn get_does_not_create() {
        let cache = OffscreenCache::new();
        assert!(cache.get(MASK).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn pair_mut_returns_surfaces_in_argument_order() {
        let mut cache = OffscreenCache::new();
        let mask = cache.surface(MASK).id();
        let blurred = cache.surface(BLURRED_MASK).id();

        let (b, m) = cache.pair_mut(BLURRED_MASK, MASK).unwrap();
        assert_eq!((b.id(), m.id()), (blurred, mask));
        assert!(cache.pair_mut(MASK, MASK).is_none());
    }
}
