//! Decoded-sample cache.
//!
//! Avoids re-decoding identical (owner, time) pairs across repeated reads
//! at the same simulation time. Each entry is a two-slot buffer: with
//! double buffering enabled, a new sample is staged in the back slot and
//! published with a single atomic index store, so a concurrent reader of
//! the published slot never observes a torn sample.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::graph::{AttrId, SchemaId};
use crate::schema::camera::CameraData;
use crate::schema::mesh::MeshData;
use crate::schema::points::PointsData;
use crate::schema::xform::XformData;
use crate::util::Time;
use crate::value::Value;

/// What a cache entry belongs to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum CacheOwner {
    Schema(SchemaId),
    Attr(AttrId),
}

/// Cache key: owner plus the exact requested time.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SampleKey {
    owner: CacheOwner,
    time_bits: u64,
}

impl SampleKey {
    pub fn schema(id: SchemaId, t: Time) -> Self {
        Self { owner: CacheOwner::Schema(id), time_bits: t.to_bits() }
    }

    pub fn attr(id: AttrId, t: Time) -> Self {
        Self { owner: CacheOwner::Attr(id), time_bits: t.to_bits() }
    }

    pub fn owner(&self) -> CacheOwner {
        self.owner
    }
}

/// A decoded sample, shared between the cache and zero-copy readers.
#[derive(Clone)]
pub enum CachedSample {
    Xform(Arc<XformData>),
    Camera(Arc<CameraData>),
    Mesh(Arc<MeshData>),
    Points(Arc<PointsData>),
    Value(Arc<Value>),
}

struct Slot {
    bufs: [RwLock<Option<CachedSample>>; 2],
    current: AtomicUsize,
}

impl Slot {
    fn new() -> Self {
        Self {
            bufs: [RwLock::new(None), RwLock::new(None)],
            current: AtomicUsize::new(0),
        }
    }

    fn get(&self) -> Option<CachedSample> {
        let i = self.current.load(Ordering::Acquire);
        self.bufs[i].read().clone()
    }

    fn put(&self, sample: CachedSample, double_buffered: bool) {
        if double_buffered {
            let back = 1 - self.current.load(Ordering::Acquire);
            *self.bufs[back].write() = Some(sample);
            // Publish: readers switch to the staged slot atomically.
            self.current.store(back, Ordering::Release);
        } else {
            let i = self.current.load(Ordering::Acquire);
            *self.bufs[i].write() = Some(sample);
        }
    }
}

/// Per-context cache of decoded samples.
#[derive(Default)]
pub struct SampleCache {
    entries: RwLock<HashMap<SampleKey, Arc<Slot>>>,
}

impl SampleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a decoded sample. Miss returns `None`.
    pub fn get(&self, key: &SampleKey) -> Option<CachedSample> {
        let slot = self.entries.read().get(key).cloned()?;
        slot.get()
    }

    /// Store a decoded sample for the key.
    pub fn put(&self, key: SampleKey, sample: CachedSample, double_buffered: bool) {
        let slot = {
            let mut entries = self.entries.write();
            entries.entry(key).or_insert_with(|| Arc::new(Slot::new())).clone()
        };
        slot.put(sample, double_buffered);
    }

    /// Drop all cached samples, forcing re-decode on the next read. The
    /// underlying document is untouched.
    pub fn invalidate_all(&self) {
        self.entries.write().clear();
    }

    /// Drop all cached samples for one owner (every time key).
    pub fn invalidate_owner(&self, owner: CacheOwner) {
        self.entries.write().retain(|k, _| k.owner != owner);
    }

    /// Drop cached samples for every owner the predicate matches.
    pub fn invalidate_if(&self, mut pred: impl FnMut(CacheOwner) -> bool) {
        self.entries.write().retain(|k, _| !pred(k.owner));
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(v: f32) -> CachedSample {
        CachedSample::Value(Arc::new(Value::Float(v)))
    }

    fn unwrap_float(s: CachedSample) -> f32 {
        match s {
            CachedSample::Value(v) => v.as_float().unwrap(),
            _ => panic!("expected value sample"),
        }
    }

    #[test]
    fn test_cache_insert_get() {
        let cache = SampleCache::new();
        let key = SampleKey::schema(SchemaId(1), 0.5);

        assert!(cache.get(&key).is_none());
        cache.put(key, sample(1.0), false);
        assert_eq!(unwrap_float(cache.get(&key).unwrap()), 1.0);
    }

    #[test]
    fn test_cache_distinct_times() {
        let cache = SampleCache::new();
        cache.put(SampleKey::schema(SchemaId(1), 0.0), sample(1.0), false);
        cache.put(SampleKey::schema(SchemaId(1), 1.0), sample(2.0), false);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cache_invalidate_all() {
        let cache = SampleCache::new();
        let key = SampleKey::attr(AttrId(3), 0.0);
        cache.put(key, sample(1.0), false);

        cache.invalidate_all();
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_invalidate_owner() {
        let cache = SampleCache::new();
        cache.put(SampleKey::schema(SchemaId(1), 0.0), sample(1.0), false);
        cache.put(SampleKey::schema(SchemaId(1), 1.0), sample(2.0), false);
        cache.put(SampleKey::schema(SchemaId(2), 0.0), sample(3.0), false);

        cache.invalidate_owner(CacheOwner::Schema(SchemaId(1)));
        assert!(cache.get(&SampleKey::schema(SchemaId(1), 0.0)).is_none());
        assert!(cache.get(&SampleKey::schema(SchemaId(2), 0.0)).is_some());
    }

    #[test]
    fn test_double_buffered_publish() {
        let cache = SampleCache::new();
        let key = SampleKey::schema(SchemaId(7), 0.0);

        cache.put(key, sample(1.0), true);
        assert_eq!(unwrap_float(cache.get(&key).unwrap()), 1.0);

        // Re-publish stages in the other slot, then swaps.
        cache.put(key, sample(2.0), true);
        assert_eq!(unwrap_float(cache.get(&key).unwrap()), 2.0);
    }
}
