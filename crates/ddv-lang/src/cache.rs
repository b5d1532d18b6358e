//! Checksum-gated store of compiled artifacts.
//!
//! Entries are keyed by `(name, model type)` and hold the checksum of the source
//! they were built from. A lookup with a different checksum evicts the entry and
//! rebuilds it. Each key has its own lock, held across check, build and insert, so
//! concurrent requests for one key build once while other keys proceed.

use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::debug;

/// MD5 digest of a source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum([u8; 16]);

impl Checksum {
    pub fn of(text: &str) -> Self {
        Self(md5::compute(text.as_bytes()).0)
    }

    /// Digest over several parts, each length-prefixed so part boundaries matter.
    pub fn of_parts<S: AsRef<str>>(parts: &[S]) -> Self {
        let mut bytes = Vec::new();
        for part in parts {
            let part = part.as_ref();
            bytes.extend_from_slice(&(part.len() as u64).to_le_bytes());
            bytes.extend_from_slice(part.as_bytes());
        }
        Self(md5::compute(&bytes).0)
    }
}

impl Display for Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|byte| write!(f, "{:02x}", byte))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    name: SmolStr,
    model_type: SmolStr,
}

#[derive(Debug)]
struct Entry<T> {
    checksum: Checksum,
    artifact: Arc<T>,
}

type Slot<T> = Arc<Mutex<Option<Entry<T>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: usize,
    pub builds: usize,
    pub evictions: usize,
}

#[derive(Debug)]
pub struct ArtifactCache<T> {
    slots: Mutex<FxHashMap<CacheKey, Slot<T>>>,
    hits: AtomicUsize,
    builds: AtomicUsize,
    evictions: AtomicUsize,
}

impl<T> Default for ArtifactCache<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(FxHashMap::default()),
            hits: AtomicUsize::new(0),
            builds: AtomicUsize::new(0),
            evictions: AtomicUsize::new(0),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> ArtifactCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the artifact cached for `(name, model_type)` when it was built from
    /// `checksum`, otherwise builds, stores and returns a fresh one. `name = None`
    /// always builds and stores nothing. A failed build leaves no entry behind.
    pub fn get_or_build<E>(
        &self,
        name: Option<&str>,
        model_type: &str,
        checksum: Checksum,
        build: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        let Some(name) = name else {
            self.builds.fetch_add(1, Ordering::Relaxed);
            return build().map(Arc::new);
        };

        let slot = self.slot(name, model_type);
        let mut entry = lock(&slot);

        match entry.as_ref() {
            Some(cached) if cached.checksum == checksum => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(name, model_type, %checksum, "Compiled artifact cache hit");
                return Ok(Arc::clone(&cached.artifact));
            }
            Some(_) => {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(name, model_type, %checksum, "Evicting stale compiled artifact");
                *entry = None;
            }
            None => {}
        }

        debug!(name, model_type, %checksum, "Building compiled artifact");
        self.builds.fetch_add(1, Ordering::Relaxed);
        let artifact = match build() {
            Ok(artifact) => Arc::new(artifact),
            Err(err) => {
                self.discard_if_vacant(name, model_type, &slot);
                drop(entry);
                return Err(err);
            }
        };
        *entry = Some(Entry {
            checksum,
            artifact: Arc::clone(&artifact),
        });

        Ok(artifact)
    }

    /// The cached artifact for the key regardless of checksum.
    pub fn get(&self, name: &str, model_type: &str) -> Option<Arc<T>> {
        let slot = lock(&self.slots).get(&key(name, model_type)).cloned()?;
        let entry = lock(&slot);
        entry.as_ref().map(|entry| Arc::clone(&entry.artifact))
    }

    pub fn checksum(&self, name: &str, model_type: &str) -> Option<Checksum> {
        let slot = lock(&self.slots).get(&key(name, model_type)).cloned()?;
        let entry = lock(&slot);
        entry.as_ref().map(|entry| entry.checksum)
    }

    pub fn evict(&self, name: &str, model_type: &str) -> bool {
        let Some(slot) = lock(&self.slots).remove(&key(name, model_type)) else {
            return false;
        };

        let evicted = lock(&slot).take().is_some();
        if evicted {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        evicted
    }

    pub fn clear(&self) {
        lock(&self.slots).clear();
    }

    /// Number of completed entries.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot<T>> = lock(&self.slots).values().cloned().collect();
        slots.iter().filter(|slot| lock(slot).is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            builds: self.builds.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn slot(&self, name: &str, model_type: &str) -> Slot<T> {
        let mut slots = lock(&self.slots);
        Arc::clone(slots.entry(key(name, model_type)).or_default())
    }

    /// Drops the map's handle on an empty slot nobody else is waiting on.
    /// Called with the slot's entry lock held.
    fn discard_if_vacant(&self, name: &str, model_type: &str, slot: &Slot<T>) {
        let mut slots = lock(&self.slots);
        let key = key(name, model_type);
        let vacant = slots
            .get(&key)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && Arc::strong_count(slot) == 2);
        if vacant {
            slots.remove(&key);
        }
    }
}

fn key(name: &str, model_type: &str) -> CacheKey {
    CacheKey {
        name: name.into(),
        model_type: model_type.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_checksum_display() {
        assert_eq!(Checksum::of("").to_string(), "d41d8cd98f00b204e9800998ecf8427e");
        assert_ne!(Checksum::of_parts(&["ab", "c"]), Checksum::of_parts(&["a", "bc"]));
    }

    #[test]
    fn test_hit_returns_same_artifact() {
        let cache = ArtifactCache::new();
        let checksum = Checksum::of("x");

        let first = cache.get_or_build::<()>(Some("page"), "Person", checksum, || Ok(1)).unwrap();
        let second = cache.get_or_build::<()>(Some("page"), "Person", checksum, || Ok(2)).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats(), CacheStats { hits: 1, builds: 1, evictions: 0 });
    }

    #[test]
    fn test_checksum_change_rebuilds() {
        let cache = ArtifactCache::new();
        let first = cache
            .get_or_build::<()>(Some("page"), "Person", Checksum::of("a"), || Ok(1))
            .unwrap();
        let second = cache
            .get_or_build::<()>(Some("page"), "Person", Checksum::of("b"), || Ok(2))
            .unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(*second, 2);
        assert_eq!(cache.checksum("page", "Person"), Some(Checksum::of("b")));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_keys_include_model_type() {
        let cache = ArtifactCache::new();
        let checksum = Checksum::of("a");
        cache.get_or_build::<()>(Some("page"), "Person", checksum, || Ok(1)).unwrap();
        cache.get_or_build::<()>(Some("page"), "Company", checksum, || Ok(2)).unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("page", "Company").as_deref(), Some(&2));
    }

    #[test]
    fn test_unnamed_is_never_cached() {
        let cache = ArtifactCache::new();
        let checksum = Checksum::of("a");
        let first = cache.get_or_build::<()>(None, "Person", checksum, || Ok(1)).unwrap();
        let second = cache.get_or_build::<()>(None, "Person", checksum, || Ok(1)).unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_failed_build_leaves_no_entry() {
        let cache: ArtifactCache<i32> = ArtifactCache::new();
        let result = cache.get_or_build(Some("page"), "Person", Checksum::of("a"), || Err("boom"));

        assert_eq!(result, Err("boom"));
        assert!(cache.get("page", "Person").is_none());
        assert!(cache.is_empty());
        assert!(lock(&cache.slots).is_empty());
    }

    #[test]
    fn test_failed_rebuild_drops_stale_slot() {
        let cache = ArtifactCache::new();
        cache
            .get_or_build(Some("page"), "Person", Checksum::of("a"), || Ok::<_, ()>(1))
            .unwrap();
        assert!(
            cache
                .get_or_build(Some("page"), "Person", Checksum::of("b"), || Err(()))
                .is_err()
        );

        assert!(lock(&cache.slots).is_empty());
        assert_eq!(cache.stats().evictions, 1);

        let rebuilt = cache
            .get_or_build(Some("page"), "Person", Checksum::of("b"), || Ok::<_, ()>(2))
            .unwrap();
        assert_eq!(*rebuilt, 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evict_and_clear() {
        let cache = ArtifactCache::new();
        cache
            .get_or_build::<()>(Some("a"), "T", Checksum::of("a"), || Ok(1))
            .unwrap();
        cache
            .get_or_build::<()>(Some("b"), "T", Checksum::of("b"), || Ok(2))
            .unwrap();

        assert!(cache.evict("a", "T"));
        assert!(!cache.evict("a", "T"));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_requests_build_once() {
        let cache = Arc::new(ArtifactCache::new());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache
                        .get_or_build::<()>(Some("page"), "Person", Checksum::of("x"), || {
                            thread::sleep(std::time::Duration::from_millis(10));
                            Ok(42)
                        })
                        .unwrap()
                })
            })
            .collect();

        let artifacts: Vec<Arc<i32>> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();
        assert!(artifacts.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
        assert_eq!(cache.stats().builds, 1);
        assert_eq!(cache.stats().hits, 7);
    }
}
