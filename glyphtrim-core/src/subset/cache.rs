//! Subsetting results keyed by program digest and requested codes

use super::SubsetResult;
use crate::error::FontError;
use crate::fonts::FontProgramDigest;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A successful subset plus the requested codes that mapped to no glyph
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSubset {
    pub result: SubsetResult,
    pub unresolved_codes: usize,
}

/// Result of subsetting one font program, success or failure
pub type CachedOutcome = std::result::Result<CachedSubset, FontError>;

/// A subset depends on both the program bytes and the codes requested from it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    digest: FontProgramDigest,
    codes: BTreeSet<u32>,
}

type Entries = HashMap<CacheKey, Arc<CachedOutcome>>;

/// Thread-safe cache of subsetting outcomes.
///
/// Entries are keyed by program digest and requested code set, so runs
/// painting different codes from the same program never share a subset.
/// The first outcome stored for a key wins; later inserts get the stored
/// value back. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct SubsetResultCache {
    entries: Arc<Mutex<Entries>>,
}

impl SubsetResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        // Entries are inserted whole, so a poisoned map is still consistent
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(digest: FontProgramDigest, codes: &BTreeSet<u32>) -> CacheKey {
        CacheKey {
            digest,
            codes: codes.clone(),
        }
    }

    pub fn get(&self, digest: FontProgramDigest, codes: &BTreeSet<u32>) -> Option<Arc<CachedOutcome>> {
        self.lock().get(&Self::key(digest, codes)).cloned()
    }

    /// Store an outcome unless one exists; returns the stored outcome
    pub fn insert(
        &self,
        digest: FontProgramDigest,
        codes: &BTreeSet<u32>,
        outcome: CachedOutcome,
    ) -> Arc<CachedOutcome> {
        self.lock()
            .entry(Self::key(digest, codes))
            .or_insert_with(|| Arc::new(outcome))
            .clone()
    }

    /// Cached outcome, or compute and store one.
    ///
    /// `compute` runs without the lock held; concurrent misses may compute
    /// twice and the first stored result is kept.
    pub fn get_or_insert_with(
        &self,
        digest: FontProgramDigest,
        codes: &BTreeSet<u32>,
        compute: impl FnOnce() -> CachedOutcome,
    ) -> Arc<CachedOutcome> {
        if let Some(hit) = self.get(digest, codes) {
            return hit;
        }
        let outcome = compute();
        self.insert(digest, codes, outcome)
    }

    pub fn contains(&self, digest: FontProgramDigest, codes: &BTreeSet<u32>) -> bool {
        self.lock().contains_key(&Self::key(digest, codes))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::GlyphRenumbering;
    use std::thread;

    fn result(byte: u8) -> CachedOutcome {
        Ok(CachedSubset {
            result: SubsetResult {
                data: vec![byte],
                gid_map: GlyphRenumbering::new(vec![0]),
            },
            unresolved_codes: 0,
        })
    }

    fn codes(values: &[u32]) -> BTreeSet<u32> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_first_writer_wins() {
        let cache = SubsetResultCache::new();
        let digest = FontProgramDigest::compute(b"program").unwrap();
        let ab = codes(&[65, 66]);

        let first = cache.insert(digest, &ab, result(1));
        let second = cache.insert(digest, &ab, result(2));

        assert_eq!(first, second);
        assert_eq!(cache.get(digest, &ab).unwrap().as_ref().as_ref().unwrap().result.data, vec![1]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_different_code_sets_are_separate_entries() {
        let cache = SubsetResultCache::new();
        let digest = FontProgramDigest::compute(b"program").unwrap();

        cache.insert(digest, &codes(&[65]), result(1));
        assert!(cache.get(digest, &codes(&[90])).is_none());
        assert!(!cache.contains(digest, &codes(&[65, 90])));

        let z = cache.get_or_insert_with(digest, &codes(&[90]), || result(2));
        assert_eq!(z.as_ref().as_ref().unwrap().result.data, vec![2]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_get_or_insert_with_computes_once() {
        let cache = SubsetResultCache::new();
        let digest = FontProgramDigest::compute(b"program").unwrap();
        let a = codes(&[65]);
        let mut calls = 0;

        cache.get_or_insert_with(digest, &a, || {
            calls += 1;
            result(1)
        });
        cache.get_or_insert_with(digest, &a, || {
            calls += 1;
            result(2)
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_failures_are_cached() {
        let cache = SubsetResultCache::new();
        let digest = FontProgramDigest::compute(b"bad").unwrap();
        let a = codes(&[65]);
        cache.insert(digest, &a, Err(FontError::MalformedFontProgram("bad loca".to_string())));
        assert!(cache.get(digest, &a).unwrap().is_err());

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_inserts_share_one_entry() {
        let cache = SubsetResultCache::new();
        let digest = FontProgramDigest::compute(b"shared").unwrap();

        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let cache = cache.clone();
                thread::spawn(move || cache.get_or_insert_with(digest, &codes(&[65, 66]), || result(i)))
            })
            .collect();
        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(cache.len(), 1);
        assert!(outcomes.windows(2).all(|w| w[0] == w[1]));
    }
}
