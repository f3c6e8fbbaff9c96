//! Pipeline Key Hashing
//!
//! Pipeline keys are fixed-length arrays of 32-bit words. They are reduced
//! with FNV-1a to pick a bucket; a bucket may hold several entries, and a hit
//! requires the stored words to equal the query element-wise. Collisions
//! therefore cost a second entry, never a wrong pipeline.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

pub const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
pub const FNV_PRIME: u32 = 16_777_619;

/// FNV-1a over 32-bit words. Order-sensitive.
#[inline]
#[must_use]
pub fn fnv1a_words(words: &[u32]) -> u32 {
    words
        .iter()
        .fold(FNV_OFFSET_BASIS, |hash, &word| (hash ^ word).wrapping_mul(FNV_PRIME))
}

type Bucket<const N: usize, V> = SmallVec<[([u32; N], V); 1]>;

/// Hash map from word arrays to values with exact-match buckets.
#[derive(Debug)]
pub struct CollisionBuckets<const N: usize, V> {
    buckets: FxHashMap<u32, Bucket<N, V>>,
    len: usize,
}

impl<const N: usize, V> Default for CollisionBuckets<N, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize, V> CollisionBuckets<N, V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: FxHashMap::default(),
            len: 0,
        }
    }

    #[must_use]
    pub fn get(&self, words: &[u32; N]) -> Option<&V> {
        self.buckets
            .get(&fnv1a_words(words))?
            .iter()
            .find(|(stored, _)| stored == words)
            .map(|(_, value)| value)
    }

    /// Returns the value stored for `words`, calling `create` on a miss.
    pub fn get_or_insert_with(&mut self, words: &[u32; N], create: impl FnOnce() -> V) -> &V {
        let bucket = self.buckets.entry(fnv1a_words(words)).or_default();
        let index = match bucket.iter().position(|(stored, _)| stored == words) {
            Some(index) => index,
            None => {
                if !bucket.is_empty() {
                    log::debug!(
                        "Pipeline key hash collision: bucket {:#010x} now holds {} entries",
                        fnv1a_words(words),
                        bucket.len() + 1
                    );
                }
                bucket.push((*words, create()));
                self.len += 1;
                bucket.len() - 1
            }
        };
        &bucket[index].1
    }

    /// Number of stored entries across all buckets.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of distinct hash values.
    #[inline]
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.len = 0;
    }
}
