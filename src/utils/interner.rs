//! Key Interner
//!
//! Maps cache-key strings to compact integer ids. The interner lives on the
//! device and is created with it. Keys are derived from content, never from
//! GPU objects, so the interner outlives device loss and rebuilt caches see
//! the same ids.

use lasso::{Key, Rodeo, Spur};

/// String interner producing `u32` ids for cache keys.
///
/// Ids are dense and start at zero. Zero is a valid id, so pipeline hash
/// inputs offset them by one to keep `0` meaning "slot unused".
#[derive(Debug, Default)]
pub struct KeyInterner {
    rodeo: Rodeo<Spur>,
}

impl KeyInterner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rodeo: Rodeo::default(),
        }
    }

    /// Interns `key`, returning the existing id if it was seen before.
    #[inline]
    pub fn intern(&mut self, key: &str) -> u32 {
        self.rodeo.get_or_intern(key).into_usize() as u32
    }

    /// Looks up the id of an already interned key without allocating.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<u32> {
        self.rodeo.get(key).map(|spur| spur.into_usize() as u32)
    }

    /// Resolves an id back to its key string.
    #[must_use]
    pub fn resolve(&self, id: u32) -> Option<&str> {
        Spur::try_from_usize(id as usize).and_then(|spur| self.rodeo.try_resolve(&spur))
    }

    /// Number of distinct keys interned so far.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rodeo.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rodeo.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_string_same_id() {
        let mut keys = KeyInterner::new();
        let a = keys.intern("#0u:3");
        let b = keys.intern("#1t:2f2d");
        assert_ne!(a, b);
        assert_eq!(keys.intern("#0u:3"), a);
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn resolve_round_trips() {
        let mut keys = KeyInterner::new();
        let id = keys.intern("rt:bgra8unorm");
        assert_eq!(keys.resolve(id), Some("rt:bgra8unorm"));
        assert_eq!(keys.get("missing"), None);
    }
}
