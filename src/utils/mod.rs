//! Utility Module
//!
//! - [`interner`]: Device-owned string interning for cache keys
//!
//! # String Interning
//!
//! Bind group format keys, vertex format rendering strings and render target
//! descriptions are interned into compact `u32` ids. Ids are unique per
//! distinct string, so pipeline cache inputs built from them never alias.
//!
//! ```rust,ignore
//! use bindery::utils::KeyInterner;
//!
//! let mut keys = KeyInterner::new();
//! let a = keys.intern("#0u:3");
//! let b = keys.intern("#0u:3");
//! assert_eq!(a, b);
//! ```

pub mod interner;

pub use interner::KeyInterner;
