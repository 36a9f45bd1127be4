//! Fast hash map and hash set aliases used for in-memory grouping.
//!
//! Grouping files by series UID and fingerprint, and records by root
//! acquisition, happens on keys that never come from an untrusted network
//! peer, so the Fx hasher from `rustc-hash` is used throughout the workspace.
//!
//! These maps are never used where iteration order is observable in output;
//! ordered results go through `BTreeMap` or an explicit sort.
//!
//! # Examples
//!
//! ```
//! use si_core::{FxHashMap, fx_hash_map, fx_hash_set};
//!
//! let mut by_uid: FxHashMap<&str, usize> = fx_hash_map();
//! *by_uid.entry("1.2.3").or_default() += 1;
//! assert_eq!(by_uid["1.2.3"], 1);
//!
//! let seen: si_core::FxHashSet<u32> = fx_hash_set();
//! assert!(seen.is_empty());
//! ```

/// A [`HashMap`](std::collections::HashMap) using the Fx hash algorithm.
pub type FxHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

/// A [`HashSet`](std::collections::HashSet) using the Fx hash algorithm.
pub type FxHashSet<V> = rustc_hash::FxHashSet<V>;

/// Creates a new empty [`FxHashMap`].
#[inline]
#[must_use]
pub fn fx_hash_map<K, V>() -> FxHashMap<K, V> {
    FxHashMap::default()
}

/// Creates a new empty [`FxHashSet`].
#[inline]
#[must_use]
pub fn fx_hash_set<V>() -> FxHashSet<V> {
    FxHashSet::default()
}
