//! Collection constructors matching the crate's preferred hasher.

use rustc_hash::FxHashMap;
use serde_json::Value;

/// An empty extra-channel map using the crate's `FxHashMap` convention.
#[must_use]
pub fn new_extra_map() -> FxHashMap<String, Value> {
    FxHashMap::default()
}
