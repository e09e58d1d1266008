//! Thin re-exports of the hash-map/hash-set implementations used
//! throughout the crate, so the backing hasher can be swapped with a
//! feature flag without touching call sites.

#[cfg(feature = "collections_randomstate_twox_hash")]
mod twox {
    use std::hash::BuildHasherDefault;
    use twox_hash::XxHash64;

    pub type HashMap<K, V> = std::collections::HashMap<K, V, BuildHasherDefault<XxHash64>>;
    pub type HashSet<K> = std::collections::HashSet<K, BuildHasherDefault<XxHash64>>;
}

#[cfg(feature = "collections_randomstate_twox_hash")]
pub use twox::{HashMap, HashSet};

#[cfg(not(feature = "collections_randomstate_twox_hash"))]
pub use std::collections::{HashMap, HashSet};

pub use std::collections::VecDeque;

/// Builds a `HashMap` from a list of `key => value` pairs.
///
/// Used in tests and example binaries to stand up small peer/address
/// tables without the ceremony of repeated `.insert` calls.
#[macro_export]
macro_rules! map {
    ($($key:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut m = $crate::collections::HashMap::default();
        $(m.insert($key, $value);)*
        m
    }};
}
