use core::fmt;

/// Separates a root name from a shard index in a shard counter's name.
///
/// Root names may not contain it, so the first occurrence in any stored name
/// marks the shard suffix.
pub const SHARD_SEPARATOR: &str = "__";

/// The name of a counter within a store.
///
/// A key is either a *root* key (the caller-supplied name) or a *shard* key
/// (`{root}__{index}`). Only the name is stored; the parent of a shard is
/// derived by stripping the suffix, see [`CounterKey::parent`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CounterKey {
    name: String,
}

impl CounterKey {
    /// Creates a root key.
    ///
    /// Returns `None` if `name` is empty or contains [`SHARD_SEPARATOR`].
    ///
    /// # Example
    /// ```
    /// use shardseq::CounterKey;
    ///
    /// assert!(CounterKey::try_root("orders").is_some());
    /// assert!(CounterKey::try_root("orders__1").is_none());
    /// ```
    pub fn try_root(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        if name.is_empty() || name.contains(SHARD_SEPARATOR) {
            return None;
        }
        Some(Self { name })
    }

    /// Returns the key of shard `index` under this key's root.
    pub fn shard(&self, index: u64) -> Self {
        Self {
            name: format!("{}{SHARD_SEPARATOR}{index}", self.root_name()),
        }
    }

    /// Returns `true` for root keys.
    pub fn is_root(&self) -> bool {
        !self.name.contains(SHARD_SEPARATOR)
    }

    /// The root key a shard refills from, or `None` for a root key.
    pub fn parent(&self) -> Option<Self> {
        self.name.split_once(SHARD_SEPARATOR).map(|(root, _)| Self {
            name: root.to_owned(),
        })
    }

    /// The name of the root this key belongs to.
    pub fn root_name(&self) -> &str {
        self.name
            .split_once(SHARD_SEPARATOR)
            .map_or(self.name.as_str(), |(root, _)| root)
    }

    /// The shard index, or `None` for root keys and unparseable suffixes.
    pub fn shard_index(&self) -> Option<u64> {
        self.name
            .split_once(SHARD_SEPARATOR)
            .and_then(|(_, index)| index.parse().ok())
    }

    /// The half-open lexicographic range `[start, end)` containing every
    /// shard-shaped name under this key's root.
    ///
    /// The end bound replaces the trailing `_` of the separator with the next
    /// character, so the range covers exactly the names starting with
    /// `{root}__`.
    pub fn shard_range(&self) -> (String, String) {
        let root = self.root_name();
        let start = format!("{root}{SHARD_SEPARATOR}");
        let end = format!("{root}_{}", char::from(b'_' + 1));
        (start, end)
    }

    /// The key as stored.
    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl AsRef<str> for CounterKey {
    fn as_ref(&self) -> &str {
        &self.name
    }
}
