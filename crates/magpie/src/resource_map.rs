//
// resource_map.rs
//
// URI-keyed concurrent map with a single normalization rule
//

use dashmap::DashMap;
use tower_lsp::lsp_types::Url;

/// Canonical string form of a resource URI.
///
/// Every keyed structure in the workspace goes through this one function, so
/// two spellings of the same resource can never occupy separate entries.
/// `Url` parsing already lowercases the scheme and host and normalizes
/// percent-encoding; its serialized form is the canonical key.
pub fn normalize_uri_key(uri: &Url) -> String {
    uri.as_str().to_string()
}

/// Concurrent map keyed by normalized resource identity.
#[derive(Debug)]
pub struct ResourceMap<V> {
    inner: DashMap<String, V>,
}

// Not derived: the value type needs no Default of its own.
impl<V> Default for ResourceMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ResourceMap<V> {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    pub fn insert(&self, uri: &Url, value: V) {
        self.inner.insert(normalize_uri_key(uri), value);
    }

    pub fn remove(&self, uri: &Url) -> Option<V> {
        self.inner.remove(&normalize_uri_key(uri)).map(|(_, v)| v)
    }

    pub fn contains(&self, uri: &Url) -> bool {
        self.inner.contains_key(&normalize_uri_key(uri))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }
}

impl<V: Clone> ResourceMap<V> {
    pub fn get(&self, uri: &Url) -> Option<V> {
        self.inner.get(&normalize_uri_key(uri)).map(|v| v.clone())
    }

    pub fn values(&self) -> Vec<V> {
        self.inner.iter().map(|entry| entry.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equivalent_spellings_share_one_entry() {
        let map = ResourceMap::new();
        // Percent-encoding and host case are normalized by Url parsing.
        let a = Url::parse("file:///ws/caf%C3%A9.md").unwrap();
        let b = Url::parse("file:///ws/café.md").unwrap();

        map.insert(&a, 1);
        map.insert(&b, 2);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&a), Some(2));
    }

    #[test]
    fn test_insert_get_remove() {
        let map = ResourceMap::new();
        let uri = Url::parse("file:///ws/a.md").unwrap();

        assert!(!map.contains(&uri));
        map.insert(&uri, "doc");
        assert!(map.contains(&uri));
        assert_eq!(map.get(&uri), Some("doc"));
        assert_eq!(map.remove(&uri), Some("doc"));
        assert!(map.is_empty());
    }

    #[test]
    fn test_values_returns_all_entries() {
        let map = ResourceMap::new();
        map.insert(&Url::parse("file:///ws/a.md").unwrap(), 1);
        map.insert(&Url::parse("file:///ws/b.md").unwrap(), 2);

        let mut values = map.values();
        values.sort();
        assert_eq!(values, vec![1, 2]);
    }
}
