use log::{debug, info};
use nfn_core::{Prefix, Suite};

use crate::face::FaceId;
use crate::matcher;

/// Static route: Interests under `prefix` of the given suite leave via `face`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FibEntry {
    pub prefix: Prefix,
    pub suite: Suite,
    pub face: FaceId,
}

/// Forwarding Information Base. Entries keep insertion order, which breaks
/// ties between equally long prefixes.
#[derive(Debug, Default)]
pub struct ForwardingTable {
    entries: Vec<FibEntry>,
}

impl ForwardingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route, replacing one with the same prefix and suite. Returns
    /// true when an entry was replaced.
    pub fn insert(&mut self, prefix: Prefix, face: FaceId, suite: Suite) -> bool {
        let mut prefix = prefix;
        prefix.suite = suite;
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.suite == suite && e.prefix.components == prefix.components)
        {
            info!("Replaced route {} ({}) -> {}", prefix, suite, face);
            entry.face = face;
            return true;
        }
        info!("Added route {} ({}) -> {}", prefix, suite, face);
        self.entries.push(FibEntry { prefix, suite, face });
        false
    }

    pub fn remove(&mut self, prefix: &Prefix, suite: Suite) -> Option<FibEntry> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.suite == suite && e.prefix.components == prefix.components)?;
        let entry = self.entries.remove(pos);
        info!("Removed route {} ({})", entry.prefix, entry.suite);
        Some(entry)
    }

    /// Longest registered prefix of `name` within the same suite
    pub fn lookup(&self, name: &Prefix) -> Option<&FibEntry> {
        let found = matcher::longest_match(name, self.entries.iter().map(|e| (&e.prefix, e)));
        match found {
            Some(entry) => debug!("Route for {}: {} via {}", name, entry.prefix, entry.face),
            None => debug!("No route for {}", name),
        }
        found
    }

    /// Remove every route through `face`
    pub fn remove_face(&mut self, face: FaceId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.face != face);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FibEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> Prefix {
        Prefix::from_uri(uri).unwrap()
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut fib = ForwardingTable::new();
        fib.insert(name("/a"), FaceId(1), Suite::NdnTlv);
        fib.insert(name("/a/b"), FaceId(2), Suite::NdnTlv);

        assert_eq!(fib.lookup(&name("/a/b/c")).unwrap().face, FaceId(2));
        assert_eq!(fib.lookup(&name("/a/x")).unwrap().face, FaceId(1));
        assert!(fib.lookup(&name("/b")).is_none());
    }

    #[test]
    fn test_insert_replaces_same_prefix_and_suite() {
        let mut fib = ForwardingTable::new();
        assert!(!fib.insert(name("/a"), FaceId(1), Suite::NdnTlv));
        assert!(fib.insert(name("/a"), FaceId(3), Suite::NdnTlv));
        assert!(!fib.insert(name("/a"), FaceId(4), Suite::Ccnb));
        assert_eq!(fib.len(), 2);
        assert_eq!(fib.lookup(&name("/a/z")).unwrap().face, FaceId(3));
    }

    #[test]
    fn test_routes_are_per_suite() {
        let mut fib = ForwardingTable::new();
        fib.insert(name("/a"), FaceId(1), Suite::Ccnb);
        assert!(fib.lookup(&name("/a/b")).is_none());
        let ccnb = Prefix::from_uri_with_suite("/a/b", Suite::Ccnb).unwrap();
        assert_eq!(fib.lookup(&ccnb).unwrap().face, FaceId(1));
    }

    #[test]
    fn test_root_route_and_removal() {
        let mut fib = ForwardingTable::new();
        fib.insert(name("/"), FaceId(1), Suite::NdnTlv);
        fib.insert(name("/a"), FaceId(2), Suite::NdnTlv);
        assert_eq!(fib.lookup(&name("/z")).unwrap().face, FaceId(1));

        assert!(fib.remove(&name("/a"), Suite::NdnTlv).is_some());
        assert_eq!(fib.lookup(&name("/a")).unwrap().face, FaceId(1));
        assert_eq!(fib.remove_face(FaceId(1)), 1);
        assert!(fib.is_empty());
    }
}
