//! Hierarchical name comparison.
//!
//! Components compare byte for byte; there is no normalization. Names of
//! different suites never match each other.

use nfn_core::{Content, Interest, Prefix, Selectors};

/// How two names are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Same components and chunk, used to detect duplicate Interests
    Exact,
    /// First name is a prefix of the second, used to test Content against Interests
    Match,
    /// First name is a prefix of the second, scored by its length, used for FIB lookups
    Longest,
}

/// Compare `a` against `b`. Returns the number of components of `a` that
/// matched, or `None` when the names do not match under `mode`.
pub fn compare(a: &Prefix, b: &Prefix, mode: MatchMode) -> Option<usize> {
    if a.suite != b.suite {
        return None;
    }
    match mode {
        MatchMode::Exact => {
            (a.components == b.components && a.chunk == b.chunk).then_some(a.len())
        }
        MatchMode::Match => {
            let chunk_ok = a.chunk.is_none() || a.chunk == b.chunk;
            (chunk_ok && a.is_prefix_of(b)).then_some(a.len())
        }
        MatchMode::Longest => a.is_prefix_of(b).then_some(a.len()),
    }
}

/// Two Interests are duplicates when names and selectors are identical
pub fn same_interest(a: &Interest, b: &Interest) -> bool {
    compare(&a.prefix, &b.prefix, MatchMode::Exact).is_some() && a.selectors == b.selectors
}

/// Whether `content` satisfies `interest`, given the cached stale flag
pub fn satisfies(interest: &Interest, content: &Content, stale: bool) -> bool {
    if compare(&interest.prefix, &content.name, MatchMode::Match).is_none() {
        return false;
    }
    selectors_accept(&interest.selectors, interest.prefix.len(), content, stale)
}

fn selectors_accept(selectors: &Selectors, prefix_len: usize, content: &Content, stale: bool) -> bool {
    let suffix = (content.name.len() - prefix_len) as u32;
    if selectors.min_suffix().is_some_and(|min| suffix < min) {
        return false;
    }
    if selectors.max_suffix().is_some_and(|max| suffix > max) {
        return false;
    }
    if let Some(wanted) = selectors.publisher_filter() {
        if content.publisher() != Some(wanted) {
            return false;
        }
    }
    if let Some(next) = content.name.get(prefix_len) {
        if selectors.exclude().iter().any(|excluded| excluded.as_slice() == next) {
            return false;
        }
    }
    !(stale && selectors.must_be_fresh())
}

/// Pick the longest candidate prefix of `name`. Ties go to the candidate
/// seen first.
pub fn longest_match<'a, T, I>(name: &Prefix, candidates: I) -> Option<T>
where
    I: IntoIterator<Item = (&'a Prefix, T)>,
{
    let mut best: Option<(usize, T)> = None;
    for (prefix, value) in candidates {
        if let Some(len) = compare(prefix, name, MatchMode::Longest) {
            if best.as_ref().map_or(true, |(best_len, _)| len > *best_len) {
                best = Some((len, value));
            }
        }
    }
    best.map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfn_core::{ContentDetails, NdnTlvSelectors, Suite};

    fn name(uri: &str) -> Prefix {
        Prefix::from_uri(uri).unwrap()
    }

    fn ndn_selectors(f: impl FnOnce(&mut NdnTlvSelectors)) -> Selectors {
        let mut s = NdnTlvSelectors::default();
        f(&mut s);
        Selectors::NdnTlv(s)
    }

    #[test]
    fn test_exact() {
        assert_eq!(compare(&name("/a/b"), &name("/a/b"), MatchMode::Exact), Some(2));
        assert_eq!(compare(&name("/a/b"), &name("/a/b/c"), MatchMode::Exact), None);
        assert_eq!(
            compare(&name("/a").with_chunk(1), &name("/a").with_chunk(2), MatchMode::Exact),
            None
        );
        let ccnb = Prefix::from_uri_with_suite("/a/b", Suite::Ccnb).unwrap();
        assert_eq!(compare(&name("/a/b"), &ccnb, MatchMode::Exact), None);
    }

    #[test]
    fn test_same_interest_includes_selectors() {
        let plain = Interest::new(name("/a"));
        let fresh = Interest::new(name("/a")).with_selectors(ndn_selectors(|s| s.must_be_fresh = true));
        assert!(same_interest(&plain, &plain.clone().with_nonce(7)));
        assert!(!same_interest(&plain, &fresh));
    }

    #[test]
    fn test_suffix_bounds() {
        let content = Content::new(name("/a/b/c"), b"x".to_vec());
        let interest = Interest::new(name("/a"));
        assert!(satisfies(&interest, &content, false));

        let tight = interest.clone().with_selectors(ndn_selectors(|s| s.max_suffix_components = Some(1)));
        assert!(!satisfies(&tight, &content, false));

        let loose = interest.with_selectors(ndn_selectors(|s| s.min_suffix_components = Some(2)));
        assert!(satisfies(&loose, &content, false));

        assert!(!satisfies(&Interest::new(name("/a/x")), &content, false));
    }

    #[test]
    fn test_exclude_and_publisher() {
        let content = Content::new(name("/a/old"), b"x".to_vec())
            .with_details(ContentDetails::NdnTlv { publisher_locator: Some(vec![1]) });

        let excluding = Interest::new(name("/a"))
            .with_selectors(ndn_selectors(|s| s.exclude = vec![b"old".to_vec()]));
        assert!(!satisfies(&excluding, &content, false));

        let right_publisher = Interest::new(name("/a"))
            .with_selectors(ndn_selectors(|s| s.publisher_locator = Some(vec![1])));
        let wrong_publisher = Interest::new(name("/a"))
            .with_selectors(ndn_selectors(|s| s.publisher_locator = Some(vec![2])));
        assert!(satisfies(&right_publisher, &content, false));
        assert!(!satisfies(&wrong_publisher, &content, false));
    }

    #[test]
    fn test_must_be_fresh_rejects_stale() {
        let content = Content::new(name("/a"), b"x".to_vec());
        let fresh = Interest::new(name("/a")).with_selectors(ndn_selectors(|s| s.must_be_fresh = true));
        assert!(satisfies(&fresh, &content, false));
        assert!(!satisfies(&fresh, &content, true));
        assert!(satisfies(&Interest::new(name("/a")), &content, true));
    }

    #[test]
    fn test_longest_match_prefers_longer_then_first() {
        let a = name("/a");
        let ab = name("/a/b");
        let ab_again = name("/a/b");
        let table = vec![(&a, 1), (&ab, 2), (&ab_again, 3)];

        assert_eq!(longest_match(&name("/a/b/c"), table.clone()), Some(2));
        assert_eq!(longest_match(&name("/a/x"), table.clone()), Some(1));
        assert_eq!(longest_match(&name("/z"), table), None);
    }
}
