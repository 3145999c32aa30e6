use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use log::debug;
use nfn_core::{Content, Interest, Prefix, Suite};

use crate::error::RelayError;
use crate::matcher;

/// Cache flags of a stored Content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentFlags {
    /// Pinned: never evicted, aged or marked stale
    pub is_static: bool,
    /// Soft-deleted; still served unless the Interest asks for fresh data
    pub stale: bool,
}

/// Content Store entry
#[derive(Debug, Clone)]
pub struct CsEntry {
    pub content: Content,
    pub flags: ContentFlags,
    /// Number of times this entry satisfied an Interest
    pub served_count: u64,
    /// Relay tick the entry was stored
    pub stored_at: u64,
    /// Relay tick of the last insert or hit
    pub last_used: u64,
}

/// Result of [`ContentStore::put`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    /// A different payload under the same name was replaced
    Replaced,
    /// The same payload is already cached
    Duplicate,
    /// Caching is disabled
    Transient,
}

type CsKey = (Suite, Vec<Vec<u8>>, Option<u32>);

fn key_of(name: &Prefix) -> CsKey {
    (name.suite, name.components.clone(), name.chunk)
}

/// Capacity-bounded cache of named data.
///
/// Entries are kept in insertion order; lookups scan newest first so that
/// fresh and computed results win over older matches.
#[derive(Debug)]
pub struct ContentStore {
    entries: BTreeMap<u64, CsEntry>,
    index: HashMap<CsKey, u64>,
    next_seq: u64,
    capacity: Option<usize>,
}

impl ContentStore {
    /// Create a store. `None` is unbounded, `Some(0)` caches nothing.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: BTreeMap::new(),
            index: HashMap::new(),
            next_seq: 0,
            capacity,
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Insert a Content, evicting the least recently used non-static entry
    /// when full
    pub fn put(&mut self, content: Content, is_static: bool, now: u64) -> Result<PutOutcome, RelayError> {
        if self.capacity == Some(0) {
            return Ok(PutOutcome::Transient);
        }

        let key = key_of(&content.name);
        if let Some(&seq) = self.index.get(&key) {
            let pinned = match self.entries.get(&seq) {
                Some(existing) if existing.content.payload == content.payload => {
                    debug!("Content {} already cached", content.name);
                    return Ok(PutOutcome::Duplicate);
                }
                Some(existing) => existing.flags.is_static,
                None => false,
            };
            self.remove_seq(seq);
            self.insert(key, content, is_static || pinned, now);
            return Ok(PutOutcome::Replaced);
        }

        if self.capacity.is_some_and(|cap| self.entries.len() >= cap) {
            self.evict_one()?;
        }
        self.insert(key, content, is_static, now);
        Ok(PutOutcome::Inserted)
    }

    fn insert(&mut self, key: CsKey, content: Content, is_static: bool, now: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        debug!("Caching {} (static: {}, entries: {})", content.name, is_static, self.entries.len() + 1);
        self.entries.insert(
            seq,
            CsEntry {
                content,
                flags: ContentFlags {
                    is_static,
                    stale: false,
                },
                served_count: 0,
                stored_at: now,
                last_used: now,
            },
        );
        self.index.insert(key, seq);
    }

    fn remove_seq(&mut self, seq: u64) -> Option<CsEntry> {
        let entry = self.entries.remove(&seq)?;
        self.index.remove(&key_of(&entry.content.name));
        Some(entry)
    }

    fn evict_one(&mut self) -> Result<Prefix, RelayError> {
        let victim = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.flags.is_static)
            .min_by_key(|(seq, entry)| (entry.last_used, **seq))
            .map(|(seq, _)| *seq)
            .ok_or(RelayError::ResourceExhausted)?;
        let entry = self.remove_seq(victim).ok_or(RelayError::ResourceExhausted)?;
        debug!("Evicted {} from content store", entry.content.name);
        Ok(entry.content.name)
    }

    /// Newest entry satisfying the Interest. A hit refreshes the entry.
    pub fn lookup(&mut self, interest: &Interest, now: u64) -> Option<Content> {
        let entry = self
            .entries
            .values_mut()
            .rev()
            .find(|entry| matcher::satisfies(interest, &entry.content, entry.flags.stale))?;
        entry.served_count += 1;
        entry.last_used = now;
        Some(entry.content.clone())
    }

    /// Entry stored under exactly this name
    pub fn get(&self, name: &Prefix) -> Option<&CsEntry> {
        let seq = self.index.get(&key_of(name))?;
        self.entries.get(seq)
    }

    pub fn contains(&self, name: &Prefix) -> bool {
        self.index.contains_key(&key_of(name))
    }

    /// Flag an entry stale without removing it. Static entries are exempt.
    pub fn mark_stale(&mut self, name: &Prefix) -> bool {
        let Some(seq) = self.index.get(&key_of(name)) else {
            return false;
        };
        match self.entries.get_mut(seq) {
            Some(entry) if !entry.flags.is_static => {
                entry.flags.stale = true;
                true
            }
            _ => false,
        }
    }

    /// Mark stale every non-static entry whose freshness period has run
    /// out. `tick` is the wall time of one relay tick.
    pub fn mark_expired_stale(&mut self, now: u64, tick: Duration) -> Vec<Prefix> {
        let tick_ms = tick.as_millis().max(1);
        let mut marked = Vec::new();
        for entry in self.entries.values_mut() {
            if entry.flags.is_static || entry.flags.stale {
                continue;
            }
            let Some(freshness) = entry.content.freshness else {
                continue;
            };
            let fresh_for = u64::try_from(freshness.as_millis().div_ceil(tick_ms)).unwrap_or(u64::MAX);
            if now.saturating_sub(entry.stored_at) >= fresh_for {
                entry.flags.stale = true;
                marked.push(entry.content.name.clone());
            }
        }
        marked
    }

    /// Drop every non-static entry
    pub fn flush(&mut self) -> usize {
        let victims: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.flags.is_static)
            .map(|(seq, _)| *seq)
            .collect();
        for seq in &victims {
            self.remove_seq(*seq);
        }
        victims.len()
    }

    /// Change the bound, evicting down to it. Returns the number evicted;
    /// static entries may leave the store above the new bound.
    pub fn set_capacity(&mut self, capacity: Option<usize>) -> usize {
        self.capacity = capacity;
        let Some(cap) = capacity else {
            return 0;
        };
        let mut evicted = 0;
        while self.entries.len() > cap && self.evict_one().is_ok() {
            evicted += 1;
        }
        evicted
    }

    /// Remove non-static entries idle for more than `timeout` ticks
    pub fn expire_idle(&mut self, now: u64, timeout: u64) -> Vec<Prefix> {
        let idle: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.flags.is_static && now.saturating_sub(entry.last_used) > timeout)
            .map(|(seq, _)| *seq)
            .collect();
        idle.into_iter()
            .filter_map(|seq| self.remove_seq(seq))
            .map(|entry| entry.content.name)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries from newest to oldest
    pub fn iter(&self) -> impl Iterator<Item = &CsEntry> {
        self.entries.values().rev()
    }
}
