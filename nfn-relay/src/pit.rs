use std::collections::BTreeMap;
use std::fmt;

use log::debug;
use nfn_core::{Content, Interest};

use crate::computation::ConfigId;
use crate::face::FaceId;
use crate::matcher;

/// Identifier of a PIT entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PitId(pub u64);

impl fmt::Display for PitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pit#{}", self.0)
    }
}

/// Party waiting for an Interest to be satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Requester {
    /// A downstream face
    Face(FaceId),
    /// A suspended computation waiting on external data
    Computation(ConfigId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequester {
    pub requester: Requester,
    /// Relay tick the request arrived
    pub arrived_at: u64,
}

/// Pending Interest Table entry
#[derive(Debug, Clone)]
pub struct PitEntry {
    pub id: PitId,
    /// The Interest as forwarded upstream, selectors included
    pub interest: Interest,
    /// Nonces of every Interest folded into this entry, the forwarded one
    /// first
    pub nonces: Vec<u32>,
    /// Retransmissions performed so far
    pub retries: u32,
    /// Relay tick of creation or the last aggregation
    pub last_used: u64,
    /// Distinct parties awaiting the data, in arrival order
    pub requesters: Vec<PendingRequester>,
}

impl PitEntry {
    pub fn faces(&self) -> impl Iterator<Item = FaceId> + '_ {
        self.requesters.iter().filter_map(|p| match p.requester {
            Requester::Face(face) => Some(face),
            Requester::Computation(_) => None,
        })
    }

    pub fn computations(&self) -> impl Iterator<Item = ConfigId> + '_ {
        self.requesters.iter().filter_map(|p| match p.requester {
            Requester::Computation(id) => Some(id),
            Requester::Face(_) => None,
        })
    }

    pub fn has_requester(&self, requester: Requester) -> bool {
        self.requesters.iter().any(|p| p.requester == requester)
    }
}

/// Table of in-flight Interests, one entry per distinct name and selectors
#[derive(Debug, Default)]
pub struct PendingInterestTable {
    entries: BTreeMap<PitId, PitEntry>,
    next_id: u64,
}

impl PendingInterestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry holding an Interest with the same name and selectors
    pub fn find_exact(&self, interest: &Interest) -> Option<PitId> {
        self.entries
            .values()
            .find(|entry| matcher::same_interest(&entry.interest, interest))
            .map(|entry| entry.id)
    }

    pub fn insert(&mut self, interest: Interest, requester: Requester, now: u64) -> PitId {
        let id = PitId(self.next_id);
        self.next_id += 1;
        debug!("New {} for {}", id, interest.prefix);
        self.entries.insert(
            id,
            PitEntry {
                id,
                nonces: interest.nonce.into_iter().collect(),
                interest,
                retries: 0,
                last_used: now,
                requesters: vec![PendingRequester {
                    requester,
                    arrived_at: now,
                }],
            },
        );
        id
    }

    /// Add a requester to an entry, remembering the nonce it arrived with.
    /// Returns false if it was already pending or the entry is gone.
    pub fn add_requester(&mut self, id: PitId, requester: Requester, nonce: Option<u32>, now: u64) -> bool {
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        entry.last_used = now;
        if let Some(nonce) = nonce {
            if !entry.nonces.contains(&nonce) {
                entry.nonces.push(nonce);
            }
        }
        if entry.has_requester(requester) {
            return false;
        }
        entry.requesters.push(PendingRequester {
            requester,
            arrived_at: now,
        });
        true
    }

    /// Remove and return every entry the Content satisfies, oldest first
    pub fn take_matching(&mut self, content: &Content) -> Vec<PitEntry> {
        let ids: Vec<PitId> = self
            .entries
            .values()
            .filter(|entry| matcher::satisfies(&entry.interest, content, false))
            .map(|entry| entry.id)
            .collect();
        ids.into_iter().filter_map(|id| self.entries.remove(&id)).collect()
    }

    /// Drop a requester from every entry. Entries left without requesters
    /// are removed and returned.
    pub fn remove_requester(&mut self, requester: Requester) -> Vec<PitEntry> {
        let mut emptied = Vec::new();
        for entry in self.entries.values_mut() {
            entry.requesters.retain(|p| p.requester != requester);
            if entry.requesters.is_empty() {
                emptied.push(entry.id);
            }
        }
        emptied.into_iter().filter_map(|id| self.entries.remove(&id)).collect()
    }

    pub fn get(&self, id: PitId) -> Option<&PitEntry> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: PitId) -> Option<&mut PitEntry> {
        self.entries.get_mut(&id)
    }

    pub fn remove(&mut self, id: PitId) -> Option<PitEntry> {
        self.entries.remove(&id)
    }

    pub fn ids(&self) -> Vec<PitId> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PitEntry> {
        self.entries.values()
    }
}
