use std::time::Instant;

use log::{debug, info, warn};
use nfn_core::{Content, Interest, Packet, Prefix, Suite};
use serde::Serialize;

use crate::computation::{ComputationEngine, ConfigId, Progress};
use crate::config::RelayConfig;
use crate::content_store::{ContentStore, PutOutcome};
use crate::error::RelayError;
use crate::face::{FaceFlags, FaceId, FaceTable, Outbound, PeerAddr};
use crate::fib::ForwardingTable;
use crate::nonce::NonceTable;
use crate::pit::{PendingInterestTable, PitEntry, PitId, Requester};

/// What happened to an inbound Interest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterestOutcome {
    /// Answered from the content store
    CacheHit,
    /// Joined an existing PIT entry
    Aggregated,
    /// Sent upstream through this face
    Forwarded(FaceId),
    /// Reduced locally and answered
    Computed,
    /// Reduction is waiting for external data
    Suspended(ConfigId),
}

/// What happened to an inbound Content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentOutcome {
    /// Nothing was waiting for it; dropped
    Unsolicited,
    Delivered { faces: usize, computations: usize },
}

/// Relay counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub interests_received: u64,
    pub interests_forwarded: u64,
    pub interests_aggregated: u64,
    pub interests_dropped: u64,
    pub content_received: u64,
    pub content_cached: u64,
    pub content_served: u64,
    pub content_unsolicited: u64,
    pub cs_hits: u64,
    pub computations_started: u64,
    pub computations_completed: u64,
    pub computations_failed: u64,
    pub sub_interests: u64,
}

/// Forwarding context owning every table of one relay.
///
/// All mutation happens through `&mut self` from a single event loop, one
/// inbound event or timer tick at a time.
#[derive(Debug)]
pub struct Relay {
    pub(crate) config: RelayConfig,
    /// Sweeper ticks since start
    pub(crate) clock: u64,
    pub(crate) faces: FaceTable,
    pub(crate) cs: ContentStore,
    pub(crate) pit: PendingInterestTable,
    pub(crate) fib: ForwardingTable,
    pub(crate) nonces: NonceTable,
    pub(crate) computations: ComputationEngine,
    pub(crate) stats: RelayStats,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        config.validate()?;
        info!(
            "Relay ready: suite {}, cache {}",
            config.suite,
            config
                .max_cache_entries
                .map_or_else(|| "unlimited".to_string(), |n| format!("{} entries", n))
        );
        Ok(Self {
            faces: FaceTable::new(config.face_queue_capacity, config.inter_interest_interval()),
            cs: ContentStore::new(config.max_cache_entries),
            pit: PendingInterestTable::new(),
            fib: ForwardingTable::new(),
            nonces: NonceTable::new(config.max_nonces),
            computations: ComputationEngine::new(config.step_limit),
            stats: RelayStats::default(),
            clock: 0,
            config,
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Current sweeper tick
    pub fn now(&self) -> u64 {
        self.clock
    }

    pub fn faces(&self) -> &FaceTable {
        &self.faces
    }

    pub fn content_store(&self) -> &ContentStore {
        &self.cs
    }

    /// Pre-populate the content store. Static entries are never evicted.
    pub fn cache_content(&mut self, content: Content, is_static: bool) -> Result<PutOutcome, RelayError> {
        self.cs.put(content, is_static, self.clock)
    }

    pub fn pit(&self) -> &PendingInterestTable {
        &self.pit
    }

    pub fn fib(&self) -> &ForwardingTable {
        &self.fib
    }

    pub fn nonces(&self) -> &NonceTable {
        &self.nonces
    }

    pub fn computations(&self) -> &ComputationEngine {
        &self.computations
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Face for a peer, created on first contact
    pub fn face_for_peer(&mut self, ifindex: usize, peer: PeerAddr) -> FaceId {
        self.faces.get_or_create(ifindex, peer, self.clock)
    }

    /// Configure a face that is never aged out
    pub fn add_static_face(&mut self, ifindex: usize, peer: PeerAddr, flags: FaceFlags) -> FaceId {
        let flags = FaceFlags {
            is_static: true,
            ..flags
        };
        self.faces.create(ifindex, peer, flags, self.clock)
    }

    /// Remove a face together with its routes and pending requests
    pub fn remove_face(&mut self, id: FaceId) -> Result<usize, RelayError> {
        self.faces.remove(id).ok_or(RelayError::UnknownFace(id))?;
        let routes = self.fib.remove_face(id);
        let emptied = self.pit.remove_requester(Requester::Face(id));
        debug!(
            "{} removed with {} routes and {} pending Interests",
            id,
            routes,
            emptied.len()
        );
        Ok(emptied.iter().map(|entry| self.forget(entry)).sum())
    }

    pub fn add_route(&mut self, prefix: Prefix, face: FaceId, suite: Suite) -> Result<bool, RelayError> {
        if !self.faces.contains(face) {
            return Err(RelayError::UnknownFace(face));
        }
        Ok(self.fib.insert(prefix, face, suite))
    }

    /// Release paced packets ready for transmission
    pub fn drain_ready(&mut self, now: Instant) -> Vec<Outbound> {
        self.faces.pop_ready(now)
    }

    fn touch(&mut self, id: FaceId) -> Result<(), RelayError> {
        let face = self.faces.get_mut(id).ok_or(RelayError::UnknownFace(id))?;
        face.last_used = self.clock;
        Ok(())
    }

    pub fn handle_interest(&mut self, from: FaceId, interest: Interest) -> Result<InterestOutcome, RelayError> {
        let mut interest = interest;
        let now = self.clock;
        self.touch(from)?;
        self.stats.interests_received += 1;

        match interest.nonce {
            Some(nonce) => {
                if !self.nonces.check_and_record(nonce, now) {
                    self.stats.interests_dropped += 1;
                    debug!("Dropping looped Interest {} (nonce {:#010x})", interest.prefix, nonce);
                    return Err(RelayError::DuplicateNonce(nonce));
                }
            }
            None => {
                let nonce = interest.ensure_nonce();
                self.nonces.check_and_record(nonce, now);
            }
        }

        if let Some(content) = self.cs.lookup(&interest, now) {
            self.stats.cs_hits += 1;
            debug!("Content store hit for {}", interest.prefix);
            if self.send(from, Packet::Content(content)) {
                self.stats.content_served += 1;
            }
            return Ok(InterestOutcome::CacheHit);
        }

        if let Some(id) = self.pit.find_exact(&interest) {
            self.pit.add_requester(id, Requester::Face(from), interest.nonce, now);
            self.stats.interests_aggregated += 1;
            let forward_all = self.faces.get(from).is_some_and(|f| f.flags.forward_all);
            if forward_all {
                if let Some(face) = self.propagate(id) {
                    return Ok(InterestOutcome::Forwarded(face));
                }
            }
            debug!("Aggregated Interest {} into {}", interest.prefix, id);
            return Ok(InterestOutcome::Aggregated);
        }

        if interest.prefix.is_expression() {
            self.pit.insert(interest.clone(), Requester::Face(from), now);
            return self.start_computation(interest);
        }

        let name = interest.prefix.to_string();
        let id = self.pit.insert(interest, Requester::Face(from), now);
        match self.propagate(id) {
            Some(face) => Ok(InterestOutcome::Forwarded(face)),
            None => {
                self.pit.remove(id);
                self.stats.interests_dropped += 1;
                debug!("Dropping Interest {}: no route", name);
                Err(RelayError::NoRoute(name))
            }
        }
    }

    pub fn handle_content(&mut self, from: FaceId, content: Content) -> Result<ContentOutcome, RelayError> {
        self.touch(from)?;
        self.stats.content_received += 1;

        let matched = self.pit.take_matching(&content);
        if matched.is_empty() {
            self.stats.content_unsolicited += 1;
            debug!("Dropping unsolicited content {}", content.name);
            return Ok(ContentOutcome::Unsolicited);
        }

        self.cache(&content, false);
        let (faces, waiting) = self.serve(&content, &matched);
        for id in &waiting {
            self.resume_computation(*id, &content.payload);
        }
        Ok(ContentOutcome::Delivered {
            faces,
            computations: waiting.len(),
        })
    }

    /// Send an entry's Interest along its route. Returns the face used.
    pub(crate) fn propagate(&mut self, id: PitId) -> Option<FaceId> {
        let entry = self.pit.get(id)?;
        let out = self.fib.lookup(&entry.interest.prefix)?.face;
        let reflect = self.faces.get(out).is_some_and(|f| f.flags.reflect);
        if !reflect && entry.faces().any(|face| face == out) {
            debug!("Not reflecting {} back to {}", entry.interest.prefix, out);
            return None;
        }
        let packet = Packet::Interest(entry.interest.clone());
        if self.send(out, packet) {
            self.stats.interests_forwarded += 1;
            Some(out)
        } else {
            None
        }
    }

    fn send(&mut self, face: FaceId, packet: Packet) -> bool {
        let now = self.clock;
        match self.faces.get_mut(face) {
            Some(f) => {
                f.last_used = now;
                f.enqueue(packet)
            }
            None => {
                warn!("Cannot send {} to missing {}", packet.name(), face);
                false
            }
        }
    }

    fn cache(&mut self, content: &Content, is_static: bool) {
        match self.cs.put(content.clone(), is_static, self.clock) {
            Ok(PutOutcome::Inserted) | Ok(PutOutcome::Replaced) => self.stats.content_cached += 1,
            Ok(PutOutcome::Duplicate) | Ok(PutOutcome::Transient) => {}
            Err(e) => warn!("Not caching {}: {}", content.name, e),
        }
    }

    /// Deliver Content to everyone pending on the given entries. Each face
    /// receives it once. Returns the number of faces served and the
    /// computations to resume.
    fn serve(&mut self, content: &Content, entries: &[PitEntry]) -> (usize, Vec<ConfigId>) {
        let now = self.clock;
        let mut served = 0;
        let mut waiting = Vec::new();
        for entry in entries {
            for pending in &entry.requesters {
                match pending.requester {
                    Requester::Face(id) => {
                        let Some(face) = self.faces.get_mut(id) else {
                            continue;
                        };
                        if face.flags.served {
                            continue;
                        }
                        face.flags.served = true;
                        face.last_used = now;
                        if face.enqueue(Packet::Content(content.clone())) {
                            served += 1;
                        }
                    }
                    Requester::Computation(id) => {
                        if !waiting.contains(&id) {
                            waiting.push(id);
                        }
                    }
                }
            }
        }
        self.faces.clear_served();
        self.stats.content_served += served as u64;
        (served, waiting)
    }

    /// Drop the state tied to a PIT entry that is going away. Returns the
    /// number of computations discarded.
    pub(crate) fn forget(&mut self, entry: &PitEntry) -> usize {
        for nonce in &entry.nonces {
            self.nonces.remove(*nonce);
        }
        entry
            .computations()
            .filter(|id| self.computations.discard(*id))
            .count()
    }

    fn start_computation(&mut self, interest: Interest) -> Result<InterestOutcome, RelayError> {
        self.stats.computations_started += 1;
        let result = self
            .computations
            .start(&interest)
            .map_err(RelayError::from)
            .and_then(|progress| self.advance(progress));
        if let Err(e) = &result {
            self.stats.computations_failed += 1;
            warn!("Computation for {} failed: {}", interest.prefix, e);
        }
        result
    }

    fn resume_computation(&mut self, id: ConfigId, payload: &[u8]) {
        let result = self
            .computations
            .resume(id, payload)
            .map_err(RelayError::from)
            .and_then(|progress| self.advance(progress));
        if let Err(e) = result {
            self.stats.computations_failed += 1;
            warn!("{} failed after resuming: {}", id, e);
        }
    }

    /// Carry a computation forward until it finishes or has to wait on the
    /// network
    fn advance(&mut self, progress: Progress) -> Result<InterestOutcome, RelayError> {
        let mut progress = progress;
        loop {
            let (id, name) = match progress {
                Progress::Done { origin, result, .. } => {
                    self.publish(origin, result);
                    return Ok(InterestOutcome::Computed);
                }
                Progress::Suspended { id, name } => (id, name),
            };

            let now = self.clock;
            let mut sub = Interest::new(name);
            if let Some(content) = self.cs.lookup(&sub, now) {
                self.stats.cs_hits += 1;
                progress = self.computations.resume(id, &content.payload)?;
                continue;
            }

            if let Some(pit_id) = self.pit.find_exact(&sub) {
                self.pit.add_requester(pit_id, Requester::Computation(id), None, now);
                return Ok(InterestOutcome::Suspended(id));
            }

            let nonce = sub.ensure_nonce();
            self.nonces.check_and_record(nonce, now);
            let uri = sub.prefix.to_string();
            let pit_id = self.pit.insert(sub, Requester::Computation(id), now);
            self.stats.sub_interests += 1;
            if self.propagate(pit_id).is_none() {
                if let Some(entry) = self.pit.remove(pit_id) {
                    self.forget(&entry);
                }
                return Err(RelayError::NoRoute(uri));
            }
            debug!("{} issued sub-Interest {}", id, uri);
            return Ok(InterestOutcome::Suspended(id));
        }
    }

    /// Cache a computed result permanently and answer everyone waiting for it
    fn publish(&mut self, origin: Interest, result: Vec<u8>) {
        let mut name = origin.prefix;
        name.nfn.computed = true;
        let content = Content::new(name, result);
        self.stats.computations_completed += 1;
        info!("Computed {} ({} bytes)", content.name, content.payload.len());

        self.cache(&content, true);
        let matched = self.pit.take_matching(&content);
        let (_, waiting) = self.serve(&content, &matched);
        for id in waiting {
            self.resume_computation(id, &content.payload);
        }
    }
}
