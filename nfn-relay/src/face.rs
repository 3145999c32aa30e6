use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::{debug, info};
use nfn_core::Packet;
use serde::{Deserialize, Serialize};

/// Identifier of a face, unique for the lifetime of a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceId(pub u32);

impl fmt::Display for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "face#{}", self.0)
    }
}

/// Address of the peer behind a face
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerAddr {
    Udp(SocketAddr),
    Unix(PathBuf),
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerAddr::Udp(addr) => write!(f, "udp:{}", addr),
            PeerAddr::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Per-face behaviour flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceFlags {
    /// Never removed by the aging sweeper
    #[serde(rename = "static")]
    pub is_static: bool,
    /// Interests may be forwarded back out of the face they arrived on
    pub reflect: bool,
    /// Set while a Content is being delivered, so the face gets it once
    #[serde(skip)]
    pub served: bool,
    /// Aggregated Interests arriving here are propagated again
    pub forward_all: bool,
}

/// Minimum-gap scheduler. Delays transmissions, never drops them.
#[derive(Debug, Clone)]
pub struct Pacer {
    interval: Duration,
    next_slot: Option<Instant>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: None,
        }
    }

    pub fn ready(&self, now: Instant) -> bool {
        self.next_slot.map_or(true, |slot| now >= slot)
    }

    /// Record a transmission at `now`
    pub fn mark_sent(&mut self, now: Instant) {
        if !self.interval.is_zero() {
            self.next_slot = Some(now + self.interval);
        }
    }

    /// Earliest instant the next packet may leave
    pub fn next_slot(&self) -> Option<Instant> {
        self.next_slot
    }
}

/// Endpoint state for one peer
#[derive(Debug)]
pub struct Face {
    pub id: FaceId,
    /// Index of the local interface the peer is reached through
    pub ifindex: usize,
    pub peer: PeerAddr,
    pub flags: FaceFlags,
    /// Relay tick of the last packet to or from this face
    pub last_used: u64,
    queue: VecDeque<Packet>,
    queue_capacity: usize,
    pacer: Pacer,
}

impl Face {
    /// Queue a packet for transmission. Returns false when the queue is full
    /// and the packet was dropped.
    pub fn enqueue(&mut self, packet: Packet) -> bool {
        if self.queue.len() >= self.queue_capacity {
            debug!("{} queue full, dropping {}", self.id, packet.name());
            return false;
        }
        self.queue.push_back(packet);
        true
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    fn pop_ready(&mut self, now: Instant) -> Option<Packet> {
        if self.queue.is_empty() || !self.pacer.ready(now) {
            return None;
        }
        let packet = self.queue.pop_front()?;
        self.pacer.mark_sent(now);
        Some(packet)
    }
}

/// A packet released by pacing, ready to hand to the transport
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub face: FaceId,
    pub ifindex: usize,
    pub peer: PeerAddr,
    pub packet: Packet,
}

/// All faces known to a relay
#[derive(Debug)]
pub struct FaceTable {
    faces: BTreeMap<FaceId, Face>,
    next_id: u32,
    queue_capacity: usize,
    interval: Duration,
}

impl FaceTable {
    pub fn new(queue_capacity: usize, interval: Duration) -> Self {
        Self {
            faces: BTreeMap::new(),
            next_id: 1,
            queue_capacity,
            interval,
        }
    }

    /// Find the face for a peer on an interface
    pub fn find(&self, ifindex: usize, peer: &PeerAddr) -> Option<FaceId> {
        self.faces
            .values()
            .find(|face| face.ifindex == ifindex && &face.peer == peer)
            .map(|face| face.id)
    }

    /// Find the face for a peer, creating it on first contact
    pub fn get_or_create(&mut self, ifindex: usize, peer: PeerAddr, now: u64) -> FaceId {
        if let Some(id) = self.find(ifindex, &peer) {
            return id;
        }
        self.create(ifindex, peer, FaceFlags::default(), now)
    }

    /// Create a face with explicit flags. An existing face for the same peer
    /// has its flags replaced instead.
    pub fn create(&mut self, ifindex: usize, peer: PeerAddr, flags: FaceFlags, now: u64) -> FaceId {
        if let Some(id) = self.find(ifindex, &peer) {
            if let Some(face) = self.faces.get_mut(&id) {
                face.flags = flags;
            }
            return id;
        }

        let id = FaceId(self.next_id);
        self.next_id += 1;
        info!("Created {} for {} on interface {}", id, peer, ifindex);
        self.faces.insert(
            id,
            Face {
                id,
                ifindex,
                peer,
                flags,
                last_used: now,
                queue: VecDeque::new(),
                queue_capacity: self.queue_capacity,
                pacer: Pacer::new(self.interval),
            },
        );
        id
    }

    pub fn get(&self, id: FaceId) -> Option<&Face> {
        self.faces.get(&id)
    }

    pub fn get_mut(&mut self, id: FaceId) -> Option<&mut Face> {
        self.faces.get_mut(&id)
    }

    pub fn contains(&self, id: FaceId) -> bool {
        self.faces.contains_key(&id)
    }

    pub fn remove(&mut self, id: FaceId) -> Option<Face> {
        let face = self.faces.remove(&id);
        if let Some(face) = &face {
            info!("Removed {} ({})", id, face.peer);
        }
        face
    }

    /// Non-static faces idle for more than `timeout` ticks
    pub fn idle(&self, now: u64, timeout: u64) -> Vec<FaceId> {
        self.faces
            .values()
            .filter(|face| !face.flags.is_static && now.saturating_sub(face.last_used) > timeout)
            .map(|face| face.id)
            .collect()
    }

    pub fn clear_served(&mut self) {
        for face in self.faces.values_mut() {
            face.flags.served = false;
        }
    }

    /// Release at most one packet per face whose pacer allows it
    pub fn pop_ready(&mut self, now: Instant) -> Vec<Outbound> {
        let mut ready = Vec::new();
        for face in self.faces.values_mut() {
            if let Some(packet) = face.pop_ready(now) {
                ready.push(Outbound {
                    face: face.id,
                    ifindex: face.ifindex,
                    peer: face.peer.clone(),
                    packet,
                });
            }
        }
        ready
    }

    /// Earliest instant a queued packet becomes sendable
    pub fn next_deadline(&self) -> Option<Instant> {
        self.faces
            .values()
            .filter(|face| !face.queue.is_empty())
            .filter_map(|face| face.pacer.next_slot())
            .min()
    }

    pub fn has_pending(&self) -> bool {
        self.faces.values().any(|face| !face.queue.is_empty())
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Face> {
        self.faces.values()
    }
}
