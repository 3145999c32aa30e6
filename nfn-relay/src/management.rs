//! Runtime control of a relay: faces, routes and the content store.

use log::info;
use nfn_core::{Prefix, Suite};
use serde::{Deserialize, Serialize};

use crate::engine::Relay;
use crate::error::RelayError;
use crate::face::{FaceFlags, FaceId, PeerAddr};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ManagementCommand {
    /// Create a static face for a peer
    AddFace {
        ifindex: usize,
        peer: PeerAddr,
        #[serde(default)]
        flags: FaceFlags,
    },
    RemoveFace {
        face: FaceId,
    },
    AddRoute {
        prefix: String,
        face: FaceId,
        #[serde(default)]
        suite: Suite,
    },
    RemoveRoute {
        prefix: String,
        #[serde(default)]
        suite: Suite,
    },
    /// Soft-delete a cached entry so Interests asking for fresh data skip it
    MarkStale {
        prefix: String,
        #[serde(default)]
        suite: Suite,
    },
    /// Drop every non-static cache entry
    FlushCache,
    /// `None` removes the bound, `Some(0)` disables caching
    SetCacheCapacity {
        entries: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum ManagementReply {
    FaceAdded { face: FaceId },
    FaceRemoved { face: FaceId, computations_discarded: usize },
    RouteAdded { replaced: bool },
    RouteRemoved { existed: bool },
    MarkedStale { marked: bool },
    CacheFlushed { removed: usize },
    CapacitySet { evicted: usize },
}

impl Relay {
    pub fn apply(&mut self, command: ManagementCommand) -> Result<ManagementReply, RelayError> {
        match command {
            ManagementCommand::AddFace { ifindex, peer, flags } => {
                let face = self.add_static_face(ifindex, peer, flags);
                Ok(ManagementReply::FaceAdded { face })
            }
            ManagementCommand::RemoveFace { face } => {
                let computations_discarded = self.remove_face(face)?;
                Ok(ManagementReply::FaceRemoved {
                    face,
                    computations_discarded,
                })
            }
            ManagementCommand::AddRoute { prefix, face, suite } => {
                let prefix = Prefix::from_uri_with_suite(&prefix, suite)?;
                info!("Route {} -> {}", prefix, face);
                let replaced = self.add_route(prefix, face, suite)?;
                Ok(ManagementReply::RouteAdded { replaced })
            }
            ManagementCommand::RemoveRoute { prefix, suite } => {
                let prefix = Prefix::from_uri_with_suite(&prefix, suite)?;
                let existed = self.fib.remove(&prefix, suite).is_some();
                Ok(ManagementReply::RouteRemoved { existed })
            }
            ManagementCommand::MarkStale { prefix, suite } => {
                let prefix = Prefix::from_uri_with_suite(&prefix, suite)?;
                let marked = self.cs.mark_stale(&prefix);
                info!("Marked {} stale: {}", prefix, marked);
                Ok(ManagementReply::MarkedStale { marked })
            }
            ManagementCommand::FlushCache => {
                let removed = self.cs.flush();
                info!("Flushed {} cache entries", removed);
                Ok(ManagementReply::CacheFlushed { removed })
            }
            ManagementCommand::SetCacheCapacity { entries } => {
                let evicted = self.cs.set_capacity(entries);
                self.config.max_cache_entries = entries;
                Ok(ManagementReply::CapacitySet { evicted })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use nfn_core::{Content, Interest, NdnTlvSelectors, Selectors};

    fn relay() -> Relay {
        let _ = env_logger::builder().is_test(true).try_init();
        Relay::new(RelayConfig::default()).unwrap()
    }

    #[test]
    fn test_commands_from_json() {
        let mut relay = relay();
        let command: ManagementCommand = serde_json::from_str(
            r#"{"command": "add_face", "ifindex": 0, "peer": {"udp": "127.0.0.1:9695"}, "flags": {"static": false, "reflect": true}}"#,
        )
        .unwrap();
        let ManagementReply::FaceAdded { face } = relay.apply(command).unwrap() else {
            panic!("expected a face");
        };
        let added = relay.faces().get(face).unwrap();
        assert!(added.flags.is_static);
        assert!(added.flags.reflect);

        let command: ManagementCommand = serde_json::from_str(&format!(
            r#"{{"command": "add_route", "prefix": "/video", "face": {}}}"#,
            face.0
        ))
        .unwrap();
        assert_eq!(
            relay.apply(command).unwrap(),
            ManagementReply::RouteAdded { replaced: false }
        );
        assert_eq!(relay.fib().len(), 1);

        let reply = serde_json::to_value(relay.apply(ManagementCommand::FlushCache).unwrap()).unwrap();
        assert_eq!(reply["reply"], "cache_flushed");
        assert_eq!(reply["removed"], 0);
    }

    #[test]
    fn test_route_to_unknown_face() {
        let mut relay = relay();
        let result = relay.apply(ManagementCommand::AddRoute {
            prefix: "/a".to_string(),
            face: FaceId(9),
            suite: Suite::NdnTlv,
        });
        assert!(matches!(result, Err(RelayError::UnknownFace(FaceId(9)))));
    }

    #[test]
    fn test_remove_route_and_face() {
        let mut relay = relay();
        let ManagementReply::FaceAdded { face } = relay
            .apply(ManagementCommand::AddFace {
                ifindex: 0,
                peer: PeerAddr::Unix("/tmp/nfn.sock".into()),
                flags: FaceFlags::default(),
            })
            .unwrap()
        else {
            panic!("expected a face");
        };
        relay
            .apply(ManagementCommand::AddRoute {
                prefix: "/a".to_string(),
                face,
                suite: Suite::NdnTlv,
            })
            .unwrap();

        let remove = ManagementCommand::RemoveRoute {
            prefix: "/a".to_string(),
            suite: Suite::NdnTlv,
        };
        assert_eq!(
            relay.apply(remove.clone()).unwrap(),
            ManagementReply::RouteRemoved { existed: true }
        );
        assert_eq!(
            relay.apply(remove).unwrap(),
            ManagementReply::RouteRemoved { existed: false }
        );
        assert_eq!(
            relay.apply(ManagementCommand::RemoveFace { face }).unwrap(),
            ManagementReply::FaceRemoved {
                face,
                computations_discarded: 0
            }
        );
    }

    #[test]
    fn test_cache_flush_keeps_static_content() {
        let mut relay = relay();
        let name = Prefix::from_uri("/a").unwrap();
        relay.cache_content(Content::new(name.clone(), b"s".to_vec()), true).unwrap();
        relay
            .cache_content(Content::new(Prefix::from_uri("/b").unwrap(), b"d".to_vec()), false)
            .unwrap();

        assert_eq!(
            relay.apply(ManagementCommand::FlushCache).unwrap(),
            ManagementReply::CacheFlushed { removed: 1 }
        );
        assert!(relay.content_store().contains(&name));
    }

    #[test]
    fn test_stale_content_skipped_by_fresh_interests() {
        let mut relay = relay();
        let consumer = relay.face_for_peer(0, PeerAddr::Unix("/tmp/consumer".into()));
        let name = Prefix::from_uri("/news/today").unwrap();
        relay.cache_content(Content::new(name.clone(), b"old".to_vec()), false).unwrap();

        let command: ManagementCommand =
            serde_json::from_str(r#"{"command": "mark_stale", "prefix": "/news/today"}"#).unwrap();
        assert_eq!(relay.apply(command).unwrap(), ManagementReply::MarkedStale { marked: true });
        assert!(relay.content_store().get(&name).unwrap().flags.stale);

        let fresh = Selectors::NdnTlv(NdnTlvSelectors {
            must_be_fresh: true,
            ..Default::default()
        });
        let wants_fresh = Interest::new(name.clone()).with_selectors(fresh).with_nonce(1);
        assert!(matches!(
            relay.handle_interest(consumer, wants_fresh),
            Err(RelayError::NoRoute(_))
        ));
        assert_eq!(
            relay
                .handle_interest(consumer, Interest::new(name).with_nonce(2))
                .unwrap(),
            crate::engine::InterestOutcome::CacheHit
        );

        let unknown = ManagementCommand::MarkStale {
            prefix: "/missing".to_string(),
            suite: Suite::NdnTlv,
        };
        assert_eq!(relay.apply(unknown).unwrap(), ManagementReply::MarkedStale { marked: false });
    }

    #[test]
    fn test_zero_capacity_disables_caching() {
        let mut relay = relay();
        let consumer = relay.face_for_peer(0, PeerAddr::Unix("/tmp/consumer".into()));
        let producer = relay.face_for_peer(0, PeerAddr::Unix("/tmp/producer".into()));
        relay.add_route(Prefix::from_uri("/a").unwrap(), producer, Suite::NdnTlv).unwrap();
        relay
            .apply(ManagementCommand::SetCacheCapacity { entries: Some(0) })
            .unwrap();
        assert!(!relay.config().caching_enabled());

        let name = Prefix::from_uri("/a/1").unwrap();
        relay
            .handle_interest(consumer, Interest::new(name.clone()).with_nonce(1))
            .unwrap();
        relay.handle_content(producer, Content::new(name.clone(), b"x".to_vec())).unwrap();
        assert!(relay.content_store().is_empty());
    }
}
