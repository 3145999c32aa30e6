use log::debug;
use serde::Serialize;

use crate::engine::Relay;

/// What one sweeper tick cleaned up
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AgingReport {
    pub faces_removed: usize,
    pub content_expired: usize,
    pub content_stale: usize,
    pub interests_expired: usize,
    pub interests_retransmitted: usize,
    pub nonces_expired: usize,
    pub computations_discarded: usize,
}

impl AgingReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Relay {
    /// Advance the relay clock by one tick and age every table.
    ///
    /// Pending Interests are retransmitted on each tick until they run out
    /// of retries or time, then removed along with their nonce and any
    /// computation waiting on them.
    pub fn tick(&mut self) -> AgingReport {
        self.clock += 1;
        let now = self.clock;
        let mut report = AgingReport::default();

        for id in self.faces.idle(now, self.config.face_timeout_ticks) {
            if let Ok(discarded) = self.remove_face(id) {
                report.faces_removed += 1;
                report.computations_discarded += discarded;
            }
        }

        for name in self.cs.mark_expired_stale(now, self.config.tick_interval()) {
            debug!("Content {} is no longer fresh", name);
            report.content_stale += 1;
        }

        if self.config.content_timeout_ticks > 0 {
            for name in self.cs.expire_idle(now, self.config.content_timeout_ticks) {
                debug!("Content {} expired", name);
                report.content_expired += 1;
            }
        }

        for id in self.pit.ids() {
            let Some(entry) = self.pit.get_mut(id) else {
                continue;
            };
            let timed_out = now.saturating_sub(entry.last_used) >= self.config.interest_timeout_ticks;
            if timed_out || entry.retries >= self.config.max_interest_retransmit {
                if let Some(entry) = self.pit.remove(id) {
                    debug!("{} for {} timed out", id, entry.interest.prefix);
                    report.interests_expired += 1;
                    report.computations_discarded += self.forget(&entry);
                }
                continue;
            }
            entry.retries += 1;
            if self.propagate(id).is_some() {
                report.interests_retransmitted += 1;
            }
        }

        report.nonces_expired = self.nonces.expire(now, self.config.nonce_timeout_ticks);

        if !report.is_empty() {
            debug!("Tick {}: {:?}", now, report);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use nfn_core::{Content, Interest, NdnTlvSelectors, Prefix, Selectors, Suite};

    use crate::config::RelayConfig;
    use crate::engine::{InterestOutcome, Relay};
    use crate::face::{FaceFlags, PeerAddr};

    fn udp(port: u16) -> PeerAddr {
        PeerAddr::Udp(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    fn name(uri: &str) -> Prefix {
        Prefix::from_uri(uri).unwrap()
    }

    fn relay(config: RelayConfig) -> Relay {
        let _ = env_logger::builder().is_test(true).try_init();
        Relay::new(config).unwrap()
    }

    #[test]
    fn test_pending_interest_retransmits_then_expires() {
        let mut relay = relay(RelayConfig {
            interest_timeout_ticks: 100,
            max_interest_retransmit: 2,
            ..Default::default()
        });
        let consumer = relay.face_for_peer(0, udp(7001));
        let other = relay.face_for_peer(0, udp(7003));
        let producer = relay.add_static_face(0, udp(7002), FaceFlags::default());
        relay.add_route(name("/a"), producer, Suite::NdnTlv).unwrap();
        relay
            .handle_interest(consumer, Interest::new(name("/a/1")).with_nonce(7))
            .unwrap();
        assert_eq!(
            relay
                .handle_interest(other, Interest::new(name("/a/1")).with_nonce(8))
                .unwrap(),
            InterestOutcome::Aggregated
        );

        assert_eq!(relay.tick().interests_retransmitted, 1);
        assert_eq!(relay.tick().interests_retransmitted, 1);
        let report = relay.tick();
        assert_eq!(report.interests_expired, 1);
        assert!(relay.pit().is_empty());
        assert!(!relay.nonces().contains(7));
        assert!(!relay.nonces().contains(8));
        assert!(relay.nonces().is_empty());
        assert_eq!(relay.faces().get(producer).unwrap().queued(), 3);
    }

    #[test]
    fn test_forwarding_keeps_upstream_face_alive() {
        let mut relay = relay(RelayConfig {
            face_timeout_ticks: 2,
            interest_timeout_ticks: 100,
            max_interest_retransmit: 10,
            ..Default::default()
        });
        let consumer = relay.add_static_face(0, udp(7001), FaceFlags::default());
        let producer = relay.face_for_peer(0, udp(7002));
        relay.add_route(name("/a"), producer, Suite::NdnTlv).unwrap();
        relay
            .handle_interest(consumer, Interest::new(name("/a/1")).with_nonce(1))
            .unwrap();

        for _ in 0..5 {
            assert_eq!(relay.tick().faces_removed, 0);
        }
        assert!(relay.faces().contains(producer));
    }

    #[test]
    fn test_content_goes_stale_after_freshness_period() {
        let mut relay = relay(RelayConfig::default());
        let consumer = relay.add_static_face(0, udp(7001), FaceFlags::default());
        let producer = relay.add_static_face(0, udp(7002), FaceFlags::default());
        relay.add_route(name("/news"), producer, Suite::NdnTlv).unwrap();
        relay
            .handle_interest(consumer, Interest::new(name("/news/today")).with_nonce(1))
            .unwrap();
        let data = Content::new(name("/news/today"), b"v1".to_vec()).with_freshness(Duration::from_secs(1));
        relay.handle_content(producer, data).unwrap();

        assert_eq!(relay.tick().content_stale, 1);
        assert!(relay.content_store().get(&name("/news/today")).unwrap().flags.stale);

        let fresh = Selectors::NdnTlv(NdnTlvSelectors {
            must_be_fresh: true,
            ..Default::default()
        });
        let wants_fresh = Interest::new(name("/news/today")).with_selectors(fresh).with_nonce(2);
        assert_eq!(
            relay.handle_interest(consumer, wants_fresh).unwrap(),
            InterestOutcome::Forwarded(producer)
        );
        assert_eq!(
            relay
                .handle_interest(consumer, Interest::new(name("/news/today")).with_nonce(3))
                .unwrap(),
            InterestOutcome::CacheHit
        );
    }

    #[test]
    fn test_pending_interest_times_out() {
        let mut relay = relay(RelayConfig {
            interest_timeout_ticks: 1,
            max_interest_retransmit: 10,
            ..Default::default()
        });
        let consumer = relay.face_for_peer(0, udp(7001));
        let producer = relay.add_static_face(0, udp(7002), FaceFlags::default());
        relay.add_route(name("/a"), producer, Suite::NdnTlv).unwrap();
        relay
            .handle_interest(consumer, Interest::new(name("/a/1")).with_nonce(7))
            .unwrap();

        assert_eq!(relay.tick().interests_expired, 1);
        assert!(relay.pit().is_empty());
    }

    #[test]
    fn test_expired_sub_interest_discards_computation() {
        let mut relay = relay(RelayConfig {
            interest_timeout_ticks: 1,
            ..Default::default()
        });
        let consumer = relay.face_for_peer(0, udp(7001));
        let producer = relay.add_static_face(0, udp(7002), FaceFlags::default());
        relay.add_route(name("/data"), producer, Suite::NdnTlv).unwrap();
        let outcome = relay
            .handle_interest(consumer, Interest::new(name("/%2Fdata%2Fx/NFN")).with_nonce(1))
            .unwrap();
        assert!(matches!(outcome, InterestOutcome::Suspended(_)));

        let report = relay.tick();
        assert_eq!(report.interests_expired, 2);
        assert_eq!(report.computations_discarded, 1);
        assert!(relay.computations().is_empty());
        assert!(relay.nonces().is_empty());
    }

    #[test]
    fn test_idle_faces_and_content_age_out() {
        let mut relay = relay(RelayConfig {
            face_timeout_ticks: 2,
            content_timeout_ticks: 2,
            ..Default::default()
        });
        let dynamic = relay.face_for_peer(0, udp(7001));
        let fixed = relay.add_static_face(0, udp(7002), FaceFlags::default());
        relay.cache_content(Content::new(name("/kept"), b"k".to_vec()), true).unwrap();
        relay.cache_content(Content::new(name("/dropped"), b"d".to_vec()), false).unwrap();

        relay.tick();
        relay.tick();
        let report = relay.tick();
        assert_eq!(report.faces_removed, 1);
        assert_eq!(report.content_expired, 1);
        assert!(!relay.faces().contains(dynamic));
        assert!(relay.faces().contains(fixed));
        assert!(relay.content_store().contains(&name("/kept")));
        assert!(!relay.content_store().contains(&name("/dropped")));
    }

    #[test]
    fn test_nonces_expire() {
        let mut relay = relay(RelayConfig {
            nonce_timeout_ticks: 1,
            ..Default::default()
        });
        let consumer = relay.add_static_face(0, udp(7001), FaceFlags::default());
        relay.cache_content(Content::new(name("/a"), b"1".to_vec()), true).unwrap();
        relay
            .handle_interest(consumer, Interest::new(name("/a")).with_nonce(3))
            .unwrap();
        relay.tick();
        assert_eq!(relay.tick().nonces_expired, 1);
        assert!(relay
            .handle_interest(consumer, Interest::new(name("/a")).with_nonce(3))
            .is_ok());
    }
}
