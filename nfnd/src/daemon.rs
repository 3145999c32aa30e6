use std::collections::HashMap;
use std::future::Future;
use std::time::Instant;

use anyhow::Context;
use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use nfn_core::{codec_for, Packet, WireCodec};
use nfn_relay::{ManagementCommand, ManagementReply, Relay, RelayError};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::prepopulate;
use crate::transport::{Inbound, Interface};

const INBOUND_QUEUE: usize = 1024;

pub struct Daemon {
    config: Config,
    relay: Relay,
    codec: Box<dyn WireCodec>,
    interfaces: Vec<Interface>,
    started_at: DateTime<Local>,
}

impl Daemon {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let relay = Relay::new(config.relay.clone())?;
        let codec = codec_for(config.relay.suite)?;
        Ok(Self {
            config,
            relay,
            codec,
            interfaces: Vec::new(),
            started_at: Local::now(),
        })
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    /// Bind interfaces, pre-populate the cache and install the configured
    /// faces and routes
    pub async fn start(&mut self) -> anyhow::Result<()> {
        info!("Starting NFN relay at {}", self.started_at.format("%Y-%m-%d %H:%M:%S"));
        nfn_core::init();
        nfn_relay::init();

        let interval = self.config.relay.inter_packet_interval();
        for (ifindex, iface) in self.config.effective_interfaces().iter().enumerate() {
            let iface = Interface::bind(ifindex, iface, interval).await?;
            match (iface.udp_addr(), iface.unix_path()) {
                (Some(addr), _) => info!("Interface {} listening on udp:{}", ifindex, addr),
                (None, Some(path)) => info!("Interface {} listening on unix:{}", ifindex, path.display()),
                (None, None) => {}
            }
            self.interfaces.push(iface);
        }

        if let Some(dir) = self.config.data_dir.clone() {
            prepopulate::load_directory(&mut self.relay, self.codec.as_ref(), &dir).await?;
        }

        let mut faces = HashMap::new();
        for face in &self.config.faces {
            let command = ManagementCommand::AddFace {
                ifindex: face.interface,
                peer: face.peer.clone(),
                flags: face.flags,
            };
            if let ManagementReply::FaceAdded { face: id } = self.relay.apply(command)? {
                faces.insert(face.name.clone(), id);
            }
        }
        for route in &self.config.routes {
            let face = *faces
                .get(&route.face)
                .with_context(|| format!("unknown face {}", route.face))?;
            self.relay.apply(ManagementCommand::AddRoute {
                prefix: route.prefix.clone(),
                face,
                suite: route.suite,
            })?;
        }

        info!(
            "Relay started with {} interfaces, {} faces and {} routes",
            self.interfaces.len(),
            self.relay.faces().len(),
            self.relay.fib().len()
        );
        Ok(())
    }

    /// Run the event loop until `shutdown` completes
    pub async fn run_until<F>(&mut self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let (tx, mut rx) = mpsc::channel(INBOUND_QUEUE);
        let receivers: Vec<_> = self
            .interfaces
            .iter()
            .map(|iface| iface.spawn_receiver(tx.clone()))
            .collect();
        drop(tx);

        let period = self.config.relay.tick_interval();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        tokio::pin!(shutdown);

        let result = loop {
            let wake = self.next_wakeup();
            tokio::select! {
                _ = &mut shutdown => break Ok(()),
                inbound = rx.recv() => match inbound {
                    Some(inbound) => self.dispatch(inbound),
                    None => break Err(anyhow::anyhow!("all interfaces closed")),
                },
                _ = ticker.tick() => {
                    self.relay.tick();
                }
                _ = sleep_until(wake) => {}
            }
            self.transmit().await;
        };

        for receiver in receivers {
            receiver.abort();
        }
        result
    }

    /// Decode a datagram and hand it to the relay
    pub fn dispatch(&mut self, inbound: Inbound) {
        let packet = match self.codec.decode(&inbound.bytes) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Dropping {} bytes from {}: {}", inbound.bytes.len(), inbound.peer, e);
                return;
            }
        };
        let face = self.relay.face_for_peer(inbound.ifindex, inbound.peer);
        let result = match packet {
            Packet::Interest(interest) => self.relay.handle_interest(face, interest).map(|outcome| {
                debug!("Interest from {}: {:?}", face, outcome);
            }),
            Packet::Content(content) => self.relay.handle_content(face, content).map(|outcome| {
                debug!("Content from {}: {:?}", face, outcome);
            }),
        };
        match result {
            Ok(()) => {}
            Err(e @ RelayError::Computation(_)) => warn!("{}: {}", face, e),
            Err(e) => debug!("Dropped packet from {}: {}", face, e),
        }
    }

    /// Move paced packets from the face queues onto the interfaces and send
    /// what the interface pacing allows
    async fn transmit(&mut self) {
        let now = Instant::now();
        loop {
            let ready = self.relay.drain_ready(now);
            if ready.is_empty() {
                break;
            }
            for outbound in ready {
                let bytes = match self.codec.encode(&outbound.packet) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!("Cannot encode {}: {}", outbound.packet.name(), e);
                        continue;
                    }
                };
                match self.interfaces.get_mut(outbound.ifindex) {
                    Some(iface) => iface.queue(outbound.peer, bytes),
                    None => warn!("{} refers to missing interface {}", outbound.face, outbound.ifindex),
                }
            }
        }
        for iface in &mut self.interfaces {
            iface.flush(now).await;
        }
    }

    /// Earliest moment a paced packet becomes sendable
    fn next_wakeup(&self) -> Option<Instant> {
        self.interfaces
            .iter()
            .filter_map(Interface::next_slot)
            .chain(self.relay.faces().next_deadline())
            .min()
    }

    /// Log final statistics
    pub fn stop(&mut self) {
        let uptime = Local::now().signed_duration_since(self.started_at);
        info!("Stopping NFN relay after {}s", uptime.num_seconds());
        match serde_json::to_string(self.relay.stats()) {
            Ok(stats) => info!("Relay statistics: {}", stats),
            Err(e) => error!("Cannot serialize statistics: {}", e),
        }
        for iface in &self.interfaces {
            if iface.has_backlog() {
                warn!("Interface {}: dropping unsent datagrams", iface.ifindex);
            }
        }
        self.interfaces.clear();
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}
