use std::net::SocketAddr;
use std::{fs, path::Path, path::PathBuf};

use anyhow::Context;
use nfn_core::Suite;
use nfn_relay::{FaceFlags, PeerAddr, RelayConfig};
use serde::{Deserialize, Serialize};

/// UDP port used when no interface is configured
pub const NDN_UDP_PORT: u16 = 6363;
/// UDP port of the CCNx suites
pub const CCN_UDP_PORT: u16 = 9695;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub relay: RelayConfig,
    /// Directory of encoded Content packets loaded into the cache at startup
    pub data_dir: Option<PathBuf>,
    pub interfaces: Vec<InterfaceConfig>,
    pub faces: Vec<FaceConfig>,
    pub routes: Vec<RouteConfig>,
    pub logging: LoggingConfig,
}

/// Local socket the relay listens on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InterfaceConfig {
    Udp { bind: SocketAddr },
    Unix { path: PathBuf },
}

/// Static face created at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceConfig {
    /// Referenced by routes
    pub name: String,
    /// Index into `interfaces`
    #[serde(default)]
    pub interface: usize,
    pub peer: PeerAddr,
    #[serde(default)]
    pub flags: FaceFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub prefix: String,
    /// Name of a configured face
    pub face: String,
    #[serde(default)]
    pub suite: Suite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Interfaces to bind. Without any configured, a single UDP socket on
    /// the suite's well-known port.
    pub fn effective_interfaces(&self) -> Vec<InterfaceConfig> {
        if !self.interfaces.is_empty() {
            return self.interfaces.clone();
        }
        let port = match self.relay.suite {
            Suite::Ccnb | Suite::CcnTlv => CCN_UDP_PORT,
            _ => NDN_UDP_PORT,
        };
        vec![InterfaceConfig::Udp {
            bind: SocketAddr::from(([0, 0, 0, 0], port)),
        }]
    }

    /// Check that faces and routes refer to things that exist
    pub fn validate(&self) -> anyhow::Result<()> {
        self.relay.validate()?;
        let interfaces = self.effective_interfaces().len();
        for face in &self.faces {
            if face.interface >= interfaces {
                anyhow::bail!("face {} uses interface {} but only {} are configured", face.name, face.interface, interfaces);
            }
        }
        for route in &self.routes {
            if !self.faces.iter().any(|face| face.name == route.face) {
                anyhow::bail!("route {} refers to unknown face {}", route.prefix, route.face);
            }
        }
        Ok(())
    }
}
