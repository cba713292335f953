use anyhow::{Context, Result, bail};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use super::types::NodeId;

/// First port of the per-node listening range: node `i` listens on
/// `base_port + i`.
pub const DEFAULT_BASE_PORT: u16 = 2000;

/// The fixed cluster membership, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    hosts: Vec<Ipv4Addr>,
    base_port: u16,
}

impl ClusterConfig {
    pub fn new(hosts: Vec<Ipv4Addr>, base_port: u16) -> Self {
        Self { hosts, base_port }
    }

    /// Reads a host file: one IPv4 address per line, line index = node id.
    /// The file must be identical on every node. Blank lines are ignored;
    /// anything else that does not parse as an address is fatal.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading host file {}", path.display()))?;

        let mut hosts = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let addr: Ipv4Addr = line.parse().with_context(|| {
                format!("{}:{}: '{}' is not an IPv4 address", path.display(), lineno + 1, line)
            })?;
            hosts.push(addr);
        }

        if hosts.is_empty() {
            bail!("host file {} lists no nodes", path.display());
        }

        Ok(Self::new(hosts, DEFAULT_BASE_PORT))
    }

    pub fn with_base_port(mut self, base_port: u16) -> Self {
        self.base_port = base_port;
        self
    }

    pub fn num_nodes(&self) -> u32 {
        self.hosts.len() as u32
    }

    pub fn contains(&self, node: NodeId) -> bool {
        (node as usize) < self.hosts.len()
    }

    /// The port node `node` listens on.
    pub fn listen_port(&self, node: NodeId) -> u16 {
        self.base_port + node as u16
    }

    /// The address remote peers connect to in order to reach `node`.
    pub fn addr_of(&self, node: NodeId) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.hosts[node as usize]), self.listen_port(node))
    }
}
