use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cluster::config::ClusterConfig;
use crate::cluster::types::NodeId;
use crate::protocol::types::Message;

const CONNECT_ATTEMPTS: usize = 40;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(250);

/// The per-node message fabric: one outbound TCP link per remote node, each
/// behind its own send lock.
pub struct Transport {
    local: NodeId,
    num_nodes: u32,
    links: HashMap<NodeId, Mutex<TcpStream>>,
}

impl Transport {
    /// Opens the full mesh for this node: binds the local listener, connects
    /// to every peer (with retry — peers may still be starting), and accepts
    /// every peer's inbound link. Returns the transport plus one inbound
    /// channel per remote for the receiver tasks.
    pub async fn connect(
        config: &ClusterConfig,
        local: NodeId,
    ) -> Result<(Self, Vec<(NodeId, TcpStream)>)> {
        let num_nodes = config.num_nodes();
        let port = config.listen_port(local);
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("binding node {} listener on port {}", local, port))?;

        let expected = num_nodes as usize - 1;

        let accept_all = async {
            let mut channels = Vec::with_capacity(expected);
            while channels.len() < expected {
                let (mut stream, addr) = listener.accept().await?;
                stream.set_nodelay(true)?;
                let mut hello = [0u8; 4];
                stream.read_exact(&mut hello).await?;
                let peer = NodeId::from_le_bytes(hello);
                debug!("Accepted link from node {} at {}", peer, addr);
                channels.push((peer, stream));
            }
            Ok::<_, anyhow::Error>(channels)
        };

        let connect_all = async {
            let mut links = HashMap::new();
            for peer in 0..num_nodes {
                if peer == local {
                    continue;
                }
                let stream = Self::connect_with_retry(config.addr_of(peer), peer, local).await?;
                links.insert(peer, Mutex::new(stream));
            }
            Ok::<_, anyhow::Error>(links)
        };

        let (channels, links) = tokio::try_join!(accept_all, connect_all)?;
        info!("Node {} connected to {} peer(s)", local, expected);

        Ok((Self { local, num_nodes, links }, channels))
    }

    async fn connect_with_retry(addr: SocketAddr, peer: NodeId, local: NodeId) -> Result<TcpStream> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match TcpStream::connect(addr).await {
                Ok(mut stream) => {
                    stream.set_nodelay(true)?;
                    stream.write_all(&local.to_le_bytes()).await?;
                    debug!("Connected to node {} at {}", peer, addr);
                    return Ok(stream);
                }
                Err(e) if attempt < CONNECT_ATTEMPTS => {
                    debug!("Node {} not reachable yet ({}), retrying", peer, e);
                    tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("connecting to node {} at {}", peer, addr));
                }
            }
        }
    }

    pub fn local(&self) -> NodeId {
        self.local
    }

    pub fn num_nodes(&self) -> u32 {
        self.num_nodes
    }

    /// Every remote node id, in ascending order.
    pub fn peers(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.num_nodes).filter(move |&n| n != self.local)
    }

    /// Sends one message to `to`. A value transfer writes header and body
    /// under the same channel lock, as one unit.
    pub async fn send(&self, to: NodeId, msg: &Message) -> Result<()> {
        if to == self.local {
            bail!("node {} attempted to send {:?} to itself", self.local, msg.kind());
        }
        let Some(link) = self.links.get(&to) else {
            bail!("no link from node {} to node {}", self.local, to);
        };

        let header = msg.header().encode()?;
        let mut stream = link.lock().await;
        stream
            .write_all(&header)
            .await
            .with_context(|| format!("sending {:?} header to node {}", msg.kind(), to))?;
        if let Some(value) = msg.value() {
            stream
                .write_all(value)
                .await
                .with_context(|| format!("sending {:?} value to node {}", msg.kind(), to))?;
        }
        Ok(())
    }

    /// Sends to every peer. Per-peer failures are logged and do not stop the
    /// fan-out.
    pub async fn broadcast(&self, msg: &Message) {
        for peer in self.peers() {
            if let Err(e) = self.send(peer, msg).await {
                warn!("Failed to send {:?} to node {}: {}", msg.kind(), peer, e);
            }
        }
    }
}
