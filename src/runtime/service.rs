use anyhow::{Result, bail};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::info;

use crate::barrier::coordinator::BarrierCoordinator;
use crate::cluster::config::ClusterConfig;
use crate::cluster::types::{MASTER_NODE, NodeId, site_id};
use crate::coherence::engine::CoherenceEngine;
use crate::transport::service::Transport;

use super::dispatcher;
use super::shared::Shared;

/// One node's handle to the shared-memory cluster.
pub struct Runtime {
    node_id: NodeId,
    num_nodes: u32,
    coherence: Arc<CoherenceEngine>,
    barriers: Arc<BarrierCoordinator>,
}

impl Runtime {
    /// Connects the full mesh and starts one receiver task per remote node.
    /// Returns once every peer is reachable.
    pub async fn start(config: ClusterConfig, node_id: NodeId) -> Result<Arc<Self>> {
        if !config.contains(node_id) {
            bail!(
                "node id {} is out of range for a {}-node cluster",
                node_id,
                config.num_nodes()
            );
        }
        let num_nodes = config.num_nodes();

        let (transport, channels) = Transport::connect(&config, node_id).await?;
        let transport = Arc::new(transport);
        let coherence = Arc::new(CoherenceEngine::new(node_id, num_nodes, transport.clone()));
        let barriers = Arc::new(BarrierCoordinator::new(node_id, num_nodes, transport.clone()));

        for (peer, channel) in channels {
            let coherence = coherence.clone();
            let barriers = barriers.clone();
            tokio::spawn(async move {
                dispatcher::receive_loop(coherence, barriers, peer, channel).await;
            });
        }

        info!(
            "Node {}/{} online{}",
            node_id,
            num_nodes,
            if node_id == MASTER_NODE { " (master)" } else { "" }
        );

        Ok(Arc::new(Self {
            node_id,
            num_nodes,
            coherence,
            barriers,
        }))
    }

    /// Declares a shared variable at a source site. The same declaration
    /// must run on every node — `site!()` yields a token both sides agree
    /// on, and `initial` must be the same value everywhere.
    pub fn register<T>(self: &Arc<Self>, token: &str, initial: T) -> Result<Shared<T>>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        Shared::register(self.clone(), site_id(token), initial)
    }

    /// Enters the barrier at a source site; returns once every node has
    /// entered it.
    pub async fn barrier(&self, token: &str) {
        self.barriers.wait(site_id(token)).await;
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn num_nodes(&self) -> u32 {
        self.num_nodes
    }

    pub fn is_master(&self) -> bool {
        self.node_id == MASTER_NODE
    }

    pub(crate) fn coherence(&self) -> &Arc<CoherenceEngine> {
        &self.coherence
    }
}
