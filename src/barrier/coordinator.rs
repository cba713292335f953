use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, warn};

use crate::cluster::types::{MASTER_NODE, NodeId, SiteId};
use crate::protocol::types::Message;
use crate::transport::service::Transport;

/// Master-side accounting for one barrier site.
struct MasterBarrier {
    remaining: usize,
    release: Arc<Notify>,
}

/// Coordinates global barriers for one node.
pub struct BarrierCoordinator {
    local: NodeId,
    num_nodes: u32,
    transport: Arc<Transport>,
    /// Master only. One mutex covers the table and every counter in it.
    waiting: Mutex<HashMap<SiteId, MasterBarrier>>,
    /// Slave only. Sites this node is currently parked on.
    parked: Mutex<HashMap<SiteId, Arc<Notify>>>,
}

impl BarrierCoordinator {
    pub fn new(local: NodeId, num_nodes: u32, transport: Arc<Transport>) -> Self {
        Self {
            local,
            num_nodes,
            transport,
            waiting: Mutex::new(HashMap::new()),
            parked: Mutex::new(HashMap::new()),
        }
    }

    /// Blocks until every node has entered the barrier `id`.
    pub async fn wait(&self, id: SiteId) {
        debug!("Barrier {:#010x} reached locally", id);
        if self.local == MASTER_NODE {
            self.wait_master(id).await;
        } else {
            self.wait_slave(id).await;
        }
    }

    async fn wait_master(&self, id: SiteId) {
        let mut waiting = self.waiting.lock().await;
        let entry = waiting.entry(id).or_insert_with(|| MasterBarrier {
            remaining: self.num_nodes as usize,
            release: Arc::new(Notify::new()),
        });
        entry.remaining -= 1;
        if entry.remaining > 0 {
            debug!(
                "Waiting for {} more node(s) at barrier {:#010x}",
                entry.remaining, id
            );
            let release = entry.release.clone();
            let released = release.notified();
            tokio::pin!(released);
            released.as_mut().enable();
            drop(waiting);
            released.await;
            waiting = self.waiting.lock().await;
        }
        waiting.remove(&id);
        drop(waiting);

        debug!("Releasing barrier {:#010x}", id);
        self.transport
            .broadcast(&Message::BarrierUnblock { barrier: id })
            .await;
    }

    async fn wait_slave(&self, id: SiteId) {
        let release = {
            let mut parked = self.parked.lock().await;
            parked
                .entry(id)
                .or_insert_with(|| Arc::new(Notify::new()))
                .clone()
        };
        let released = release.notified();
        tokio::pin!(released);
        released.as_mut().enable();

        if let Err(e) = self
            .transport
            .send(MASTER_NODE, &Message::BarrierBlock { barrier: id, from: self.local })
            .await
        {
            error!("Failed to announce barrier {:#010x} to the master: {}", id, e);
        }
        released.await;

        self.parked.lock().await.remove(&id);
    }

    /// A slave reached barrier `id`. Counts the entry and wakes the master's
    /// own entry when the count drains. Runs on a receiver task, so it must
    /// never park — the broadcast happens on the master's entry path.
    pub async fn handle_block(&self, id: SiteId, from: NodeId) {
        if self.local != MASTER_NODE {
            error!("Barrier entry from node {} received by a non-master node", from);
            return;
        }
        let mut waiting = self.waiting.lock().await;
        let entry = waiting.entry(id).or_insert_with(|| MasterBarrier {
            remaining: self.num_nodes as usize,
            release: Arc::new(Notify::new()),
        });
        if entry.remaining == 0 {
            warn!("Node {} entered barrier {:#010x} past its release", from, id);
            return;
        }
        entry.remaining -= 1;
        debug!(
            "Node {} reached barrier {:#010x} ({} remaining)",
            from, id, entry.remaining
        );
        if entry.remaining == 0 {
            entry.release.notify_waiters();
        }
    }

    /// The master released barrier `id`.
    pub async fn handle_unblock(&self, id: SiteId) {
        if self.local == MASTER_NODE {
            error!("Barrier release received by the master");
            return;
        }
        let parked = self.parked.lock().await;
        match parked.get(&id) {
            Some(release) => release.notify_waiters(),
            None => warn!("Barrier release for {:#010x} with nobody parked", id),
        }
    }
}
