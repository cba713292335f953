use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::cluster::types::{NodeId, SiteId};
use crate::protocol::types::Message;
use crate::transport::service::Transport;

use super::registry::VariableRegistry;
use super::types::{CoherenceState, ValueSlot, Variable};

/// Redirect hops after which each further hop is logged: the chain still
/// terminates at the real owner, but ownership is churning pathologically.
pub(super) const MAX_REDIRECT_HOPS: u32 = 32;

/// Per-node coherence engine. Owns the variable registry and drives the
/// ownership protocol from two sides: the local access hooks called by
/// `Shared` handles, and the message handlers called by the receiver tasks.
pub struct CoherenceEngine {
    pub(super) local: NodeId,
    pub(super) num_nodes: u32,
    pub(super) transport: Arc<Transport>,
    pub(super) registry: VariableRegistry,
}

impl CoherenceEngine {
    pub fn new(local: NodeId, num_nodes: u32, transport: Arc<Transport>) -> Self {
        Self {
            local,
            num_nodes,
            transport,
            registry: VariableRegistry::new(),
        }
    }

    pub fn local(&self) -> NodeId {
        self.local
    }

    /// Read access to the variable records, for inspection.
    pub fn registry(&self) -> &VariableRegistry {
        &self.registry
    }

    /// Registers a variable under its site id.
    pub fn register(&self, id: SiteId, slot: Arc<dyn ValueSlot>) -> anyhow::Result<Arc<Variable>> {
        let var = Arc::new(Variable::new(id, self.local, slot));
        if !self.registry.insert(var.clone()) {
            anyhow::bail!("variable {:#010x} is already registered", id);
        }
        debug!("Registered variable {:#010x}", id);
        Ok(var)
    }

    /// Removes a variable, publishing its final bytes to every peer first.
    /// Peers keep their records; they simply hold the last value seen.
    pub async fn unregister(&self, id: SiteId) {
        let Some(var) = self.registry.get(id) else {
            warn!("Destroying unknown variable {:#010x}", id);
            return;
        };
        {
            let _state = var.state.lock().await;
            match var.slot.snapshot() {
                Ok(value) => {
                    self.transport
                        .broadcast(&Message::SetNewValue { var: id, value })
                        .await;
                }
                Err(e) => {
                    error!("Could not snapshot variable {:#010x} for destruction: {}", id, e);
                }
            }
        }
        self.registry.remove(id);
        debug!("Variable {:#010x} destroyed", id);
    }

    /// Read hook: a stale copy is refreshed from the owner before the caller
    /// touches the bytes. Cached copies and owned variables read locally
    /// with no traffic.
    pub async fn before_local_read(&self, id: SiteId) {
        let Some(var) = self.registry.get(id) else {
            warn!("Read on unknown variable {:#010x}", id);
            return;
        };
        let mut state = var.state.lock().await;
        while state.coherence == CoherenceState::RemoteStale {
            let owner = state.remote_owner;
            state.read_waiters += 1;
            state.redirect_hops = 0;
            debug!("Refreshing variable {:#010x} from node {}", id, owner);
            if let Err(e) = self
                .transport
                .send(owner, &Message::AskCurrentValue { var: id, from: self.local })
                .await
            {
                error!("Failed to request value of {:#010x} from node {}: {}", id, owner, e);
            }
            let refreshed = var.value_refreshed.notified();
            tokio::pin!(refreshed);
            refreshed.as_mut().enable();
            drop(state);
            refreshed.await;
            state = var.state.lock().await;
            state.read_waiters -= 1;
        }
    }

    /// Write hook: returns with the variable exclusively owned by this node.
    ///
    /// A remote variable requests ownership from the believed owner and
    /// parks until the grant arrives, following redirects if ownership moved
    /// in the meantime. A shared owner invalidates every remote copy and
    /// parks until all acks are in. An exclusive owner proceeds immediately.
    pub async fn before_local_write(&self, id: SiteId) {
        let Some(var) = self.registry.get(id) else {
            warn!("Write on unknown variable {:#010x}", id);
            return;
        };
        let mut state = var.state.lock().await;
        match state.coherence {
            CoherenceState::OwnerExclusive => {}
            CoherenceState::RemoteCached | CoherenceState::RemoteStale => {
                let owner = state.remote_owner;
                state.write_waiters += 1;
                state.redirect_hops = 0;
                debug!("Requesting ownership of {:#010x} from node {}", id, owner);
                if let Err(e) = self
                    .transport
                    .send(owner, &Message::RequestOwnership { var: id, from: self.local })
                    .await
                {
                    error!(
                        "Failed to request ownership of {:#010x} from node {}: {}",
                        id, owner, e
                    );
                }
                let granted = var.ownership_granted.notified();
                tokio::pin!(granted);
                granted.as_mut().enable();
                drop(state);
                granted.await;
                state = var.state.lock().await;
                state.write_waiters -= 1;
                state.coherence = CoherenceState::OwnerExclusive;
                debug!("Ownership of {:#010x} granted", id);
            }
            CoherenceState::OwnerShared => {
                let peers = self.num_nodes as usize - 1;
                state.pending_invalidations = peers;
                if peers > 0 {
                    debug!("Invalidating {} remote copies of {:#010x}", peers, id);
                    self.transport
                        .broadcast(&Message::InvalidateCopy { var: id, from: self.local })
                        .await;
                }
                while state.pending_invalidations > 0 {
                    let drained = var.invalidations_drained.notified();
                    tokio::pin!(drained);
                    drained.as_mut().enable();
                    drop(state);
                    drained.await;
                    state = var.state.lock().await;
                }
                state.coherence = CoherenceState::OwnerExclusive;
            }
        }
    }

    /// Write epilogue. The mutation happened under the caller's value lock
    /// while no other node held a valid copy. Ownership may legally have
    /// moved on already — a request served between the mutation and this
    /// hook grants the post-write bytes — so a non-exclusive state here is
    /// only surfaced, not treated as fatal.
    pub async fn after_local_write(&self, id: SiteId) {
        let Some(var) = self.registry.get(id) else {
            return;
        };
        let state = var.state.lock().await;
        if state.coherence != CoherenceState::OwnerExclusive {
            debug!(
                "Variable {:#010x} already left the exclusive state ({:?}) after a local write",
                id, state.coherence
            );
        }
    }

    /// Wakes readers parked on a refresh once a new value has landed.
    pub async fn after_remote_write(&self, id: SiteId) {
        let Some(var) = self.registry.get(id) else {
            warn!("Not waking readers of unknown variable {:#010x}", id);
            return;
        };
        var.value_refreshed.notify_waiters();
    }
}
