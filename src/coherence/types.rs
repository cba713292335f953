use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

use crate::cluster::types::{MASTER_NODE, NodeId, SiteId};

/// Coherence state of one shared variable on one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoherenceState {
    /// This node owns the variable; no remote copy is valid.
    OwnerExclusive,
    /// This node owns the variable; remote nodes may hold valid cached
    /// copies that must be invalidated before the next local write.
    OwnerShared,
    /// Another node owns the variable; the local copy may be read.
    RemoteCached,
    /// Another node owns the variable; the local copy must be refreshed
    /// before the next read.
    RemoteStale,
}

impl CoherenceState {
    pub fn is_owner(self) -> bool {
        matches!(self, Self::OwnerExclusive | Self::OwnerShared)
    }
}

/// Capability the engine uses to move a variable's bytes without knowing its
/// type.
pub trait ValueSlot: Send + Sync {
    /// Byte length of the current value image.
    fn size(&self) -> usize;
    /// Serializes the current value.
    fn snapshot(&self) -> anyhow::Result<Vec<u8>>;
    /// Replaces the current value from a byte image.
    fn restore(&self, bytes: &[u8]) -> anyhow::Result<()>;
}

/// Mutable protocol fields of a variable, guarded by the record mutex.
#[derive(Debug)]
pub struct VarState {
    pub coherence: CoherenceState,
    /// Node believed to own the variable. Meaningful only in the remote
    /// states; may lag behind reality, in which case that node redirects.
    pub remote_owner: NodeId,
    /// Invalidation acks still outstanding before a shared owner may write.
    pub pending_invalidations: usize,
    /// Local writers parked until an ownership grant arrives.
    pub write_waiters: usize,
    /// Local readers parked until a refresh delivers a value.
    pub read_waiters: usize,
    /// Redirect hops taken by the currently outstanding remote request.
    pub redirect_hops: u32,
}

/// One registered shared variable: protocol state plus the typed value slot
/// behind its opaque capability.
pub struct Variable {
    pub id: SiteId,
    pub slot: Arc<dyn ValueSlot>,
    pub state: Mutex<VarState>,
    /// Signaled when a refresh delivered a new value.
    pub value_refreshed: Notify,
    /// Signaled when an ownership grant arrived.
    pub ownership_granted: Notify,
    /// Signaled when the last outstanding invalidation ack arrived.
    pub invalidations_drained: Notify,
}

impl Variable {
    /// A fresh record in the bootstrap state: the master starts as owner of
    /// every variable, every other node starts with a cached copy owned by
    /// the master. No message is exchanged — each node constructs the same
    /// initial value from the same declaration.
    pub fn new(id: SiteId, local: NodeId, slot: Arc<dyn ValueSlot>) -> Self {
        let coherence = if local == MASTER_NODE {
            CoherenceState::OwnerShared
        } else {
            CoherenceState::RemoteCached
        };
        Self {
            id,
            slot,
            state: Mutex::new(VarState {
                coherence,
                remote_owner: MASTER_NODE,
                pending_invalidations: 0,
                write_waiters: 0,
                read_waiters: 0,
                redirect_hops: 0,
            }),
            value_refreshed: Notify::new(),
            ownership_granted: Notify::new(),
            invalidations_drained: Notify::new(),
        }
    }
}
