//! Handlers for incoming coherence messages.
//!
//! Called from the receiver tasks. Handlers may lock variable records, wake
//! parked local tasks and send replies, but they never wait for another
//! message — a receiver task that blocked on one would deadlock its channel.

use tracing::{debug, error, warn};

use crate::cluster::types::{NodeId, SiteId};
use crate::protocol::types::Message;

use super::engine::{CoherenceEngine, MAX_REDIRECT_HOPS};
use super::types::CoherenceState;

impl CoherenceEngine {
    /// Applies one incoming coherence message.
    pub async fn handle(&self, msg: Message) {
        match msg {
            Message::RequestOwnership { var, from } => self.on_request_ownership(var, from).await,
            Message::GrantOwnership { var, from } => self.on_grant_ownership(var, from).await,
            Message::SetNewOwner { var, owner } => self.on_set_new_owner(var, owner).await,
            Message::AskCurrentValue { var, from } => self.on_ask_current_value(var, from).await,
            Message::SetNewValue { var, value } => self.on_set_new_value(var, value).await,
            Message::InvalidateCopy { var, from } => self.on_invalidate_copy(var, from).await,
            Message::InvalidateCopyAck { var, from } => self.on_invalidate_ack(var, from).await,
            Message::BarrierBlock { .. } | Message::BarrierUnblock { .. } => {
                error!("Barrier message routed to the coherence engine: {:?}", msg.kind());
            }
        }
    }

    /// Node `from` wants to write the variable. If we still own it, hand it
    /// over and treat our copy as stale; otherwise redirect the requester to
    /// whoever we believe owns it now, leaving our state untouched.
    async fn on_request_ownership(&self, id: SiteId, from: NodeId) {
        let Some(var) = self.registry.get(id) else {
            warn!("Ownership request for unknown variable {:#010x}", id);
            return;
        };
        let mut state = var.state.lock().await;
        if state.coherence.is_owner() {
            state.coherence = CoherenceState::RemoteStale;
            state.remote_owner = from;
            debug!("Granting ownership of {:#010x} to node {}", id, from);
            if let Err(e) = self
                .transport
                .send(from, &Message::GrantOwnership { var: id, from: self.local })
                .await
            {
                error!("Failed to grant ownership of {:#010x} to node {}: {}", id, from, e);
            }
        } else {
            let owner = state.remote_owner;
            debug!("Not the owner of {:#010x}; redirecting node {} to node {}", id, from, owner);
            if let Err(e) = self
                .transport
                .send(from, &Message::SetNewOwner { var: id, owner })
                .await
            {
                error!("Failed to redirect node {} for {:#010x}: {}", from, id, e);
            }
        }
    }

    /// The previous owner handed the variable over. The parked writer
    /// finishes the transition to `OwnerExclusive` when it wakes.
    async fn on_grant_ownership(&self, id: SiteId, from: NodeId) {
        let Some(var) = self.registry.get(id) else {
            warn!("Ownership grant for unknown variable {:#010x}", id);
            return;
        };
        let state = var.state.lock().await;
        if state.write_waiters == 0 {
            warn!(
                "Node {} granted ownership of {:#010x} with no writer waiting",
                from, id
            );
        }
        var.ownership_granted.notify_waiters();
        drop(state);
    }

    /// Our request went to a node that no longer owns the variable; `owner`
    /// is its best guess at the current owner. Re-issue whatever request is
    /// outstanding there. The chain is finite: only nodes that already
    /// handed ownership away redirect, so the real owner sits at its end.
    async fn on_set_new_owner(&self, id: SiteId, owner: NodeId) {
        let Some(var) = self.registry.get(id) else {
            warn!("Owner redirect for unknown variable {:#010x}", id);
            return;
        };
        let mut state = var.state.lock().await;
        if state.coherence.is_owner() {
            // A duplicate request of ours chased the old owner after the
            // grant already landed here. Nothing left to re-issue.
            debug!("Stale owner redirect for {:#010x} ignored; we own it", id);
            return;
        }
        if owner == self.local {
            // The chain lags behind a transfer we were part of; our own
            // notion of the owner is fresher than the sender's.
            warn!("Owner redirect for {:#010x} names this node; dropping", id);
            return;
        }
        state.coherence = CoherenceState::RemoteStale;
        state.remote_owner = owner;
        state.redirect_hops += 1;
        if state.redirect_hops > MAX_REDIRECT_HOPS {
            error!(
                "Variable {:#010x} redirected {} times; ownership is churning",
                id, state.redirect_hops
            );
        }
        if state.write_waiters > 0 {
            debug!("Re-requesting ownership of {:#010x} from node {}", id, owner);
            if let Err(e) = self
                .transport
                .send(owner, &Message::RequestOwnership { var: id, from: self.local })
                .await
            {
                error!(
                    "Failed to re-request ownership of {:#010x} from node {}: {}",
                    id, owner, e
                );
            }
        } else if state.read_waiters > 0 {
            // A grant carries no bytes, so a parked refresh must chase the
            // new owner with another value request instead.
            debug!("Re-requesting value of {:#010x} from node {}", id, owner);
            if let Err(e) = self
                .transport
                .send(owner, &Message::AskCurrentValue { var: id, from: self.local })
                .await
            {
                error!(
                    "Failed to re-request value of {:#010x} from node {}: {}",
                    id, owner, e
                );
            }
        }
    }

    /// Node `from` wants to read the variable. If we own it, send the bytes
    /// and remember that a valid remote copy now exists; otherwise redirect.
    async fn on_ask_current_value(&self, id: SiteId, from: NodeId) {
        let Some(var) = self.registry.get(id) else {
            warn!("Value request for unknown variable {:#010x}", id);
            return;
        };
        let mut state = var.state.lock().await;
        if state.coherence.is_owner() {
            state.coherence = CoherenceState::OwnerShared;
            match var.slot.snapshot() {
                Ok(value) => {
                    debug!(
                        "Sending value of {:#010x} ({} bytes) to node {}",
                        id,
                        value.len(),
                        from
                    );
                    if let Err(e) = self
                        .transport
                        .send(from, &Message::SetNewValue { var: id, value })
                        .await
                    {
                        error!("Failed to send value of {:#010x} to node {}: {}", id, from, e);
                    }
                }
                Err(e) => error!("Could not snapshot variable {:#010x}: {}", id, e),
            }
        } else {
            let owner = state.remote_owner;
            debug!("Not the owner of {:#010x}; redirecting node {} to node {}", id, from, owner);
            if let Err(e) = self
                .transport
                .send(from, &Message::SetNewOwner { var: id, owner })
                .await
            {
                error!("Failed to redirect node {} for {:#010x}: {}", from, id, e);
            }
        }
    }

    /// A value image arrived, either answering our refresh or published by a
    /// destructor. Install the bytes, mark the copy valid, wake readers.
    async fn on_set_new_value(&self, id: SiteId, value: Vec<u8>) {
        let Some(var) = self.registry.get(id) else {
            warn!("Value update for unknown variable {:#010x}", id);
            return;
        };
        {
            let mut state = var.state.lock().await;
            if state.coherence.is_owner() {
                debug!(
                    "Value update for {:#010x} overwrites owner state {:?}",
                    id, state.coherence
                );
            }
            if let Err(e) = var.slot.restore(&value) {
                error!(
                    "Could not apply {}-byte value to variable {:#010x}: {}",
                    value.len(),
                    id,
                    e
                );
                return;
            }
            state.coherence = CoherenceState::RemoteCached;
        }
        self.after_remote_write(id).await;
    }

    /// The owner is about to write and our copy is no longer valid. Any
    /// state drops to stale; the ack is what the owner is counting.
    async fn on_invalidate_copy(&self, id: SiteId, from: NodeId) {
        let Some(var) = self.registry.get(id) else {
            warn!("Invalidation for unknown variable {:#010x}", id);
            return;
        };
        {
            let mut state = var.state.lock().await;
            state.coherence = CoherenceState::RemoteStale;
        }
        if let Err(e) = self
            .transport
            .send(from, &Message::InvalidateCopyAck { var: id, from: self.local })
            .await
        {
            error!(
                "Failed to ack invalidation of {:#010x} to node {}: {}",
                id, from, e
            );
        }
    }

    /// One more peer dropped its copy; the parked writer proceeds when the
    /// count drains.
    async fn on_invalidate_ack(&self, id: SiteId, from: NodeId) {
        let Some(var) = self.registry.get(id) else {
            warn!("Invalidation ack for unknown variable {:#010x}", id);
            return;
        };
        let mut state = var.state.lock().await;
        if state.pending_invalidations == 0 {
            warn!(
                "Invalidation ack from node {} for {:#010x} with none outstanding",
                from, id
            );
            return;
        }
        state.pending_invalidations -= 1;
        if state.pending_invalidations == 0 {
            var.invalidations_drained.notify_waiters();
        }
    }
}
