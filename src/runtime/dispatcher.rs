use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::{debug, error, info};

use crate::barrier::coordinator::BarrierCoordinator;
use crate::cluster::types::NodeId;
use crate::coherence::engine::CoherenceEngine;
use crate::protocol::types::{HEADER_LEN, Header, Message, MessageKind};

/// Upper bound on a value transfer; anything larger means the channel is
/// desynchronized or the peer is broken.
const MAX_VALUE_LEN: u64 = 16 * 1024 * 1024;

/// Receives and dispatches every message node `peer` sends us. One task per
/// remote; runs until the channel is torn down.
///
/// Handlers may lock variable records, wake parked tasks and send replies,
/// but nothing here waits for another message on this channel. The only read
/// beyond the header is the value image directly following a value-transfer
/// header, which the sender wrote under the same channel lock.
pub async fn receive_loop(
    coherence: Arc<CoherenceEngine>,
    barriers: Arc<BarrierCoordinator>,
    peer: NodeId,
    mut channel: TcpStream,
) {
    let mut header_buf = [0u8; HEADER_LEN];
    loop {
        if let Err(e) = channel.read_exact(&mut header_buf).await {
            info!("Channel from node {} closed: {}", peer, e);
            return;
        }
        let header = match Header::decode(&header_buf) {
            Ok(header) => header,
            Err(e) => {
                error!("Undecodable header from node {}: {}", peer, e);
                return;
            }
        };
        let Some(kind) = header.kind() else {
            error!("Unknown message type {} from node {}", header.kind, peer);
            continue;
        };

        let value = if kind == MessageKind::SetNewValue {
            if header.payload > MAX_VALUE_LEN {
                error!(
                    "Node {} announced an absurd {}-byte value; dropping the channel",
                    peer, header.payload
                );
                return;
            }
            let mut value = vec![0u8; header.payload as usize];
            if let Err(e) = channel.read_exact(&mut value).await {
                error!("Channel from node {} died mid-value: {}", peer, e);
                return;
            }
            value
        } else {
            Vec::new()
        };

        let msg = match Message::from_wire(header, value) {
            Ok(msg) => msg,
            Err(e) => {
                error!("Malformed {:?} from node {}: {}", kind, peer, e);
                continue;
            }
        };
        debug!("Dispatching {:?} from node {}", msg.kind(), peer);
        match msg {
            Message::BarrierBlock { barrier, from } => barriers.handle_block(barrier, from).await,
            Message::BarrierUnblock { barrier } => barriers.handle_unblock(barrier).await,
            other => coherence.handle(other).await,
        }
    }
}
