use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::cluster::types::{NodeId, SiteId};

/// Size in bytes of the encoded [`Header`]: `u8` type + `u32` id + `u64`
/// payload, packed with no padding.
pub const HEADER_LEN: usize = 13;

/// The control message types, by wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    /// A node wants to write a variable it does not own.
    RequestOwnership = 1,
    /// The owner hands the variable over. Reply to `RequestOwnership`.
    GrantOwnership = 2,
    /// The receiver of a request is no longer the owner; the payload names
    /// the node it believes owns the variable now.
    SetNewOwner = 3,
    /// A node wants the latest value of a variable it does not own.
    AskCurrentValue = 4,
    /// The owner publishes the current value. The header's payload is the
    /// byte length of the value image that follows on the same channel.
    SetNewValue = 5,
    /// A slave reached a barrier.
    BarrierBlock = 6,
    /// The master releases a barrier.
    BarrierUnblock = 7,
    /// The owner tells a node its cached copy is no longer valid.
    InvalidateCopy = 8,
    /// Reply to `InvalidateCopy`.
    InvalidateCopyAck = 9,
}

impl MessageKind {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::RequestOwnership),
            2 => Some(Self::GrantOwnership),
            3 => Some(Self::SetNewOwner),
            4 => Some(Self::AskCurrentValue),
            5 => Some(Self::SetNewValue),
            6 => Some(Self::BarrierBlock),
            7 => Some(Self::BarrierUnblock),
            8 => Some(Self::InvalidateCopy),
            9 => Some(Self::InvalidateCopyAck),
            _ => None,
        }
    }
}

/// The fixed frame preceding every message on a channel.
///
/// `payload` is interpreted per type: a node id for requests, grants,
/// redirects, invalidations and barrier entries; the value byte length for
/// `SetNewValue`. The bincode image of this struct is exactly the packed
/// little-endian layout of [`HEADER_LEN`] bytes, which the codec tests pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub kind: u8,
    pub id: u32,
    pub payload: u64,
}

impl Header {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HEADER_LEN {
            bail!("header must be {} bytes, got {}", HEADER_LEN, bytes.len());
        }
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn kind(&self) -> Option<MessageKind> {
        MessageKind::from_code(self.kind)
    }
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    RequestOwnership { var: SiteId, from: NodeId },
    GrantOwnership { var: SiteId, from: NodeId },
    SetNewOwner { var: SiteId, owner: NodeId },
    AskCurrentValue { var: SiteId, from: NodeId },
    SetNewValue { var: SiteId, value: Vec<u8> },
    BarrierBlock { barrier: SiteId, from: NodeId },
    BarrierUnblock { barrier: SiteId },
    InvalidateCopy { var: SiteId, from: NodeId },
    InvalidateCopyAck { var: SiteId, from: NodeId },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::RequestOwnership { .. } => MessageKind::RequestOwnership,
            Self::GrantOwnership { .. } => MessageKind::GrantOwnership,
            Self::SetNewOwner { .. } => MessageKind::SetNewOwner,
            Self::AskCurrentValue { .. } => MessageKind::AskCurrentValue,
            Self::SetNewValue { .. } => MessageKind::SetNewValue,
            Self::BarrierBlock { .. } => MessageKind::BarrierBlock,
            Self::BarrierUnblock { .. } => MessageKind::BarrierUnblock,
            Self::InvalidateCopy { .. } => MessageKind::InvalidateCopy,
            Self::InvalidateCopyAck { .. } => MessageKind::InvalidateCopyAck,
        }
    }

    /// The wire header for this message.
    pub fn header(&self) -> Header {
        let kind = self.kind() as u8;
        match self {
            Self::RequestOwnership { var, from }
            | Self::GrantOwnership { var, from }
            | Self::AskCurrentValue { var, from }
            | Self::InvalidateCopy { var, from }
            | Self::InvalidateCopyAck { var, from } => Header {
                kind,
                id: *var,
                payload: *from as u64,
            },
            Self::SetNewOwner { var, owner } => Header {
                kind,
                id: *var,
                payload: *owner as u64,
            },
            Self::SetNewValue { var, value } => Header {
                kind,
                id: *var,
                payload: value.len() as u64,
            },
            Self::BarrierBlock { barrier, from } => Header {
                kind,
                id: *barrier,
                payload: *from as u64,
            },
            Self::BarrierUnblock { barrier } => Header {
                kind,
                id: *barrier,
                payload: 0,
            },
        }
    }

    /// The value image following the header on the wire, if any.
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            Self::SetNewValue { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Rebuilds a message from a received header and its body. `value` must
    /// be empty unless the header announces a value transfer.
    pub fn from_wire(header: Header, value: Vec<u8>) -> Result<Self> {
        let Some(kind) = header.kind() else {
            bail!("unknown message type code {}", header.kind);
        };
        let id = header.id;
        let node = header.payload as NodeId;
        Ok(match kind {
            MessageKind::RequestOwnership => Self::RequestOwnership { var: id, from: node },
            MessageKind::GrantOwnership => Self::GrantOwnership { var: id, from: node },
            MessageKind::SetNewOwner => Self::SetNewOwner { var: id, owner: node },
            MessageKind::AskCurrentValue => Self::AskCurrentValue { var: id, from: node },
            MessageKind::SetNewValue => {
                if value.len() as u64 != header.payload {
                    bail!(
                        "value transfer announced {} bytes but carried {}",
                        header.payload,
                        value.len()
                    );
                }
                Self::SetNewValue { var: id, value }
            }
            MessageKind::BarrierBlock => Self::BarrierBlock { barrier: id, from: node },
            MessageKind::BarrierUnblock => Self::BarrierUnblock { barrier: id },
            MessageKind::InvalidateCopy => Self::InvalidateCopy { var: id, from: node },
            MessageKind::InvalidateCopyAck => Self::InvalidateCopyAck { var: id, from: node },
        })
    }
}
