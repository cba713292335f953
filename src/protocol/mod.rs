//! Coherence Wire Protocol
//!
//! Defines the control messages exchanged between nodes and their byte-level
//! framing.
//!
//! Every message starts with a fixed-size packed header: one byte of message
//! type, four bytes of variable or barrier id, eight bytes of type-dependent
//! payload, all little-endian. A `SET_NEW_VALUE` header is followed on the
//! same channel by exactly `payload` raw bytes of value image; no other
//! message carries a body.

pub mod types;
