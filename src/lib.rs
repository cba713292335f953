//! Distributed Shared Memory Runtime Library
//!
//! This library crate defines the core modules of the shared-memory runtime.
//! It serves as the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! The system is composed of six loosely coupled subsystems:
//!
//! - **`cluster`**: The membership layer. Loads the fixed host list (one node
//!   per line, line index = node id) and derives the stable 32-bit site ids
//!   that name shared variables and barriers identically on every node.
//! - **`protocol`**: The wire protocol. Nine fixed-layout control messages
//!   drive ownership migration, value refresh, invalidation and barriers.
//! - **`transport`**: The message fabric. One ordered, reliable TCP channel
//!   per ordered node pair, with a per-peer send lock so a value transfer is
//!   never interleaved with other traffic on the same link.
//! - **`coherence`**: The heart of the runtime. A four-state ownership
//!   protocol keeps every node's view of a variable consistent: reads refresh
//!   stale copies from the owner, writes migrate ownership and invalidate
//!   remote copies before mutating.
//! - **`barrier`**: Global synchronization points. The master counts entries
//!   from every node and broadcasts the release.
//! - **`runtime`**: The per-process facade. Wires the layers together, spawns
//!   one receiver task per remote node, and exposes the typed `Shared<T>`
//!   variable handle to applications.

pub mod barrier;
pub mod cluster;
pub mod coherence;
pub mod protocol;
pub mod runtime;
pub mod transport;
