//! Coherence Engine Module
//!
//! Keeps every node's view of a shared variable consistent with a four-state
//! ownership protocol.
//!
//! ## Core Concepts
//! - **Ownership**: exactly one node owns a variable at a time; only the
//!   owner may mutate it. The master bootstraps as owner of everything.
//! - **Migration**: a writer that does not own the variable requests
//!   ownership from the believed owner and follows redirects until the
//!   grant arrives. The grant moves the right to write, not the bytes — a
//!   writer replaces the whole value anyway.
//! - **Refresh**: a reader whose copy is stale asks the owner for the
//!   current value; the owner answers with the bytes and remembers that
//!   remote copies now exist.
//! - **Invalidation**: an owner with outstanding remote copies must collect
//!   an invalidation ack from every peer before it may write again.

pub mod engine;
pub mod handlers;
pub mod registry;
pub mod types;

#[cfg(test)]
mod tests;
