//! Runtime Module
//!
//! The per-process facade over the cluster. `Runtime::start` loads nothing
//! itself — it takes the membership config and this node's id, opens the
//! transport mesh, and spawns one receiver task per remote node. Everything
//! else hangs off the returned handle: `register` declares a `Shared<T>`
//! variable, `barrier` enters a global synchronization point.
//!
//! The runtime is an explicit value passed to every variable, not a
//! process-wide singleton, so construction order is visible and testable.

pub mod dispatcher;
pub mod service;
pub mod shared;

#[cfg(test)]
mod tests;
