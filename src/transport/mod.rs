//! Transport Module
//!
//! Provides one ordered, reliable byte channel per ordered node pair. Node
//! `i` listens on `base_port + i`; its link to node `j` is a TCP connection
//! to `j`'s listening port, announced with a 4-byte node-id hello so the
//! accepting side can tell its per-sender channels apart.
//!
//! Sends are serialized per peer: a value transfer writes its header and
//! body under one channel lock, so the two are never interleaved with other
//! traffic on that link. Receiving is pull-based — the runtime hands each
//! inbound channel to a dedicated receiver task.

pub mod service;
