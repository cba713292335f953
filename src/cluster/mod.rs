//! Cluster Membership Module
//!
//! The membership is fixed: a plain-text host file lists one IPv4 address per
//! line, and the line index is the node id. Every node loads an identical
//! file at startup; node 0 is the master. There is no discovery, no joining
//! and no failure detection — a node that goes away stalls whatever traffic
//! depended on it.
//!
//! This module also derives the 32-bit site ids that name shared variables
//! and barriers. The id is a hash of a source-site token, so declaring the
//! same variable at the same source site on every node yields the same id
//! without any naming traffic.

pub mod config;
pub mod types;
