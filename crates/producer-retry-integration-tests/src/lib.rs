//! Producer resilience scenarios for the retry engine
//!
//! This crate provides an in-memory broker cluster and a partition writer
//! built on [`producer_retry`], so the scenario tests in `tests/` can stop
//! brokers, create topics late, and kill partition leaders while a write is
//! being retried.

pub mod cluster;
pub mod writer;

pub use cluster::{AdminError, BrokerId, Cluster, SendError};
pub use writer::{FaultHook, Writer};
