//! # txguard-envelope
//!
//! The two pieces of shared mutable state in a TxGuard deployment, plus the
//! task that keeps one of them bounded:
//!
//! - [`RequestStore`]: pending handshakes keyed by [`RequestId`](txguard_types::RequestId),
//!   expired by TTL
//! - [`ResourceLock`]: per-resource mutual exclusion with FIFO handoff
//! - [`RequestSweeper`]: background reclamation of abandoned handshakes
//!
//! Both the store and the lock are constructed once and shared via `Arc`.

pub mod request_store;
pub mod resource_lock;
pub mod sweeper;

pub use request_store::*;
pub use resource_lock::*;
pub use sweeper::*;
