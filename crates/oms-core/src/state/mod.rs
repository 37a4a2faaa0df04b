//! State management for orders.
//!
//! The pure lifecycle state machine, revision-checked persistence and the
//! per-order locks that serialize operations on one order.

pub mod locks;
pub mod machine;
pub mod repository;

pub use locks::{OrderLockGuard, OrderLocks};
pub use machine::{OrderStateMachine, TransitionError};
pub use repository::{Modified, OrderRepository};
