//! Core of the order management service.
//!
//! Ties the order lifecycle state machine, the timeline ledger, the payment
//! coordinator and the client-facing operations together in the
//! [`OrderEngine`], and provides the builder that assembles an engine from
//! configuration.

pub mod builder;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod recovery;
pub mod state;

pub use builder::{BuilderError, OmsBuilder, OmsFactories};
pub use catalog::Catalog;
pub use engine::{event_bus::EventBus, EngineError, OrderEngine};
pub use error::OrderServiceError;
pub use handlers::{PaymentCoordinator, PaymentReport};
pub use recovery::{RecoveryReport, RecoveryService};
pub use state::{OrderStateMachine, TransitionError};
