//! Handlers for the payment side of the order lifecycle.

pub mod payment;

pub use payment::{PaymentCoordinator, PaymentReport};
