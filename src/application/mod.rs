//! Application layer: the services that orchestrate the domain.
//!
//! [`ledger::Ledger`] owns every wallet mutation, [`orders::OrderService`]
//! owns the order state machine, and the job handlers bridge the worker
//! pools to both. All of them receive their ports explicitly at start-up.

pub mod deposits;
pub mod fulfillment;
pub mod ledger;
pub mod notifications;
pub mod orders;
pub mod reconciliation;
pub mod webhook;
