//! Domain model: entities, value objects and the ports the application
//! layer talks through.

pub mod catalog;
pub mod job;
pub mod money;
pub mod notification;
pub mod order;
pub mod payment;
pub mod ports;
pub mod transaction;
pub mod wallet;
