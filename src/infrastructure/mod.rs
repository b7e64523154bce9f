//! Adapters behind the domain ports.

pub mod http_provider;
pub mod in_memory;
pub mod mailer;
pub mod queue;
pub mod seed;
pub mod stripe;
