//! Broker credentials and runtime settings.

pub mod credentials;
pub mod types;
