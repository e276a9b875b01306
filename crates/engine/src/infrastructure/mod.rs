//! Infrastructure layer
//!
//! Ports, broker transport, messaging, persistence and process configuration.

pub mod broker;
pub mod clock;
pub mod config;
pub mod messaging;
pub mod notifier;
pub mod persistence;
pub mod ports;
