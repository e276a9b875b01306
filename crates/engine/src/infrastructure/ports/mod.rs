//! Port traits for infrastructure boundaries.
//!
//! Ports exist for:
//! - World persistence (in-memory or SQLite)
//! - Publishing to the broker (so handlers can be tested without one)
//! - Pushing events to connected clients (the realtime hub lives elsewhere)
//! - Clock/Random (for testing)

mod error;
mod messaging;
mod repos;
mod testing;

// =============================================================================
// Repository Ports
// =============================================================================
pub use repos::{WorldStore, WorldTx};

// =============================================================================
// Messaging Ports
// =============================================================================
pub use messaging::{
    AckDecision, DeliveryHandler, HandlerError, MessageProducer, NotifyTarget, RealtimeNotifier,
};

// =============================================================================
// Errors
// =============================================================================
pub use error::{BrokerError, NotifyError, RepoError};

// =============================================================================
// Test-Only Mocks (only available during test builds)
// =============================================================================
#[cfg(test)]
pub use messaging::{MockMessageProducer, MockRealtimeNotifier};

#[cfg(test)]
pub use repos::MockWorldStore;

#[cfg(test)]
pub use testing::{MockClockPort, MockRandomPort};

// =============================================================================
// Testing Ports
// =============================================================================
pub use testing::{ClockPort, RandomPort};
