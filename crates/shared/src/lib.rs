//! Hexworld Shared - the wire contract between command producers, workers and
//! the event relay
//!
//! - Exchange, queue and routing-key names ([`topics`])
//! - The envelope every message travels in ([`envelope`])
//! - Command payloads ([`commands`]) and event payloads ([`events`])
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - Only serde, uuid, serde_json, and thiserror
//! 2. **No business logic** - Pure data types and serialization
//! 3. **No domain IDs** - use raw `uuid::Uuid` in payloads

pub mod commands;
pub mod envelope;
pub mod events;
pub mod topics;

pub use commands::{BuildBuildingCommand, ClaimTileCommand, JoinPlayerCommand};
pub use envelope::{EnvelopeError, GameEnvelope};
pub use events::{
    ActionRejectedEvent, BuildingBuiltEvent, PlayerData, PlayerJoinedEvent, TileClaimedEvent,
    TileContentData, TileData,
};
