//! Queue workers: command dispatch for tiles, buildings and players, and the
//! event relay.

pub mod building;
pub mod dispatch;
pub mod events;
pub mod player;
pub mod relay;
pub mod tile;

pub use building::{BuildingCommand, BuildingCommandHandler};
pub use dispatch::{
    CommandDispatcher, CommandFamily, CommandHandler, DecodeError, MessageScope, QueueWorker,
    ScopeFactory,
};
pub use events::EventPublisher;
pub use player::{PlayerCommand, PlayerCommandHandler};
pub use relay::EventRelay;
pub use tile::{TileCommand, TileCommandHandler};
