//! Exchange topology and routing keys
//!
//! Routing keys are dot-separated: `game.commands.<domain>.<verb>` for
//! commands and `game.events.<domain>.<verb>` for events. Binding patterns use
//! `*` for exactly one segment and `#` for zero or more.

pub const COMMANDS_EXCHANGE: &str = "game.commands.exchange";
pub const EVENTS_EXCHANGE: &str = "game.events.exchange";

pub mod commands {
    pub const TILE_CLAIM: &str = "game.commands.tile.claim";
    pub const BUILDING_BUILD: &str = "game.commands.building.build";
    pub const PLAYER_JOIN: &str = "game.commands.player.join";

    pub const TILE_PATTERN: &str = "game.commands.tile.*";
    pub const BUILDING_PATTERN: &str = "game.commands.building.*";
    pub const PLAYER_PATTERN: &str = "game.commands.player.*";
}

pub mod events {
    pub const TILE_CLAIMED: &str = "game.events.tile.claimed";
    pub const TILE_REJECTED: &str = "game.events.tile.rejected";
    pub const BUILDING_BUILT: &str = "game.events.building.built";
    pub const BUILDING_REJECTED: &str = "game.events.building.rejected";
    pub const PLAYER_JOINED: &str = "game.events.player.joined";
    pub const PLAYER_REJECTED: &str = "game.events.player.rejected";

    pub const ALL_PATTERN: &str = "game.events.#";
}

pub mod queues {
    pub const TILE_WORKER: &str = "game.commands.tileworker";
    pub const BUILDING_WORKER: &str = "game.commands.buildingworker";
    pub const PLAYER_WORKER: &str = "game.commands.playerworker";
    pub const EVENT_RELAY: &str = "game.events.relay";
}
