//! Hexworld Engine library.
//!
//! Server side of the hex world: commands arrive on a topic exchange, typed
//! workers apply them through the transactional game action engine, and the
//! resulting events are published back for the realtime hub.
//!
//! ## Structure
//!
//! - `infrastructure/` - Ports and their adapters (broker, persistence, config)
//! - `use_cases/` - Game actions and the services that run them
//! - `workers/` - Command dispatch and the event relay
//! - `app` - Application composition

pub mod app;
pub mod infrastructure;
pub mod use_cases;
pub mod workers;


pub use app::App;
