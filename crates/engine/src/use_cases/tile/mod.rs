//! Tile use cases.

mod claim;

pub use claim::{ClaimResult, ClaimTile};
