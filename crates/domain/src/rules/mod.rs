//! Pure game rules
//!
//! Every function here takes already-loaded entities and either returns a
//! [`RuleViolation`] or mutates the entities in memory. Loading and persisting
//! belong to the engine's action implementations.

mod claim;
mod join;
mod placement;
mod regeneration;
mod violation;

pub use claim::{evaluate_claim, ClaimDecision, ClaimPolicy, OpenContest, UnownedOnly};
pub use join::{starting_balances, MAX_COLOR_ATTEMPTS};
pub use placement::{
    deduct_cost, stamp_footprint, validate_placement, validate_resources, PlacementSite,
};
pub use regeneration::{RegenerationRate, RegenerationRules, TickOutcome};
pub use violation::RuleViolation;
