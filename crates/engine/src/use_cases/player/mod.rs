//! Player use cases.

mod join;

pub use join::{JoinPlayer, Joined};
