//! Resource regeneration.

mod regenerate;
mod tick;

pub use regenerate::{RegenerateResources, TickSummary};
pub use tick::ResourceTickService;
