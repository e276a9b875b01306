//! Value objects: validated by construction, compared by value

mod color;
mod names;
mod session;

pub use color::HexColor;
pub use names::PlayerName;
pub use session::SessionId;
