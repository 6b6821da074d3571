//! Domain models for the Field Service Management platform

mod alert;
mod component;
mod movement;

pub use alert::*;
pub use component::*;
pub use movement::*;
