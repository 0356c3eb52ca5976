//! Small runtime helpers shared across layers.

pub mod bytes;
pub mod cancel;
pub mod clock;
