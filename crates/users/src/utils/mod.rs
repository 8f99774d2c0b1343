//! Internal utilities for the user domain.

pub mod clock;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
