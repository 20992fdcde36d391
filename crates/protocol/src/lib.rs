//! PicoJS Protocol
//!
//! Owned data types that cross the host boundary: values and exceptions
//! produced by an evaluation, and the reports the driver emits.
//! Engine handles never leave an evaluation, so everything here is plain data.

mod events;
mod types;

pub use events::*;
pub use types::*;
