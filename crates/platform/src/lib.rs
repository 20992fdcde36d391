//! PicoJS Platform Abstraction
//!
//! The pieces of the surrounding OS the script host consumes:
//!
//! - a monotonic microsecond counter ([`Clock`])
//! - a cooperative delay primitive ([`Scheduler`])
//! - the console write primitive ([`Console`])
//!
//! On a microcontroller these map onto the RTOS timer and serial port; on a
//! host build they are backed by `std`.

mod clock;
mod console;
mod traits;

pub use clock::*;
pub use console::*;
pub use traits::*;
