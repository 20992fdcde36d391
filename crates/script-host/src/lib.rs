//! PicoJS Script Host
//!
//! Embeds a QuickJS engine inside a fixed, statically allocated memory arena
//! and exposes a small native host API to scripts.
//!
//! ## Host API
//!
//! - `print(...args)` - Write to the output sink, space separated, newline terminated
//! - `gc()` - Run a synchronous garbage collection pass
//! - `Date.now()` - Whole milliseconds on the monotonic counter
//! - `performance.now()` - Fractional milliseconds on the same counter
//!
//! ## Gated capabilities
//!
//! `load`, `setTimeout` and `clearTimeout` exist but always throw a
//! `TypeError` naming the missing platform feature.

mod arena;
mod bindings;
mod dump;
mod gate;
mod runtime;
mod sink;

pub use arena::{ArenaBinding, ArenaStats, ArenaUsage, MemoryArena};
pub use bindings::{Arity, Binding, HostFunction, HostFunctionKind, HOST_FUNCTIONS, TYPESCRIPT_DEFINITIONS};
pub use gate::{GateAudit, GatedCall, GatedCapability};
pub use runtime::*;
pub use sink::{CaptureBuffer, OutputSink};

pub use picojs_protocol::{ExceptionKind, ScriptException, ScriptValue};

use std::rc::Rc;

use picojs_platform::{Clock, MonotonicClock};
use thiserror::Error;

/// Native failures of the script host
///
/// Script-level failures never show up here; they are returned as
/// [`ScriptValue::Exception`] with the details held by the context.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Arena of {capacity} bytes is too small for the engine")]
    OutOfMemory { capacity: usize },

    #[error("Arena is already bound to a live context")]
    ArenaBusy,

    #[error("Script context has been destroyed")]
    ContextDestroyed,

    #[error("Host binding failed: {0}")]
    Binding(String),

    #[error("Engine error: {0}")]
    Engine(String),
}

/// Configuration for a script context
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Native stack the engine may use before raising a stack overflow
    pub max_stack_size: usize,
    /// Allocated bytes that trigger an automatic collection
    pub gc_threshold: usize,
    /// Nesting depth of long-form dumps before eliding with `[Object]`
    pub dump_depth: usize,
    /// Number of gated calls kept in the audit log
    pub audit_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_stack_size: 256 * 1024, // 256 KB
            gc_threshold: 128 * 1024,   // 128 KB
            dump_depth: 4,
            audit_capacity: 64,
        }
    }
}

/// Platform services handed to a context at creation
pub struct HostCapabilities {
    pub sink: OutputSink,
    pub clock: Rc<dyn Clock>,
}

impl HostCapabilities {
    pub fn new(sink: OutputSink, clock: Rc<dyn Clock>) -> Self {
        Self { sink, clock }
    }

    /// Platform console and monotonic clock
    pub fn console() -> Self {
        Self::new(OutputSink::console(), Rc::new(MonotonicClock::new()))
    }
}
