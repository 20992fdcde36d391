//! Capability gate
//!
//! Platform features this target does not have are still installed as
//! globals, but calling them throws a `TypeError` naming the missing
//! capability. Scripts written for a fuller environment therefore load and
//! run, and can `catch` the failure at the call site. A gated call never
//! performs the operation; recording it in the [`GateAudit`] is its only
//! effect.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use picojs_platform::Clock;
use rquickjs::function::Rest;
use rquickjs::{Ctx, Exception, Function, Value};
use serde::Serialize;

/// Unsupported capabilities and the stand-ins that represent them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatedCapability {
    /// `load(path)`: no filesystem
    Load,
    /// `setTimeout(callback, delay)`: no event loop
    SetTimeout,
    /// `clearTimeout(handle)`: no event loop
    ClearTimeout,
}

impl GatedCapability {
    pub const ALL: [Self; 3] = [Self::Load, Self::SetTimeout, Self::ClearTimeout];

    /// Global the stand-in is installed under
    pub const fn function_name(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::SetTimeout => "setTimeout",
            Self::ClearTimeout => "clearTimeout",
        }
    }

    /// Message of the thrown `TypeError`
    pub const fn message(self) -> &'static str {
        match self {
            Self::Load => "load() not supported: no filesystem on this target",
            Self::SetTimeout => "setTimeout() not supported: no event loop on this target",
            Self::ClearTimeout => "clearTimeout() not supported: no event loop on this target",
        }
    }
}

/// One refused invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatedCall {
    pub capability: GatedCapability,
    /// Number of arguments the script passed
    pub argc: usize,
    /// Monotonic timestamp of the call
    pub at_micros: u64,
}

/// Bounded log of gated invocations, oldest dropped first
#[derive(Debug)]
pub struct GateAudit {
    entries: VecDeque<GatedCall>,
    max_entries: usize,
}

impl GateAudit {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries,
        }
    }

    pub fn record(&mut self, call: GatedCall) {
        tracing::debug!(
            capability = call.capability.function_name(),
            argc = call.argc,
            at_micros = call.at_micros,
            "Gated capability invoked"
        );

        if self.max_entries == 0 {
            return;
        }
        if self.entries.len() == self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(call);
    }

    pub fn entries(&self) -> impl Iterator<Item = &GatedCall> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Export to JSON lines format
    pub fn export_jsonl(&self) -> String {
        self.entries
            .iter()
            .filter_map(|e| serde_json::to_string(e).ok())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for GateAudit {
    fn default() -> Self {
        Self::new(64)
    }
}

pub(crate) type SharedAudit = Rc<RefCell<GateAudit>>;

/// Build the stand-in function for `capability`
pub(crate) fn gated_function<'js>(
    ctx: &Ctx<'js>,
    capability: GatedCapability,
    audit: SharedAudit,
    clock: Rc<dyn Clock>,
) -> rquickjs::Result<Function<'js>> {
    Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<()> {
            audit.borrow_mut().record(GatedCall {
                capability,
                argc: args.0.len(),
                at_micros: clock.now_micros(),
            });
            Err(Exception::throw_type(&ctx, capability.message()))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use picojs_protocol::UNSUPPORTED_MARKER;

    fn call(capability: GatedCapability, at_micros: u64) -> GatedCall {
        GatedCall {
            capability,
            argc: 1,
            at_micros,
        }
    }

    #[test]
    fn messages_carry_the_unsupported_marker() {
        for capability in GatedCapability::ALL {
            let message = capability.message();
            assert!(message.starts_with(capability.function_name()));
            assert!(message.contains(UNSUPPORTED_MARKER));
        }
    }

    #[test]
    fn audit_rotates_oldest_first() {
        let mut audit = GateAudit::new(2);
        audit.record(call(GatedCapability::Load, 1));
        audit.record(call(GatedCapability::SetTimeout, 2));
        audit.record(call(GatedCapability::ClearTimeout, 3));

        let kept: Vec<_> = audit.entries().map(|c| c.capability).collect();
        assert_eq!(kept, [GatedCapability::SetTimeout, GatedCapability::ClearTimeout]);
    }

    #[test]
    fn audit_with_zero_capacity_keeps_nothing() {
        let mut audit = GateAudit::new(0);
        audit.record(call(GatedCapability::Load, 1));
        assert!(audit.is_empty());
    }

    #[test]
    fn audit_exports_jsonl() {
        let mut audit = GateAudit::default();
        audit.record(call(GatedCapability::Load, 10));
        audit.record(call(GatedCapability::ClearTimeout, 20));

        let jsonl = audit.export_jsonl();
        let lines: Vec<_> = jsonl.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"load\""));
        assert!(lines[1].contains("\"clear_timeout\""));
    }
}
