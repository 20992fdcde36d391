//! Host function bridge
//!
//! The fixed registry of native functions scripts can call, and the code
//! that installs it into a fresh context's global namespace. The registry is
//! a static table: nothing is added or removed after a context is created.

use std::fmt;
use std::rc::Rc;

use picojs_platform::Clock;
use rquickjs::function::Rest;
use rquickjs::{qjs, Ctx, Function, Object, Value};

use crate::dump::{dump_long, string_lossy};
use crate::gate::{gated_function, GatedCapability, SharedAudit};
use crate::sink::SharedSink;

/// How many arguments a host function takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(u8),
    Variadic,
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(n) => write!(f, "{n}"),
            Self::Variadic => f.write_str("..."),
        }
    }
}

impl Arity {
    /// Value of the function's `length` property
    pub fn length(&self) -> usize {
        match self {
            Self::Fixed(n) => usize::from(*n),
            Self::Variadic => 0,
        }
    }
}

/// Where a host function is installed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Directly on the global object
    Global,
    /// As a method of an existing global object, created if missing
    Member(&'static str),
    /// As a method of a host-owned global object that replaces any object
    /// the engine installed under the same name
    Namespace(&'static str),
}

/// Native behaviour behind a registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFunctionKind {
    Print,
    Gc,
    DateNow,
    PerformanceNow,
    Gated(GatedCapability),
}

/// One registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostFunction {
    pub name: &'static str,
    pub binding: Binding,
    pub arity: Arity,
    pub kind: HostFunctionKind,
}

impl HostFunction {
    /// Name as seen from script, e.g. `performance.now`
    pub fn qualified_name(&self) -> String {
        match self.binding {
            Binding::Global => self.name.to_string(),
            Binding::Member(owner) | Binding::Namespace(owner) => {
                format!("{owner}.{}", self.name)
            }
        }
    }
}

const fn gated(capability: GatedCapability, arity: u8) -> HostFunction {
    HostFunction {
        name: capability.function_name(),
        binding: Binding::Global,
        arity: Arity::Fixed(arity),
        kind: HostFunctionKind::Gated(capability),
    }
}

/// Every function installed into a new context
pub const HOST_FUNCTIONS: &[HostFunction] = &[
    HostFunction {
        name: "print",
        binding: Binding::Global,
        arity: Arity::Variadic,
        kind: HostFunctionKind::Print,
    },
    HostFunction {
        name: "gc",
        binding: Binding::Global,
        arity: Arity::Fixed(0),
        kind: HostFunctionKind::Gc,
    },
    HostFunction {
        name: "now",
        binding: Binding::Member("Date"),
        arity: Arity::Fixed(0),
        kind: HostFunctionKind::DateNow,
    },
    HostFunction {
        name: "now",
        binding: Binding::Namespace("performance"),
        arity: Arity::Fixed(0),
        kind: HostFunctionKind::PerformanceNow,
    },
    gated(GatedCapability::Load, 1),
    gated(GatedCapability::SetTimeout, 2),
    gated(GatedCapability::ClearTimeout, 1),
];

/// Handles the native side of the bridge shares with its context
pub(crate) struct BridgeState {
    pub sink: SharedSink,
    pub clock: Rc<dyn Clock>,
    pub audit: SharedAudit,
    pub dump_depth: usize,
}

/// Install [`HOST_FUNCTIONS`] into the context's globals
pub(crate) fn install_host_functions<'js>(
    ctx: &Ctx<'js>,
    state: &BridgeState,
) -> rquickjs::Result<()> {
    let globals = ctx.globals();
    let mut namespaces: Vec<(&'static str, Object<'js>)> = Vec::new();

    for entry in HOST_FUNCTIONS {
        let function = build_function(ctx, entry, state)?
            .with_name(entry.name)?
            .with_length(entry.arity.length())?;

        match entry.binding {
            Binding::Global => globals.set(entry.name, function)?,
            Binding::Member(owner) => {
                let target = match globals.get::<_, Option<Object<'js>>>(owner)? {
                    Some(target) => target,
                    None => {
                        let target = Object::new(ctx.clone())?;
                        globals.set(owner, target.clone())?;
                        target
                    }
                };
                target.set(entry.name, function)?;
            }
            // The engine's own `performance.now` is read-only, so the whole
            // object is swapped for one the host controls
            Binding::Namespace(owner) => {
                let target = match namespaces.iter().find(|(name, _)| *name == owner) {
                    Some((_, target)) => target.clone(),
                    None => {
                        let target = Object::new(ctx.clone())?;
                        globals.set(owner, target.clone())?;
                        namespaces.push((owner, target.clone()));
                        target
                    }
                };
                target.set(entry.name, function)?;
            }
        }

        tracing::debug!(
            name = %entry.qualified_name(),
            arity = %entry.arity,
            "Installed host function"
        );
    }

    Ok(())
}

fn build_function<'js>(
    ctx: &Ctx<'js>,
    entry: &HostFunction,
    state: &BridgeState,
) -> rquickjs::Result<Function<'js>> {
    match entry.kind {
        HostFunctionKind::Print => {
            let sink = state.sink.clone();
            let depth = state.dump_depth;
            Function::new(ctx.clone(), move |args: Rest<Value<'js>>| {
                print_values(&sink, &args.0, depth);
            })
        }
        HostFunctionKind::Gc => Function::new(ctx.clone(), |ctx: Ctx<'js>| {
            collect_garbage(&ctx);
        }),
        HostFunctionKind::DateNow => {
            let clock = state.clock.clone();
            Function::new(ctx.clone(), move |ctx: Ctx<'js>| {
                integer_value(&ctx, clock.now_millis())
            })
        }
        HostFunctionKind::PerformanceNow => {
            let clock = state.clock.clone();
            Function::new(ctx.clone(), move || clock.now_millis_f64())
        }
        HostFunctionKind::Gated(capability) => {
            gated_function(ctx, capability, state.audit.clone(), state.clock.clone())
        }
    }
}

/// Render `args` as one line and hand it to the sink in a single flushed write
fn print_values(sink: &SharedSink, args: &[Value<'_>], dump_depth: usize) {
    let mut line = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i != 0 {
            line.push(' ');
        }
        match string_lossy(arg) {
            Some(text) => line.push_str(&text),
            None => line.push_str(&dump_long(arg, dump_depth)),
        }
    }
    line.push('\n');

    if let Err(err) = sink.borrow_mut().emit(line.as_bytes()) {
        tracing::warn!(%err, "print: output sink write failed");
    }
}

fn collect_garbage(ctx: &Ctx<'_>) {
    // SAFETY: a host function only runs while its runtime is alive and
    // locked by the current evaluation
    unsafe { qjs::JS_RunGC(qjs::JS_GetRuntime(ctx.as_raw().as_ptr())) };
}

/// Integer script number, falling back to a double outside the i32 range
fn integer_value<'js>(ctx: &Ctx<'js>, n: u64) -> Value<'js> {
    match i32::try_from(n) {
        Ok(small) => Value::new_int(ctx.clone(), small),
        Err(_) => Value::new_float(ctx.clone(), n as f64),
    }
}

/// TypeScript definition for the host API
pub const TYPESCRIPT_DEFINITIONS: &str = r#"
/**
 * PicoJS Host API
 *
 * Globals available to scripts running on the device.
 */

/**
 * Write arguments to the console, separated by spaces and followed by a
 * newline. Strings are written raw; other values as a structural dump.
 */
declare function print(...args: any[]): void;

/** Run a synchronous garbage collection pass. */
declare function gc(): void;

interface DateConstructor {
    /** Whole milliseconds on the monotonic device counter. */
    now(): number;
}

declare namespace performance {
    /** Milliseconds on the monotonic device counter, sub-millisecond precision. */
    function now(): number;
}

/** Always throws TypeError: no filesystem on this target. */
declare function load(path: string): never;

/** Always throws TypeError: no event loop on this target. */
declare function setTimeout(callback: () => void, delay?: number): never;

/** Always throws TypeError: no event loop on this target. */
declare function clearTimeout(handle: number): never;
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn registry_names_are_unique() {
        let names: HashSet<_> = HOST_FUNCTIONS.iter().map(HostFunction::qualified_name).collect();
        assert_eq!(names.len(), HOST_FUNCTIONS.len());
        assert!(names.contains("Date.now"));
        assert!(names.contains("performance.now"));
    }

    #[test]
    fn arity_sets_function_length() {
        let lengths: Vec<_> = HOST_FUNCTIONS
            .iter()
            .map(|f| (f.name, f.arity.length()))
            .collect();
        assert!(lengths.contains(&("print", 0)));
        assert!(lengths.contains(&("load", 1)));
        assert!(lengths.contains(&("setTimeout", 2)));
        assert!(lengths.contains(&("clearTimeout", 1)));
    }

    #[test]
    fn registry_covers_every_gated_capability() {
        for capability in GatedCapability::ALL {
            assert!(HOST_FUNCTIONS
                .iter()
                .any(|f| f.kind == HostFunctionKind::Gated(capability)
                    && f.name == capability.function_name()));
        }
    }

    #[test]
    fn typescript_definitions_cover_registry() {
        for entry in HOST_FUNCTIONS {
            assert!(
                TYPESCRIPT_DEFINITIONS.contains(entry.name),
                "missing definition for {}",
                entry.qualified_name()
            );
        }
    }

    #[test]
    fn arity_display() {
        assert_eq!(Arity::Fixed(2).to_string(), "2");
        assert_eq!(Arity::Variadic.to_string(), "...");
    }
}
