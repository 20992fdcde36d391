//! Script context lifecycle over a bound arena

use std::cell::RefCell;
use std::ffi::CString;
use std::io;
use std::rc::Rc;
use std::sync::Arc;

use rquickjs::{qjs, Context, Ctx, Runtime, Value};

use crate::arena::{ArenaBinding, ArenaStats, ArenaUsage, MemoryArena};
use crate::bindings::{install_host_functions, BridgeState};
use crate::dump::{to_script_exception, to_script_value};
use crate::gate::{GateAudit, GatedCall, SharedAudit};
use crate::sink::SharedSink;
use crate::{HostCapabilities, HostConfig, HostError, ScriptException, ScriptValue};

/// Smallest arena the engine runtime can be bootstrapped in
///
/// Below this the runtime allocation itself fails, which the binding does
/// not survive, so such arenas are refused before the engine is touched.
pub const MIN_ARENA_SIZE: usize = 32 * 1024;

/// Lifecycle state of a [`ScriptContext`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Live,
    Destroyed,
}

/// Engine handles; `context` is declared first so it is freed first
struct Engine {
    context: Context,
    runtime: Runtime,
}

/// One engine instance bound to one arena
///
/// Globals persist across [`evaluate`](Self::evaluate) calls until the
/// context is destroyed. Destroying frees the engine and releases the arena,
/// which can then back a new context with a clean global namespace.
pub struct ScriptContext<'a> {
    // Field order matters: the engine must be gone before the arena is released
    engine: Option<Engine>,
    binding: Option<ArenaBinding<'a>>,
    capacity: usize,
    stats: Arc<ArenaStats>,
    sink: SharedSink,
    audit: SharedAudit,
    pending: Option<ScriptException>,
    config: HostConfig,
}

impl<'a> ScriptContext<'a> {
    /// Bind `arena`, boot the engine inside it and install the host API
    pub fn create<const N: usize>(
        arena: &'a MemoryArena<N>,
        capabilities: HostCapabilities,
        config: HostConfig,
    ) -> Result<Self, HostError> {
        if N < MIN_ARENA_SIZE {
            tracing::warn!(capacity = N, minimum = MIN_ARENA_SIZE, "Arena below engine minimum");
            return Err(HostError::OutOfMemory { capacity: N });
        }
        let binding = arena.bind()?;
        let stats = Arc::new(ArenaStats::default());

        // SAFETY: the allocator moves into `runtime`, which is dropped before
        // `binding` on every path (locals drop in reverse order, and the
        // struct declares `engine` ahead of `binding`)
        let allocator = unsafe { binding.allocator(stats.clone()) };
        let runtime =
            Runtime::new_with_alloc(allocator).map_err(|e| creation_error(e, &stats, N))?;
        runtime.set_max_stack_size(config.max_stack_size);
        runtime.set_gc_threshold(config.gc_threshold);

        let context = Context::full(&runtime).map_err(|e| creation_error(e, &stats, N))?;

        let sink = Rc::new(RefCell::new(capabilities.sink));
        let audit = Rc::new(RefCell::new(GateAudit::new(config.audit_capacity)));
        let bridge = BridgeState {
            sink: sink.clone(),
            clock: capabilities.clock,
            audit: audit.clone(),
            dump_depth: config.dump_depth,
        };
        context
            .with(|ctx| install_host_functions(&ctx, &bridge))
            .map_err(|e| match creation_error(e, &stats, N) {
                HostError::Engine(msg) => HostError::Binding(msg),
                other => other,
            })?;

        tracing::info!(
            capacity = N,
            in_use = stats.snapshot(N).in_use,
            "Script context created"
        );

        Ok(Self {
            engine: Some(Engine { context, runtime }),
            binding: Some(binding),
            capacity: N,
            stats,
            sink,
            audit,
            pending: None,
            config,
        })
    }

    pub fn state(&self) -> ContextState {
        if self.engine.is_some() {
            ContextState::Live
        } else {
            ContextState::Destroyed
        }
    }

    pub fn is_live(&self) -> bool {
        self.state() == ContextState::Live
    }

    /// Compile and run one source unit in global scope
    ///
    /// Returns the completion value, or [`ScriptValue::Exception`] when the
    /// script threw; the exception is then available from
    /// [`take_exception`](Self::take_exception).
    pub fn evaluate(&mut self, source: &str, source_name: &str) -> Result<ScriptValue, HostError> {
        let engine = self.engine.as_ref().ok_or(HostError::ContextDestroyed)?;
        let depth = self.config.dump_depth;

        let outcome = engine.context.with(|ctx| match eval_global(&ctx, source, source_name) {
            Ok(value) => Ok(to_script_value(&value, depth)),
            Err(()) => Err(to_script_exception(&ctx.catch(), source_name, depth)),
        });

        match outcome {
            Ok(value) => Ok(value),
            Err(exception) => {
                tracing::debug!(
                    source = source_name,
                    kind = ?exception.kind,
                    message = %exception.message,
                    "Evaluation threw"
                );
                self.pending = Some(exception);
                Ok(ScriptValue::Exception)
            }
        }
    }

    /// The exception raised by the last failing evaluation, if not yet taken
    pub fn pending_exception(&self) -> Option<&ScriptException> {
        self.pending.as_ref()
    }

    pub fn take_exception(&mut self) -> Option<ScriptException> {
        self.pending.take()
    }

    /// Write the diagnostic dump of `exception` to the output sink
    pub fn report_exception(&self, exception: &ScriptException) -> io::Result<()> {
        let mut text = exception.rendered.clone();
        text.push('\n');
        self.sink.borrow_mut().emit(text.as_bytes())
    }

    /// Host-side equivalent of the script `gc()`
    pub fn collect_garbage(&self) -> Result<(), HostError> {
        let engine = self.engine.as_ref().ok_or(HostError::ContextDestroyed)?;
        engine.runtime.run_gc();
        Ok(())
    }

    pub fn arena_usage(&self) -> ArenaUsage {
        self.stats.snapshot(self.capacity)
    }

    /// Calls refused by the capability gate, oldest first
    pub fn gated_calls(&self) -> Vec<GatedCall> {
        self.audit.borrow().entries().cloned().collect()
    }

    /// Gate audit as JSON lines
    pub fn export_gate_audit(&self) -> String {
        self.audit.borrow().export_jsonl()
    }

    /// Free the engine and release the arena
    pub fn destroy(&mut self) -> Result<(), HostError> {
        let engine = self.engine.take().ok_or(HostError::ContextDestroyed)?;
        drop(engine);
        self.binding = None;

        let usage = self.arena_usage();
        tracing::info!(
            capacity = usage.capacity,
            peak = usage.peak,
            failed_allocations = usage.failed_allocations,
            "Script context destroyed"
        );
        Ok(())
    }
}

impl Drop for ScriptContext<'_> {
    fn drop(&mut self) {
        if self.is_live() {
            let _ = self.destroy();
        }
    }
}

/// Run `source` as a strict global script named `source_name`
///
/// The source is passed with an explicit length, so embedded NUL bytes are
/// seen by the parser rather than truncating the script. `Err` means an
/// exception is pending on `ctx`.
fn eval_global<'js>(ctx: &Ctx<'js>, source: &str, source_name: &str) -> Result<Value<'js>, ()> {
    let mut input = Vec::with_capacity(source.len() + 1);
    input.extend_from_slice(source.as_bytes());
    input.push(0);
    let file_name = CString::new(source_name.replace('\0', "")).unwrap_or_default();
    let flags = (qjs::JS_EVAL_TYPE_GLOBAL | qjs::JS_EVAL_FLAG_STRICT) as i32;

    // SAFETY: `input` is NUL terminated one past `source.len()`, as the
    // engine requires, and both buffers outlive the call
    unsafe {
        let raw = qjs::JS_Eval(
            ctx.as_raw().as_ptr(),
            input.as_ptr().cast(),
            source.len() as _,
            file_name.as_ptr(),
            flags,
        );
        if qjs::JS_IsException(raw) {
            Err(())
        } else {
            Ok(Value::from_raw(ctx.clone(), raw))
        }
    }
}

fn creation_error(err: rquickjs::Error, stats: &ArenaStats, capacity: usize) -> HostError {
    if matches!(err, rquickjs::Error::Allocation) || stats.failed_allocations() > 0 {
        tracing::warn!(capacity, %err, "Arena exhausted during engine bootstrap");
        HostError::OutOfMemory { capacity }
    } else {
        HostError::Engine(err.to_string())
    }
}
