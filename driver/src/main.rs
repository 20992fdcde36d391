//! PicoJS smoke-test driver
//!
//! Boots one script context over the static arena, runs the fixed snippet
//! sequence, destroys the context and then idles the way firmware would.

mod snippets;

use std::time::Duration;

use picojs_platform::{MonotonicClock, Scheduler};
use picojs_script_host::{HostCapabilities, HostConfig, MemoryArena, ScriptContext};

/// Engine working memory (1 MB)
const ARENA_SIZE: usize = 1024 * 1024;

static JS_MEM: MemoryArena<ARENA_SIZE> = MemoryArena::new();

/// Settings read from the environment
#[derive(Debug, Clone, Default)]
struct DriverConfig {
    /// `PICOJS_IDLE=1`: park after the run instead of exiting
    idle: bool,
    /// `PICOJS_REPORT=jsonl`: print a JSON-lines report after the run
    report_jsonl: bool,
}

impl DriverConfig {
    fn from_env() -> Self {
        let flag = |key: &str| {
            std::env::var(key).is_ok_and(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        };
        Self {
            idle: flag("PICOJS_IDLE"),
            report_jsonl: std::env::var("PICOJS_REPORT").is_ok_and(|v| v == "jsonl"),
        }
    }
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("picojs=info".parse().unwrap()),
        )
        .init();

    let config = DriverConfig::from_env();
    let mut console = picojs_platform::Console::new();

    println!("=== PicoJS host ===\n");

    let mut ctx = match ScriptContext::create(&JS_MEM, HostCapabilities::console(), HostConfig::default()) {
        Ok(ctx) => ctx,
        Err(err) => {
            println!("Failed to create JS context: {err}");
            return;
        }
    };

    let reports = match snippets::run_snippets(&mut ctx, snippets::SNIPPETS, &mut console) {
        Ok(reports) => reports,
        Err(err) => {
            println!("Driver aborted: {err}");
            Vec::new()
        }
    };

    let usage = ctx.arena_usage();
    tracing::info!(
        capacity = usage.capacity,
        peak = usage.peak,
        allocations = usage.allocations,
        "Arena usage"
    );

    if let Err(err) = ctx.destroy() {
        tracing::warn!(%err, "Destroy failed");
    }

    println!("=== Done ===");

    if config.report_jsonl {
        if let Err(err) = snippets::write_report(&reports) {
            tracing::warn!(%err, "Failed to write report");
        }
    }

    if config.idle {
        MonotonicClock::new().idle_forever(Duration::from_secs(1));
    }
}
