//! Fixed smoke-test sequence

use std::io::{self, Write};

use picojs_protocol::{EvalStatus, ScriptValue, SnippetReport};
use picojs_script_host::{HostError, ScriptContext};

/// A named source unit
#[derive(Debug, Clone, Copy)]
pub struct Snippet {
    pub name: &'static str,
    pub source: &'static str,
}

/// The sequence run on every boot
pub const SNIPPETS: &[Snippet] = &[
    Snippet {
        name: "test1.js",
        source: "print('Hello from PicoJS!')",
    },
    Snippet {
        name: "test2.js",
        source: "print(123)",
    },
    Snippet {
        name: "test3.js",
        source: "print(10 + 20)",
    },
    Snippet {
        name: "test4.js",
        source: "var x = 1",
    },
    Snippet {
        name: "test5.js",
        source: "print('a' + 'b')",
    },
    Snippet {
        name: "test6.js",
        source: "print('x is', x)",
    },
    Snippet {
        name: "test7.js",
        source: "print('uptime', Date.now(), 'ms')",
    },
    Snippet {
        name: "test8.js",
        source: "load('boot.js')",
    },
];

/// Run `snippets` in order on one context, framing each on `console`
///
/// Script exceptions are reported and the run continues; only native
/// failures stop it.
pub fn run_snippets(
    ctx: &mut ScriptContext<'_>,
    snippets: &[Snippet],
    console: &mut impl Write,
) -> Result<Vec<SnippetReport>, HostError> {
    let mut reports = Vec::with_capacity(snippets.len());

    for (i, snippet) in snippets.iter().enumerate() {
        frame(console, format_args!("Test {}: {}\n", i + 1, snippet.source));

        let value = ctx.evaluate(snippet.source, snippet.name)?;
        let status = match (value, ctx.take_exception()) {
            (ScriptValue::Exception, Some(exception)) => {
                frame(console, format_args!("Exception: "));
                if let Err(err) = ctx.report_exception(&exception) {
                    tracing::warn!(%err, "Failed to report exception");
                }
                EvalStatus::Threw { exception }
            }
            (value, _) => EvalStatus::Completed { value },
        };
        frame(console, format_args!("\n"));

        tracing::debug!(
            source = snippet.name,
            success = status.is_success(),
            "Snippet finished"
        );
        reports.push(SnippetReport::new(snippet.name, snippet.source, status));
    }

    Ok(reports)
}

fn frame(console: &mut impl Write, args: std::fmt::Arguments<'_>) {
    let written = console.write_fmt(args).and_then(|()| console.flush());
    if let Err(err) = written {
        tracing::warn!(%err, "Console write failed");
    }
}

/// Reports as JSON lines
pub fn export_jsonl(reports: &[SnippetReport]) -> String {
    reports
        .iter()
        .filter_map(|r| serde_json::to_string(r).ok())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Print the JSON-lines report to stdout
pub fn write_report(reports: &[SnippetReport]) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", export_jsonl(reports))?;
    stdout.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use picojs_platform::MonotonicClock;
    use picojs_script_host::{CaptureBuffer, HostCapabilities, HostConfig, MemoryArena, OutputSink};

    static ARENA: MemoryArena<{ 1024 * 1024 }> = MemoryArena::new();

    #[test]
    fn fixed_sequence_runs_to_completion() {
        let output = CaptureBuffer::new();
        let caps = HostCapabilities::new(
            OutputSink::new(output.clone()),
            Rc::new(MonotonicClock::new()),
        );
        let mut ctx = ScriptContext::create(&ARENA, caps, HostConfig::default()).unwrap();
        let mut console = output.clone();

        let reports = run_snippets(&mut ctx, SNIPPETS, &mut console).unwrap();
        ctx.destroy().unwrap();

        assert_eq!(reports.len(), SNIPPETS.len());
        let failed: Vec<_> = reports
            .iter()
            .filter(|r| !r.status.is_success())
            .map(|r| r.source_name.as_str())
            .collect();
        assert_eq!(failed, ["test8.js"]);

        let text = output.contents();
        assert!(text.contains("Test 1: print('Hello from PicoJS!')\nHello from PicoJS!\n"));
        assert!(text.contains("Test 2: print(123)\n123\n"));
        assert!(text.contains("Test 3: print(10 + 20)\n30\n"));
        assert!(text.contains("Test 5: print('a' + 'b')\nab\n"));
        assert!(text.contains("x is 1\n"));
        assert!(text.contains("Exception: TypeError: load() not supported"));

        let jsonl = export_jsonl(&reports);
        assert_eq!(jsonl.lines().count(), SNIPPETS.len());
        assert!(jsonl.contains("\"status\":\"threw\""));
    }
}
