//! Evaluation reports (host → operator)

use serde::{Deserialize, Serialize};

use crate::{RunId, ScriptException, ScriptValue};

/// Outcome of evaluating one source unit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EvalStatus {
    Completed { value: ScriptValue },
    Threw { exception: ScriptException },
}

impl EvalStatus {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Report for a single snippet run by the driver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnippetReport {
    pub run_id: RunId,
    pub source_name: String,
    pub source: String,
    #[serde(flatten)]
    pub status: EvalStatus,
}

impl SnippetReport {
    #[must_use]
    pub fn new(source_name: impl Into<String>, source: impl Into<String>, status: EvalStatus) -> Self {
        Self {
            run_id: RunId::new(),
            source_name: source_name.into(),
            source: source.into(),
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExceptionKind;

    #[test]
    fn completed_report_serialization() {
        let report = SnippetReport::new(
            "test3.js",
            "10 + 20",
            EvalStatus::Completed {
                value: ScriptValue::Number(30.0),
            },
        );
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"status\":\"completed\""));
        assert!(json.contains("test3.js"));
        assert!(report.status.is_success());
    }

    #[test]
    fn threw_report_serialization() {
        let report = SnippetReport::new(
            "gate.js",
            "load('x')",
            EvalStatus::Threw {
                exception: ScriptException {
                    kind: ExceptionKind::TypeError,
                    name: "TypeError".into(),
                    message: "load() not supported: no filesystem on this target".into(),
                    stack: None,
                    source_name: "gate.js".into(),
                    rendered: "TypeError: load() not supported".into(),
                },
            },
        );
        let json = serde_json::to_string_pretty(&report).unwrap();
        assert!(json.contains("threw"));
        assert!(json.contains("type_error"));
        assert!(!json.contains("stack"));

        let parsed: SnippetReport = serde_json::from_str(&json).unwrap();
        match parsed.status {
            EvalStatus::Threw { exception } => assert!(exception.is_capability_unsupported()),
            EvalStatus::Completed { .. } => panic!("Wrong status"),
        }
    }
}
