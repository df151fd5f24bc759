//! Role preambles for each stage that talks to the reasoning engine.

use schemars::JsonSchema;

pub const ANALYST_PREAMBLE: &str = "You are a Kubernetes incident analyst. \
     Identify the most likely root cause from the alert and evidence. \
     Return JSON only, with no commentary.";

pub const PLANNER_PREAMBLE: &str = "You are a Kubernetes remediation planner. \
     Propose safe, reversible remediation plans. Return JSON only, with no commentary.";

pub const APPROVAL_PREAMBLE: &str = "You write clear, concise approval requests for \
     on-call operators. Keep every plan number and command exactly as given.";

pub const SUMMARY_PREAMBLE: &str = "You write short technical execution reports for an \
     operations team.";

/// JSON schema of `T`, pretty-printed for inclusion in a prompt.
pub fn response_schema<T: JsonSchema>() -> String {
    let schema = schemars::schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
