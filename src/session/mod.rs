//! `SessionManager`: extracts the Agent's conversation/session id from its
//! stream output and decides, per phase, whether to resume it.
//!
//! Tolerant JSON field extraction with an ordered fallback chain down to a
//! regex scrape for the rare case where the last line isn't well-formed
//! JSON at all.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::state::WorkflowState;

fn session_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""session_id"\s*:\s*"([^"]+)"|session_id:\s*([A-Za-z0-9_-]+)"#).unwrap()
    })
}

/// Ordered rules: `result.session_id` > `system.init.session_id` > regex
/// fallback > empty.
pub fn parse_session_id(output: &str) -> String {
    let mut init_session_id: Option<String> = None;

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        let ty = value.get("type").and_then(Value::as_str);
        if ty == Some("result") {
            if let Some(id) = value.get("session_id").and_then(Value::as_str) {
                if !id.is_empty() {
                    return id.to_string();
                }
            }
        }
        if ty == Some("system")
            && value.get("subtype").and_then(Value::as_str) == Some("init")
            && init_session_id.is_none()
        {
            if let Some(id) = value.get("session_id").and_then(Value::as_str) {
                if !id.is_empty() {
                    init_session_id = Some(id.to_string());
                }
            }
        }
    }

    if let Some(id) = init_session_id {
        return id;
    }

    if let Some(captures) = session_id_regex().captures(output) {
        if let Some(m) = captures.get(1).or_else(|| captures.get(2)) {
            return m.as_str().to_string();
        }
    }

    String::new()
}

/// Arguments to hand to `AgentExecutor`: `--resume <id>` unless the caller
/// forced a new session or there is no id to resume.
pub fn build_resume_args(session_id: Option<&str>, force_new: bool) -> Vec<String> {
    if force_new {
        return Vec::new();
    }
    match session_id {
        Some(id) if !id.is_empty() => vec!["--resume".to_string(), id.to_string()],
        _ => Vec::new(),
    }
}

/// The id (if any) the next phase should try to resume.
pub fn get_session_from_state(state: &WorkflowState) -> Option<&str> {
    state.session_id.as_deref()
}

/// Record a newly observed session id on workflow state. `is_new` marks
/// whether this replaces a prior session (vs. a continuation of it) and
/// drives `session_reuse_count`.
pub fn update_state_with_session(state: &mut WorkflowState, session_id: &str, is_new: bool) {
    if session_id.is_empty() {
        return;
    }
    if is_new || state.session_id.is_none() {
        state.session_id = Some(session_id.to_string());
        state.session_created_at = Some(chrono::Utc::now());
        state.session_reuse_count = 0;
    } else {
        state.session_id = Some(session_id.to_string());
        state.session_reuse_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{WorkflowConfigSnapshot, WorkflowType};

    fn snapshot() -> WorkflowConfigSnapshot {
        WorkflowConfigSnapshot {
            split_threshold_lines: 100,
            split_threshold_files: 10,
            split_pr_enabled: true,
            ci_fix_max_attempts: 3,
            max_attempts: 3,
        }
    }

    #[test]
    fn prefers_result_session_id_over_init() {
        let output = [
            r#"{"type":"system","subtype":"init","session_id":"init-1"}"#,
            r#"{"type":"result","session_id":"result-1"}"#,
        ]
        .join("\n");
        assert_eq!(parse_session_id(&output), "result-1");
    }

    #[test]
    fn falls_back_to_init_session_when_no_result_id() {
        let output = r#"{"type":"system","subtype":"init","session_id":"init-1"}"#.to_string();
        assert_eq!(parse_session_id(&output), "init-1");
    }

    #[test]
    fn falls_back_to_regex_when_no_json_matches() {
        let output = "garbage preamble \"session_id\":\"regex-1\" trailer".to_string();
        assert_eq!(parse_session_id(&output), "regex-1");
    }

    #[test]
    fn empty_when_nothing_matches() {
        assert_eq!(parse_session_id("no session info here"), "");
    }

    #[test]
    fn build_resume_args_respects_force_new() {
        assert!(build_resume_args(Some("abc"), true).is_empty());
        assert_eq!(
            build_resume_args(Some("abc"), false),
            vec!["--resume".to_string(), "abc".to_string()]
        );
        assert!(build_resume_args(None, false).is_empty());
    }

    #[test]
    fn update_state_increments_reuse_count_on_continuation() {
        let mut state = WorkflowState::new("demo", "d", WorkflowType::Feature, snapshot());
        update_state_with_session(&mut state, "sess-1", true);
        assert_eq!(state.session_reuse_count, 0);
        update_state_with_session(&mut state, "sess-1", false);
        assert_eq!(state.session_reuse_count, 1);
        update_state_with_session(&mut state, "sess-1", false);
        assert_eq!(state.session_reuse_count, 2);
    }
}
