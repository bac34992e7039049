// src/config/actions.rs

//! Inline action descriptors given on the command line.
//!
//! ```text
//! sleep:0.05            sleep for 0.05s
//! cpu:100000            busy loop (isolated by default)
//! noop | noop:value     return value (or the task id)
//! fail | fail:msg       always fail
//! flaky:fail_until=2    fail twice, with enough retries to recover
//! crash | crash:msg     panic (isolated by default)
//! task:name=foo         noop returning "foo"
//! anything-else         noop returning the descriptor
//! ```
//!
//! Each may be followed by `;`-separated modifiers: `id=x`, `after=a,b`,
//! `timeout=S`, `retries=N`, `isolated`, `cooperative`. Ids default to
//! `job_1..job_n` by position.

use std::time::Duration;

use serde_json::{Value, json};

use crate::dag::{Job, TaskSpec};
use crate::errors::{DagrunError, Result};
use crate::exec::ActionRef;
use crate::types::ExecutionKind;

/// Id given to jobs built from inline descriptors.
pub const INLINE_JOB_ID: &str = "inline";

/// Parse every descriptor and validate the resulting job.
pub fn parse_actions<S: AsRef<str>>(descriptors: &[S]) -> Result<Job> {
    let tasks = descriptors
        .iter()
        .enumerate()
        .map(|(i, d)| parse_action(i, d.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    Ok(Job::new(INLINE_JOB_ID, tasks)?)
}

/// Parse the descriptor at position `index` (0-based).
pub fn parse_action(index: usize, descriptor: &str) -> Result<TaskSpec> {
    let descriptor = descriptor.trim().trim_matches('"');
    let mut segments = descriptor.split(';');
    let head = segments.next().unwrap_or_default().trim();
    let mut modifiers: Vec<&str> = segments.map(str::trim).filter(|s| !s.is_empty()).collect();

    let (kind, arg) = match head.split_once(':') {
        Some((kind, arg)) => (kind.trim(), Some(arg.trim())),
        None => (head, None),
    };

    let mut id = format!("job_{}", index + 1);
    let mut name: Option<String> = None;
    let mut retries: Option<u32> = None;
    let mut exec_kind = ExecutionKind::Cooperative;

    let bad = |why: String| DagrunError::ConfigError(format!("invalid action '{descriptor}': {why}"));

    let (action, input) = match (kind, arg) {
        ("sleep", Some(s)) => {
            let seconds: f64 = s.parse().map_err(|_| bad(format!("'{s}' is not a number of seconds")))?;
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(bad(format!("sleep seconds must be non-negative (got {s})")));
            }
            ("sleep", json!({ "seconds": seconds }))
        }
        ("cpu", Some(n)) => {
            let work: u64 = n.parse().map_err(|_| bad(format!("'{n}' is not an iteration count")))?;
            exec_kind = ExecutionKind::Isolated;
            ("cpu", json!({ "work": work }))
        }
        ("noop", value) => ("noop", value.map_or(Value::Null, |v| json!({ "value": v }))),
        ("fail", msg) => ("fail", msg.map_or(Value::Null, |m| json!({ "message": m }))),
        ("flaky", arg) => {
            let n = match arg {
                None => 1,
                Some(a) => {
                    let raw = a.strip_prefix("fail_until=").unwrap_or(a);
                    raw.parse::<u32>()
                        .map_err(|_| bad(format!("'{raw}' is not a failure count")))?
                }
            };
            retries = Some(n);
            ("flaky", json!({ "fail_until": n }))
        }
        ("crash", msg) => {
            exec_kind = ExecutionKind::Isolated;
            ("crash", msg.map_or(Value::Null, |m| json!({ "message": m })))
        }
        ("task", meta) => {
            if let Some(meta) = meta.filter(|m| !m.is_empty()) {
                modifiers.insert(0, meta);
            }
            ("noop", Value::Null)
        }
        _ => ("noop", json!({ "value": head })),
    };

    let mut spec_timeout: Option<Duration> = None;
    let mut after: Vec<String> = Vec::new();

    for modifier in modifiers {
        let (key, value) = match modifier.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (modifier, None),
        };
        match (key, value) {
            ("id", Some(v)) if !v.is_empty() => id = v.to_string(),
            ("name", Some(v)) if kind == "task" => name = Some(v.to_string()),
            ("after", Some(v)) => after.extend(
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            ),
            ("timeout", Some(v)) => {
                let secs: f64 = v.parse().map_err(|_| bad(format!("timeout '{v}' is not a number")))?;
                // A zero timeout means none.
                if secs > 0.0 {
                    spec_timeout = Some(
                        Duration::try_from_secs_f64(secs)
                            .map_err(|_| bad(format!("timeout '{v}' is out of range")))?,
                    );
                } else if secs < 0.0 {
                    return Err(bad(format!("timeout must be non-negative (got {v})")));
                }
            }
            ("retries", Some(v)) => {
                retries = Some(v.parse().map_err(|_| bad(format!("retries '{v}' is not a count")))?);
            }
            ("isolated", None) => exec_kind = ExecutionKind::Isolated,
            ("cooperative", None) => exec_kind = ExecutionKind::Cooperative,
            _ => return Err(bad(format!("unknown modifier '{modifier}'"))),
        }
    }

    let input = if kind == "task" {
        json!({ "value": name.unwrap_or_else(|| id.clone()) })
    } else {
        input
    };

    let mut spec = TaskSpec::new(id, ActionRef::new(action, input))
        .depends_on(after)
        .with_kind(exec_kind)
        .with_retries(retries.unwrap_or(0));
    if let Some(t) = spec_timeout {
        spec = spec.with_timeout(t);
    }
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ValidationError;

    #[test]
    fn parses_builtin_forms() {
        let sleep = parse_action(0, "sleep:0.05").unwrap();
        assert_eq!(sleep.id, "job_1");
        assert_eq!(sleep.action, ActionRef::new("sleep", json!({"seconds": 0.05})));
        assert_eq!(sleep.execution_kind, ExecutionKind::Cooperative);

        let cpu = parse_action(1, "cpu:1000").unwrap();
        assert_eq!(cpu.action.input, json!({"work": 1000}));
        assert_eq!(cpu.execution_kind, ExecutionKind::Isolated);

        let flaky = parse_action(2, "flaky:fail_until=2").unwrap();
        assert_eq!(flaky.action.input, json!({"fail_until": 2}));
        assert_eq!(flaky.max_retries, 2);

        let noop = parse_action(3, "noop:hello").unwrap();
        assert_eq!(noop.action.input, json!({"value": "hello"}));

        let bare = parse_action(4, "fail").unwrap();
        assert_eq!(bare.action, ActionRef::named("fail"));
    }

    #[test]
    fn task_form_uses_name_and_timeout() {
        let spec = parse_action(0, "task:name=foo;timeout=1").unwrap();
        assert_eq!(spec.action, ActionRef::new("noop", json!({"value": "foo"})));
        assert_eq!(spec.timeout, Some(Duration::from_secs(1)));
        assert_eq!(spec.id, "job_1");
    }

    #[test]
    fn unknown_heads_become_noops() {
        let spec = parse_action(0, "hello world").unwrap();
        assert_eq!(spec.action, ActionRef::new("noop", json!({"value": "hello world"})));
    }

    #[test]
    fn modifiers_set_ids_and_dependencies() {
        let job = parse_actions(&[
            "sleep:0.01;id=a",
            "sleep:0.01;id=b;cooperative",
            "noop;id=c;after=a,b;retries=1",
            "cpu:10;cooperative",
        ])
        .unwrap();

        let c = job.task("c").unwrap();
        assert_eq!(c.dependencies, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(c.max_retries, 1);
        assert_eq!(
            job.task("job_4").unwrap().execution_kind,
            ExecutionKind::Cooperative
        );
    }

    #[test]
    fn rejects_malformed_descriptors() {
        assert!(parse_action(0, "sleep:soon").is_err());
        assert!(parse_action(0, "cpu:-5").is_err());
        assert!(parse_action(0, "noop;frobnicate").is_err());
        assert!(parse_action(0, "noop;timeout=-1").is_err());

        let err = parse_actions(&["noop;after=ghost"]).unwrap_err();
        assert!(matches!(
            err,
            DagrunError::Validation(ValidationError::UnknownDependency { .. })
        ));
    }
}
