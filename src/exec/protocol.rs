// src/exec/protocol.rs

//! Wire format between the pool and its worker processes.
//!
//! One JSON object per line in each direction. The parent writes a
//! [`WorkerRequest`] to the worker's stdin and reads exactly one
//! [`WorkerReply`] back from its stdout before sending the next request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Result, TaskError};
use crate::exec::action::ActionRef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub task_id: String,
    pub attempt: u32,
    pub action: ActionRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReply {
    pub task_id: String,
    pub attempt: u32,
    #[serde(flatten)]
    pub body: ReplyBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReplyBody {
    Ok { output: Value },
    Err { message: String },
}

impl ReplyBody {
    pub fn into_outcome(self) -> std::result::Result<Value, TaskError> {
        match self {
            ReplyBody::Ok { output } => Ok(output),
            ReplyBody::Err { message } => Err(TaskError::action(message)),
        }
    }
}

impl WorkerReply {
    /// Whether this reply answers `request`.
    pub fn answers(&self, request: &WorkerRequest) -> bool {
        self.task_id == request.task_id && self.attempt == request.attempt
    }
}

/// Serialize `msg` as a single newline-terminated line.
pub fn encode_line<T: Serialize>(msg: &T) -> Result<String> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    Ok(line)
}

pub fn decode_line<'a, T: Deserialize<'a>>(line: &'a str) -> Result<T> {
    Ok(serde_json::from_str(line.trim_end())?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reply_status_is_flattened_into_the_line() {
        let reply = WorkerReply {
            task_id: "a".into(),
            attempt: 2,
            body: ReplyBody::Err {
                message: "boom".into(),
            },
        };
        let line = encode_line(&reply).unwrap();
        assert!(line.ends_with('\n'));

        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(
            value,
            json!({"task_id": "a", "attempt": 2, "status": "err", "message": "boom"})
        );
        assert_eq!(decode_line::<WorkerReply>(&line).unwrap(), reply);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(decode_line::<WorkerReply>("not json").is_err());
        assert!(decode_line::<WorkerReply>(r#"{"task_id":"a"}"#).is_err());
    }

    #[test]
    fn request_input_defaults_to_null() {
        let req: WorkerRequest =
            decode_line(r#"{"task_id":"a","attempt":1,"action":{"name":"noop"}}"#).unwrap();
        assert_eq!(req.action, ActionRef::named("noop"));
    }
}
