// src/exec/worker.rs

//! Worker side of the isolated pool.
//!
//! A worker is the `dagrun` binary started with `--worker` (or any binary
//! that calls [`serve`] with its own registry). It answers requests one at a
//! time until stdin closes. A panicking action takes the whole process down,
//! which the pool reports as a crashed attempt.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::errors::Result;
use crate::exec::action::{ActionContext, ActionRegistry};
use crate::exec::protocol::{ReplyBody, WorkerReply, WorkerRequest, decode_line, encode_line};

/// Serve requests from stdin until it is closed.
pub async fn serve(registry: ActionRegistry) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    info!(pid = std::process::id(), "worker ready");

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request: WorkerRequest = decode_line(&line)?;
        let reply = handle(&registry, request).await;

        stdout.write_all(encode_line(&reply)?.as_bytes()).await?;
        stdout.flush().await?;
    }

    info!("stdin closed; worker exiting");
    Ok(())
}

async fn handle(registry: &ActionRegistry, request: WorkerRequest) -> WorkerReply {
    let WorkerRequest {
        task_id,
        attempt,
        action,
    } = request;
    debug!(task = %task_id, attempt, action = %action.name, "worker running action");

    let ctx = ActionContext {
        task_id: task_id.clone(),
        attempt,
        input: action.input.clone(),
    };
    let body = match registry.invoke(&action, ctx).await {
        Ok(output) => ReplyBody::Ok { output },
        Err(err) => ReplyBody::Err {
            message: err.to_string(),
        },
    };

    WorkerReply {
        task_id,
        attempt,
        body,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::exec::action::ActionRef;

    #[tokio::test]
    async fn replies_carry_request_identity() {
        let registry = ActionRegistry::with_builtins();
        let reply = handle(
            &registry,
            WorkerRequest {
                task_id: "t".into(),
                attempt: 3,
                action: ActionRef::new("flaky", json!({"fail_until": 2})),
            },
        )
        .await;

        assert_eq!(reply.task_id, "t");
        assert_eq!(reply.attempt, 3);
        assert_eq!(
            reply.body,
            ReplyBody::Ok {
                output: json!("flaky_ok_after_3")
            }
        );
    }

    #[tokio::test]
    async fn action_errors_become_err_replies() {
        let registry = ActionRegistry::with_builtins();
        let reply = handle(
            &registry,
            WorkerRequest {
                task_id: "t".into(),
                attempt: 1,
                action: ActionRef::named("fail"),
            },
        )
        .await;
        assert_eq!(
            reply.body,
            ReplyBody::Err {
                message: "intentional failure".into()
            }
        );
    }
}
