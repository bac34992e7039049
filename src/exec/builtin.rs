// src/exec/builtin.rs

//! Built-in actions, mostly useful for demos, smoke tests and exercising the
//! scheduler itself.
//!
//! | name    | input                  | behaviour                                        |
//! |---------|------------------------|--------------------------------------------------|
//! | `noop`  | `{ value? }`           | returns `value`, or the task id                  |
//! | `sleep` | `{ seconds }`          | awaits a timer                                   |
//! | `cpu`   | `{ work? }`            | busy loop of `work` iterations (default 100000)  |
//! | `fail`  | `{ message? }`         | always fails                                     |
//! | `flaky` | `{ fail_until? }`      | fails while `attempt <= fail_until` (default 1)  |
//! | `crash` | `{ message? }`         | panics; kills an isolated worker                 |

use std::time::Duration;

use serde_json::{Value, json};

use crate::exec::action::{ActionContext, ActionError, ActionRegistry};

const MODULUS: u64 = 1_000_000_007;
/// Iterations between yields in `cpu`, so a cooperative run stays cancellable.
const CPU_YIELD_EVERY: u64 = 16_384;

pub(crate) fn register_all(registry: &mut ActionRegistry) {
    registry
        .register("noop", noop)
        .register("sleep", sleep)
        .register("cpu", cpu)
        .register("fail", fail)
        .register("flaky", flaky)
        .register("crash", crash);
}

async fn noop(ctx: ActionContext) -> Result<Value, ActionError> {
    match ctx.input.get("value") {
        Some(value) => Ok(value.clone()),
        None => Ok(Value::String(ctx.task_id)),
    }
}

async fn sleep(ctx: ActionContext) -> Result<Value, ActionError> {
    let seconds = f64_field(&ctx.input, &["seconds", "s"])?.unwrap_or(0.0);
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(ActionError::InvalidInput(format!(
            "sleep seconds must be a non-negative number (got {seconds})"
        )));
    }

    let duration = Duration::try_from_secs_f64(seconds)
        .map_err(|e| ActionError::InvalidInput(format!("sleep seconds out of range: {e}")))?;
    tokio::time::sleep(duration).await;
    Ok(Value::String(format!("slept:{seconds}")))
}

async fn cpu(ctx: ActionContext) -> Result<Value, ActionError> {
    let work = u64_field(&ctx.input, "work")?.unwrap_or(100_000);

    let mut sum: u64 = 0;
    for i in 0..work {
        sum = (sum + i) % MODULUS;
        if i % CPU_YIELD_EVERY == CPU_YIELD_EVERY - 1 {
            tokio::task::yield_now().await;
        }
    }
    Ok(json!(sum))
}

async fn fail(ctx: ActionContext) -> Result<Value, ActionError> {
    let message = ctx
        .input
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("intentional failure");
    Err(ActionError::Failed(message.to_string()))
}

async fn flaky(ctx: ActionContext) -> Result<Value, ActionError> {
    let fail_until = u64_field(&ctx.input, "fail_until")?.unwrap_or(1);
    if u64::from(ctx.attempt) <= fail_until {
        return Err(ActionError::Failed(format!(
            "flaky failing attempt {} <= {}",
            ctx.attempt, fail_until
        )));
    }
    Ok(Value::String(format!("flaky_ok_after_{}", ctx.attempt)))
}

async fn crash(ctx: ActionContext) -> Result<Value, ActionError> {
    let message = ctx
        .input
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("crash action invoked")
        .to_string();
    panic!("{message}");
}

fn f64_field(input: &Value, keys: &[&str]) -> Result<Option<f64>, ActionError> {
    for key in keys {
        if let Some(v) = input.get(*key) {
            return v
                .as_f64()
                .map(Some)
                .ok_or_else(|| ActionError::InvalidInput(format!("'{key}' must be a number")));
        }
    }
    Ok(None)
}

fn u64_field(input: &Value, key: &str) -> Result<Option<u64>, ActionError> {
    match input.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| ActionError::InvalidInput(format!("'{key}' must be a non-negative integer"))),
    }
}
