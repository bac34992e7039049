// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::time::Instant;

use tracing::{debug, info};

use crate::dag::{ScheduledTask, Scheduler, SchedulerStep, TaskId};
use crate::engine::rate::RateLimiter;
use crate::engine::TaskCompletion;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreCommand {
    /// Hand these attempts to their backends.
    Dispatch(Vec<ScheduledTask>),
    /// Emit `RetryDue` for `task_id` at `at`.
    ArmRetry { task_id: TaskId, at: Instant },
    /// Emit `RateWindowOpened` at `at`.
    ArmWake { at: Instant },
    /// Ask the backends to stop these in-flight attempts.
    Interrupt(Vec<TaskId>),
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone, Default)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Nothing is left to run or wait for.
    pub finished: bool,
}

/// Dispatch state the core keeps next to the scheduler.
#[derive(Debug, Default)]
pub struct DispatchGate {
    pub rate: Option<RateLimiter>,
    /// Pending wake-up, so only one is armed at a time.
    pub wake_at: Option<Instant>,
}

pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    gate: &mut DispatchGate,
    completion: TaskCompletion,
    now: Instant,
) -> Vec<CoreCommand> {
    let step = scheduler.complete(completion, now);
    let mut commands = step_commands(step);
    commands.extend(pump_dispatch(scheduler, gate, now));
    commands
}

pub fn handle_retry_due(
    scheduler: &mut Scheduler,
    gate: &mut DispatchGate,
    task_id: &str,
    now: Instant,
) -> Vec<CoreCommand> {
    let step = scheduler.retry_due(task_id, now);
    let mut commands = step_commands(step);
    commands.extend(pump_dispatch(scheduler, gate, now));
    commands
}

pub fn handle_rate_window(
    scheduler: &mut Scheduler,
    gate: &mut DispatchGate,
    now: Instant,
) -> Vec<CoreCommand> {
    gate.wake_at = None;
    pump_dispatch(scheduler, gate, now)
}

pub fn handle_cancel(scheduler: &mut Scheduler, now: Instant) -> Vec<CoreCommand> {
    let step = scheduler.cancel(now);
    if !step.newly_cancelled.is_empty() {
        info!(count = step.newly_cancelled.len(), "cancelled pending tasks");
    }
    step_commands(step)
}

fn step_commands(step: SchedulerStep) -> Vec<CoreCommand> {
    let mut commands = Vec::new();

    if let Some(retry) = step.retry {
        commands.push(CoreCommand::ArmRetry {
            task_id: retry.task_id,
            at: retry.at,
        });
    }
    if !step.interrupt.is_empty() {
        commands.push(CoreCommand::Interrupt(step.interrupt));
    }
    commands
}

/// Hand out everything the scheduler allows, subject to the rate limit.
///
/// When the rate window is full and work is waiting, a single wake-up is
/// armed for when the window reopens.
pub fn pump_dispatch(
    scheduler: &mut Scheduler,
    gate: &mut DispatchGate,
    now: Instant,
) -> Vec<CoreCommand> {
    let mut commands = Vec::new();
    let mut batch = Vec::new();

    while scheduler.has_dispatchable() {
        if let Some(rate) = gate.rate.as_mut()
            && !rate.try_acquire(now)
        {
            if gate.wake_at.is_none() {
                let at = rate.next_available(now);
                debug!(wait_ms = at.saturating_duration_since(now).as_millis() as u64, "rate limit reached");
                gate.wake_at = Some(at);
                commands.push(CoreCommand::ArmWake { at });
            }
            break;
        }

        match scheduler.pop_dispatchable(now) {
            Some(task) => batch.push(task),
            None => break,
        }
    }

    if !batch.is_empty() {
        commands.insert(0, CoreCommand::Dispatch(batch));
    }
    commands
}
