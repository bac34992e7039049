// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - polling backends for completions
//! - arming retry and rate-limit timers
//! - watching the cancellation token
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, or processes.

use std::time::Instant;

use tracing::debug;

use crate::dag::Scheduler;
use crate::engine::event_handlers::{
    handle_cancel, handle_rate_window, handle_retry_due, handle_task_completion, pump_dispatch,
    CoreCommand, CoreStep, DispatchGate,
};
use crate::engine::rate::RateLimiter;
use crate::engine::RuntimeEvent;
use crate::report::JobResult;

/// Pure core runtime state.
///
/// This owns:
/// - the DAG scheduler
/// - the rate limiter and its pending wake-up
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    gate: DispatchGate,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler, rate: Option<RateLimiter>) -> Self {
        Self {
            scheduler,
            gate: DispatchGate {
                rate,
                wake_at: None,
            },
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    /// Initial dispatch of the job's roots.
    pub fn start(&mut self, now: Instant) -> CoreStep {
        let commands = pump_dispatch(&mut self.scheduler, &mut self.gate, now);
        self.finish_step(commands)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent, now: Instant) -> CoreStep {
        debug!(?event, "core handling event");
        let commands = match event {
            RuntimeEvent::TaskCompleted(completion) => {
                handle_task_completion(&mut self.scheduler, &mut self.gate, completion, now)
            }
            RuntimeEvent::RetryDue { task_id } => {
                handle_retry_due(&mut self.scheduler, &mut self.gate, &task_id, now)
            }
            RuntimeEvent::RateWindowOpened => {
                handle_rate_window(&mut self.scheduler, &mut self.gate, now)
            }
            RuntimeEvent::CancelRequested => handle_cancel(&mut self.scheduler, now),
        };
        self.finish_step(commands)
    }

    fn finish_step(&self, commands: Vec<CoreCommand>) -> CoreStep {
        CoreStep {
            commands,
            finished: self.scheduler.is_finished(),
        }
    }

    pub fn into_result(self, now: Instant) -> JobResult {
        self.scheduler.into_result(now)
    }
}
