//! Agent execution tracing.
//!
//! A trait-based hook surface over the interesting agent events: execution
//! context pushes and pops, job enqueue/run, throw materialization, and
//! coroutine suspend/resume. [`NoopTracer`] is the production default;
//! [`StderrTracer`] gives a human-readable event log and [`RecordingTracer`]
//! captures events for assertions and post-mortem inspection.

use serde::{Deserialize, Serialize};

use crate::agent::QueueName;

/// One traced event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceEvent {
    /// An execution context was pushed; `depth` is the stack depth after.
    ContextPush { depth: usize, kind: String },
    /// An execution context was popped; `depth` is the stack depth after.
    ContextPop { depth: usize },
    JobEnqueued { queue: QueueName, kind: String },
    JobStarted { queue: QueueName, kind: String },
    /// A throw completion was materialized.
    Throw { message: String },
    /// A coroutine suspended at `await`/`yield`.
    Suspend { kind: String },
    /// A suspended coroutine was resumed.
    Resume { kind: String },
}

/// Hook points for agent execution events.
///
/// Every method has a no-op default, so implementations override only what
/// they need.
pub trait AgentTracer: std::fmt::Debug {
    fn on_context_push(&mut self, _depth: usize, _kind: &str) {}
    fn on_context_pop(&mut self, _depth: usize) {}
    fn on_job_enqueued(&mut self, _queue: QueueName, _kind: &str) {}
    fn on_job_started(&mut self, _queue: QueueName, _kind: &str) {}
    fn on_throw(&mut self, _message: &str) {}
    fn on_suspend(&mut self, _kind: &str) {}
    fn on_resume(&mut self, _kind: &str) {}
}

/// The zero-cost default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl AgentTracer for NoopTracer {}

/// Logs every event to stderr, one line each.
#[derive(Debug, Default)]
pub struct StderrTracer;

impl AgentTracer for StderrTracer {
    fn on_context_push(&mut self, depth: usize, kind: &str) {
        eprintln!("[skua] push {kind} (depth {depth})");
    }

    fn on_context_pop(&mut self, depth: usize) {
        eprintln!("[skua] pop (depth {depth})");
    }

    fn on_job_enqueued(&mut self, queue: QueueName, kind: &str) {
        eprintln!("[skua] enqueue {queue:?} job: {kind}");
    }

    fn on_job_started(&mut self, queue: QueueName, kind: &str) {
        eprintln!("[skua] run {queue:?} job: {kind}");
    }

    fn on_throw(&mut self, message: &str) {
        eprintln!("[skua] throw: {message}");
    }

    fn on_suspend(&mut self, kind: &str) {
        eprintln!("[skua] suspend: {kind}");
    }

    fn on_resume(&mut self, kind: &str) {
        eprintln!("[skua] resume: {kind}");
    }
}

/// Records every event for later inspection.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    pub events: Vec<TraceEvent>,
}

impl AgentTracer for RecordingTracer {
    fn on_context_push(&mut self, depth: usize, kind: &str) {
        self.events.push(TraceEvent::ContextPush { depth, kind: kind.to_owned() });
    }

    fn on_context_pop(&mut self, depth: usize) {
        self.events.push(TraceEvent::ContextPop { depth });
    }

    fn on_job_enqueued(&mut self, queue: QueueName, kind: &str) {
        self.events.push(TraceEvent::JobEnqueued { queue, kind: kind.to_owned() });
    }

    fn on_job_started(&mut self, queue: QueueName, kind: &str) {
        self.events.push(TraceEvent::JobStarted { queue, kind: kind.to_owned() });
    }

    fn on_throw(&mut self, message: &str) {
        self.events.push(TraceEvent::Throw { message: message.to_owned() });
    }

    fn on_suspend(&mut self, kind: &str) {
        self.events.push(TraceEvent::Suspend { kind: kind.to_owned() });
    }

    fn on_resume(&mut self, kind: &str) {
        self.events.push(TraceEvent::Resume { kind: kind.to_owned() });
    }
}
