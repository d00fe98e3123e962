//! Crew run events
//!
//! Emitted by the runner and the agent backends while a run is in progress.
//! This is the only way adapters (the CLI, a UI) observe a live run; the
//! final `RunOutcome` carries everything else.

use serde::Serialize;
use tokio::sync::mpsc;

/// Events emitted during a crew run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrewEvent {
    // === Run Lifecycle ===
    RunStart {
        run_id: String,
        process: String,
        tasks: Vec<String>,
    },
    RunComplete {
        run_id: String,
        status: String,
    },
    /// Cancellation observed at a task boundary
    Cancelled {
        run_id: String,
    },

    // === Task Lifecycle ===
    /// The manager chose the next task
    Delegated {
        task: String,
        agent: String,
    },
    TaskStart {
        task: String,
        agent: String,
        attempt: u32,
        cycle: u32,
    },
    TaskComplete {
        task: String,
        agent: String,
        attempt: u32,
        structured: bool,
        duration_ms: u64,
    },
    TaskFailed {
        task: String,
        agent: String,
        attempt: u32,
        error: String,
    },

    // === Feedback Loop ===
    /// A validation task reported failure and another revision starts
    FeedbackCycle {
        integration: String,
        validation: String,
        cycle: u32,
    },

    // === Tool Execution ===
    ToolCallStart {
        agent: String,
        call_id: String,
        tool: String,
        arguments: serde_json::Value,
    },
    ToolCallEnd {
        agent: String,
        call_id: String,
        tool: String,
        output: String,
        is_error: bool,
        duration_ms: u64,
    },
}

/// Optional event channel. A closed or absent receiver is never an error.
#[derive(Debug, Clone, Default)]
pub struct EventSink(Option<mpsc::UnboundedSender<CrewEvent>>);

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<CrewEvent>) -> Self {
        Self(Some(tx))
    }

    /// A sink that drops everything
    pub fn none() -> Self {
        Self(None)
    }

    /// Create a sink and the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CrewEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: CrewEvent) {
        if let Some(tx) = &self.0 {
            let _ = tx.send(event);
        }
    }
}
