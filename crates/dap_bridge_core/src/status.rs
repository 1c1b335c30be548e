//! Run/stop status derived from the event log
//!
//! DAP never reports a "current state"; it only emits `stopped`,
//! `continued`, `terminated` and `exited`. The state is reconstructed from
//! the ordinals of those events and the continue marker the session records
//! whenever a resume command goes out.

use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::session::{EventLog, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Running,
    Stopped,
    Terminated,
    Disconnected,
}

impl RunState {
    /// States a "wait until stopped" call returns on.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Stopped | Self::Terminated | Self::Disconnected)
    }
}

/// Session flags that are not part of the event log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lifecycle {
    pub started: bool,
    pub disconnected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hit_breakpoint_ids: Vec<i64>,
    /// Ordinal of the `stopped` event the report was built from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_event_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    pub event_count: usize,
}

impl StatusReport {
    fn bare(state: RunState, log: &EventLog) -> Self {
        Self {
            state,
            reason: None,
            description: None,
            thread_id: None,
            hit_breakpoint_ids: Vec::new(),
            stopped_event_index: None,
            exit_code: log
                .last_exited()
                .and_then(|e| e.body.as_ref())
                .and_then(|body| body.get("exitCode"))
                .and_then(Value::as_i64),
            event_count: log.len(),
        }
    }
}

pub fn infer_status(log: &EventLog, lifecycle: Lifecycle) -> StatusReport {
    if log.first_terminated_index().is_some() {
        return StatusReport::bare(RunState::Terminated, log);
    }
    if lifecycle.disconnected {
        return StatusReport::bare(RunState::Disconnected, log);
    }

    let marker = log.continue_marker();
    let stopped = log.last_stopped();

    if let (Some(marker), Some(stopped)) = (marker, stopped) {
        if marker > stopped.index {
            return StatusReport::bare(RunState::Running, log);
        }
    }

    if let Some(stopped) = stopped {
        let after_continue = log
            .last_continued_index()
            .map_or(true, |continued| stopped.index > continued);
        if after_continue {
            let body = stopped.body.as_ref();
            let field = |name: &str| body.and_then(|b| b.get(name));
            return StatusReport {
                reason: field("reason").and_then(Value::as_str).map(str::to_string),
                description: field("description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                thread_id: field("threadId").and_then(Value::as_i64),
                hit_breakpoint_ids: field("hitBreakpointIds")
                    .and_then(Value::as_array)
                    .map(|ids| ids.iter().filter_map(Value::as_i64).collect())
                    .unwrap_or_default(),
                stopped_event_index: Some(stopped.index),
                ..StatusReport::bare(RunState::Stopped, log)
            };
        }
    }

    if !lifecycle.started && marker.is_none() {
        StatusReport::bare(RunState::NotStarted, log)
    } else {
        StatusReport::bare(RunState::Running, log)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaitOutcome {
    pub status: StatusReport,
    pub elapsed_ms: u64,
    pub already_stopped: bool,
    pub timed_out: bool,
}

/// Poll the session's status until it stops, terminates or disconnects, or
/// until `wait_timeout` elapses. Wakes early whenever a new event is logged.
/// Dropping the future only ends the polling; in-flight requests are untouched.
pub async fn wait_until_stopped(
    session: &Session,
    wait_timeout: Duration,
    poll_interval: Duration,
) -> WaitOutcome {
    let status = session.status().await;
    if status.state.is_settled() {
        return WaitOutcome {
            status,
            elapsed_ms: 0,
            already_stopped: true,
            timed_out: false,
        };
    }

    let started_at = Instant::now();
    let mut events = session.subscribe();
    loop {
        let elapsed = started_at.elapsed();
        if elapsed >= wait_timeout {
            debug!(session = session.id(), "Timed out waiting for stop");
            return WaitOutcome {
                status: session.status().await,
                elapsed_ms: elapsed.as_millis() as u64,
                already_stopped: false,
                timed_out: true,
            };
        }

        let wake = poll_interval.min(wait_timeout - elapsed);
        if let Ok(Err(_)) = timeout(wake, events.changed()).await {
            sleep(wake).await;
        }

        let status = session.status().await;
        if status.state.is_settled() {
            return WaitOutcome {
                status,
                elapsed_ms: started_at.elapsed().as_millis() as u64,
                already_stopped: false,
                timed_out: false,
            };
        }
    }
}
