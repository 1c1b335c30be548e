//! One client-side conversation with a debug adapter
//!
//! A [`Session`] issues sequence numbers, correlates responses with the
//! requests that caused them, keeps an append-only log of adapter events,
//! and owns the adapter process and transport. Inbound traffic is handled by
//! a dispatch task so the transport's reader never waits on consumers.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicI64, Ordering},
        Arc, Weak,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use serde::Serialize;
use serde_json::Value;
use tokio::{
    process::Child,
    sync::{mpsc, oneshot, watch, Mutex, RwLock},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    protocol::{commands, events},
    status::{infer_status, Lifecycle, StatusReport},
    transport::{Transport, TransportEvent},
    DapError, ProtocolMessage, Request, Response, Result,
};

pub type SessionId = u64;

type ResponseSender = oneshot::Sender<Result<Value>>;

struct PendingRequest {
    command: String,
    tx: ResponseSender,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggedEvent {
    pub index: usize,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventPage {
    pub events: Vec<LoggedEvent>,
    /// Ordinal to pass as `since` on the next read.
    pub next: usize,
    pub total: usize,
}

/// Append-only event log with cursors maintained on append, so status
/// inference never rescans the whole history.
#[derive(Debug, Default)]
pub struct EventLog {
    entries: Vec<LoggedEvent>,
    last_stopped: Option<usize>,
    last_continued: Option<usize>,
    first_terminated: Option<usize>,
    last_exited: Option<usize>,
    continue_marker: Option<usize>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and return its ordinal.
    pub fn push(&mut self, event: impl Into<String>, body: Option<Value>) -> usize {
        let index = self.entries.len();
        let event = event.into();

        match event.as_str() {
            events::STOPPED => self.last_stopped = Some(index),
            events::CONTINUED => self.last_continued = Some(index),
            events::TERMINATED => {
                self.first_terminated.get_or_insert(index);
            }
            events::EXITED => self.last_exited = Some(index),
            _ => {}
        }

        self.entries.push(LoggedEvent {
            index,
            event,
            body,
            timestamp_ms: timestamp_millis(),
        });
        index
    }

    /// Record that a resume command is being issued now.
    pub fn mark_continue(&mut self) {
        self.continue_marker = Some(self.entries.len());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&LoggedEvent> {
        self.entries.get(index)
    }

    pub fn last_stopped(&self) -> Option<&LoggedEvent> {
        self.last_stopped.and_then(|i| self.entries.get(i))
    }

    pub fn last_continued_index(&self) -> Option<usize> {
        self.last_continued
    }

    pub fn first_terminated_index(&self) -> Option<usize> {
        self.first_terminated
    }

    pub fn last_exited(&self) -> Option<&LoggedEvent> {
        self.last_exited.and_then(|i| self.entries.get(i))
    }

    pub fn continue_marker(&self) -> Option<usize> {
        self.continue_marker
    }

    pub fn page(&self, since: usize, limit: usize) -> EventPage {
        let start = since.min(self.entries.len());
        let end = start.saturating_add(limit).min(self.entries.len());
        let events = self.entries[start..end].to_vec();
        EventPage {
            next: since + events.len(),
            events,
            total: self.entries.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub timestamp_ms: u64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputPage {
    pub lines: Vec<OutputLine>,
    pub next: usize,
    pub total: usize,
}

/// Shared, append-only log of the adapter process's stdout/stderr.
///
/// Bootstrap starts capturing into one of these before any session exists;
/// the session then takes the same log, so nothing captured early is lost.
#[derive(Debug, Clone, Default)]
pub struct OutputLog {
    lines: Arc<RwLock<Vec<OutputLine>>>,
}

impl OutputLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, stream: OutputStream, text: impl Into<String>) {
        let mut lines = self.lines.write().await;
        lines.push(OutputLine {
            stream,
            timestamp_ms: timestamp_millis(),
            text: text.into(),
        });
    }

    pub async fn len(&self) -> usize {
        self.lines.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.lines.read().await.is_empty()
    }

    pub async fn page(&self, since: usize, limit: usize) -> OutputPage {
        let lines = self.lines.read().await;
        let start = since.min(lines.len());
        let end = start.saturating_add(limit).min(lines.len());
        let page = lines[start..end].to_vec();
        OutputPage {
            next: since + page.len(),
            lines: page,
            total: lines.len(),
        }
    }
}

/// Everything a session needs besides its id and transport.
#[derive(Debug, Default)]
pub struct SessionOptions {
    /// Adapter identity, e.g. `debugpy` or `lldb-dap`.
    pub adapter: String,
    pub program: String,
    pub working_directory: PathBuf,
    pub process: Option<Child>,
    pub output: OutputLog,
}

/// Response handle for a request that has been sent but not yet answered.
#[derive(Debug)]
pub struct PendingResponse {
    seq: i64,
    command: String,
    rx: oneshot::Receiver<Result<Value>>,
}

impl PendingResponse {
    pub fn seq(&self) -> i64 {
        self.seq
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Wait for the response body. No timeout is applied here.
    pub async fn wait(self) -> Result<Value> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(DapError::SessionClosed {
                command: self.command,
            }),
        }
    }
}

pub struct Session {
    id: SessionId,
    adapter: String,
    program: String,
    working_directory: PathBuf,
    created_at_ms: u64,
    transport: Transport,
    next_seq: AtomicI64,
    pending: Mutex<HashMap<i64, PendingRequest>>,
    events: RwLock<EventLog>,
    events_tx: watch::Sender<usize>,
    started: AtomicBool,
    disconnected: AtomicBool,
    closed: AtomicBool,
    process: Mutex<Option<Child>>,
    pid: Option<u32>,
    output: OutputLog,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("adapter", &self.adapter)
            .field("program", &self.program)
            .field("transport", &self.transport)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Wrap a connected transport. Must be called inside a tokio runtime:
    /// the inbound dispatch task is spawned here.
    pub fn new(
        id: SessionId,
        transport: Transport,
        inbound: mpsc::UnboundedReceiver<TransportEvent>,
        options: SessionOptions,
    ) -> Arc<Self> {
        let (events_tx, _) = watch::channel(0);
        let pid = options.process.as_ref().and_then(Child::id);

        let session = Arc::new(Self {
            id,
            adapter: options.adapter,
            program: options.program,
            working_directory: options.working_directory,
            created_at_ms: timestamp_millis(),
            transport,
            next_seq: AtomicI64::new(1),
            pending: Mutex::new(HashMap::new()),
            events: RwLock::new(EventLog::new()),
            events_tx,
            started: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            process: Mutex::new(options.process),
            pid,
            output: options.output,
            dispatch_task: Mutex::new(None),
        });

        let task = tokio::spawn(dispatch_loop(Arc::downgrade(&session), inbound));
        if let Ok(mut slot) = session.dispatch_task.try_lock() {
            *slot = Some(task);
        }

        info!(session = id, adapter = %session.adapter, "DAP session created");
        session
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn adapter(&self) -> &str {
        &self.adapter
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn output(&self) -> &OutputLog {
        &self.output
    }

    /// Relative breakpoint paths are taken relative to the launch directory.
    pub fn resolve_source_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_directory.join(path)
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle {
            started: self.is_started(),
            disconnected: self.is_disconnected(),
        }
    }

    /// Observe the event count; bumped on every append.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.events_tx.subscribe()
    }

    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Send a request and wait for its response body (`Value::Null` when
    /// the adapter sent none).
    pub async fn request(&self, command: &str, arguments: Option<Value>) -> Result<Value> {
        self.begin_request(command, arguments).await?.wait().await
    }

    /// Send a request without waiting; the returned handle resolves later.
    pub async fn begin_request(
        &self,
        command: &str,
        arguments: Option<Value>,
    ) -> Result<PendingResponse> {
        if self.is_closed() || self.is_disconnected() {
            return Err(DapError::SessionClosed {
                command: command.to_string(),
            });
        }

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        if commands::is_resume(command) {
            self.events.write().await.mark_continue();
        }

        let (tx, rx) = oneshot::channel();
        self.register_pending(seq, command, tx).await?;

        debug!(session = self.id, seq, command, "Sending DAP request");
        let message = ProtocolMessage::Request(Request::new(seq, command, arguments));
        if let Err(e) = self.transport.send(&message).await {
            self.pending.lock().await.remove(&seq);
            return Err(e);
        }

        Ok(PendingResponse {
            seq,
            command: command.to_string(),
            rx,
        })
    }

    /// The exit handler drains `pending` under the same lock, so the state
    /// check has to happen while holding it.
    async fn register_pending(&self, seq: i64, command: &str, tx: ResponseSender) -> Result<()> {
        let mut pending = self.pending.lock().await;
        if self.is_closed() || self.is_disconnected() {
            return Err(DapError::SessionClosed {
                command: command.to_string(),
            });
        }
        pending.insert(
            seq,
            PendingRequest {
                command: command.to_string(),
                tx,
            },
        );
        Ok(())
    }

    /// Send `configurationDone`, letting the debuggee run. Marks the session
    /// started once the adapter acknowledges.
    pub async fn begin_execution(&self) -> Result<Value> {
        self.events.write().await.mark_continue();
        let body = self
            .request(commands::CONFIGURATION_DONE, Some(Value::Object(Default::default())))
            .await?;
        self.mark_started();
        Ok(body)
    }

    pub fn mark_started(&self) {
        if !self.started.swap(true, Ordering::SeqCst) {
            info!(session = self.id, "Debuggee execution started");
        }
    }

    /// Record a resume issued outside [`Session::request`].
    pub async fn mark_continue(&self) {
        self.events.write().await.mark_continue();
    }

    /// Page through the event log. Non-consuming; repeated calls with the
    /// same arguments return the same page until new events arrive.
    pub async fn read_events(&self, since: usize, limit: usize) -> EventPage {
        self.events.read().await.page(since, limit)
    }

    pub async fn read_output(&self, since: usize, limit: usize) -> OutputPage {
        self.output.page(since, limit).await
    }

    pub async fn status(&self) -> StatusReport {
        let log = self.events.read().await;
        infer_status(&log, self.lifecycle())
    }

    /// True once the adapter process has exited (or was never owned).
    pub async fn process_exited(&self) -> bool {
        let mut process = self.process.lock().await;
        match process.as_mut() {
            Some(child) => child.try_wait().unwrap_or(None).is_some(),
            None => true,
        }
    }

    /// Kill the adapter process, close the transport and fail every
    /// outstanding request. Safe to call more than once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(session = self.id, "Closing DAP session");

        if let Some(mut child) = self.process.lock().await.take() {
            match child.kill().await {
                Ok(()) => debug!(session = self.id, "Adapter process killed"),
                Err(e) => warn!(session = self.id, "Failed to kill adapter process: {}", e),
            }
        }

        self.transport.close().await;
        self.disconnected.store(true, Ordering::SeqCst);
        self.reject_pending().await;

        if let Some(task) = self.dispatch_task.lock().await.take() {
            task.abort();
        }
        self.events_tx.send_modify(|_| {});
    }

    async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                debug!(session = self.id, peer = self.transport.peer(), "Transport connected");
            }
            TransportEvent::Message(ProtocolMessage::Response(response)) => {
                self.handle_response(response).await;
            }
            TransportEvent::Message(ProtocolMessage::Event(event)) => {
                let count = {
                    let mut log = self.events.write().await;
                    log.push(event.event, event.body);
                    log.len()
                };
                self.events_tx.send_replace(count);
            }
            TransportEvent::Message(ProtocolMessage::Request(request)) => {
                debug!(
                    session = self.id,
                    command = %request.command,
                    "Ignoring reverse request from adapter"
                );
            }
            TransportEvent::DecodeError(e) => {
                debug!(session = self.id, "Frame dropped: {}", e);
            }
            TransportEvent::Exited { error } => {
                self.handle_exit(error).await;
            }
        }
    }

    async fn handle_response(&self, response: Response) {
        let Some(pending) = self.pending.lock().await.remove(&response.request_seq) else {
            warn!(
                session = self.id,
                request_seq = response.request_seq,
                command = %response.command,
                "Dropping response for unknown request"
            );
            return;
        };

        let result = if response.success {
            Ok(response.body.unwrap_or(Value::Null))
        } else {
            let message = response
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("{} request failed", pending.command));
            Err(DapError::adapter(pending.command, message))
        };

        if pending.tx.send(result).is_err() {
            debug!(
                session = self.id,
                request_seq = response.request_seq,
                "Response arrived after caller gave up"
            );
        }
    }

    async fn handle_exit(&self, error: Option<String>) {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return;
        }
        match &error {
            Some(e) => warn!(session = self.id, "Adapter connection lost: {}", e),
            None => info!(session = self.id, "Adapter closed the connection"),
        }
        self.reject_pending().await;
        self.events_tx.send_modify(|_| {});
    }

    async fn reject_pending(&self) {
        let drained: Vec<PendingRequest> = {
            let mut pending = self.pending.lock().await;
            pending.drain().map(|(_, p)| p).collect()
        };
        if !drained.is_empty() {
            debug!(session = self.id, count = drained.len(), "Rejecting outstanding requests");
        }
        for p in drained {
            let _ = p.tx.send(Err(DapError::SessionClosed { command: p.command }));
        }
    }
}

async fn dispatch_loop(
    session: Weak<Session>,
    mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = inbound.recv().await {
        let Some(session) = session.upgrade() else {
            return;
        };
        session.handle_transport_event(event).await;
    }

    if let Some(session) = session.upgrade() {
        session
            .handle_exit(Some("transport channel closed".to_string()))
            .await;
    }
}

pub(crate) fn timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::status::RunState;
    use serde_json::json;

    #[tokio::test]
    async fn sequence_numbers_start_at_one_and_increase() {
        let (session, mut peer) = in_memory_session(1);

        let first = session.begin_request("threads", None).await.unwrap();
        let second = session.begin_request("threads", None).await.unwrap();
        assert_eq!(first.seq(), 1);
        assert_eq!(second.seq(), 2);

        assert_eq!(peer.next_request().await.seq, 1);
        assert_eq!(peer.next_request().await.seq, 2);
    }

    #[tokio::test]
    async fn responses_route_by_request_seq_regardless_of_order() {
        let (session, mut peer) = in_memory_session(1);

        let a = session.begin_request("evaluate", Some(json!({"expression": "a"}))).await.unwrap();
        let b = session.begin_request("evaluate", Some(json!({"expression": "b"}))).await.unwrap();
        let c = session.begin_request("evaluate", Some(json!({"expression": "c"}))).await.unwrap();

        let mut requests = Vec::new();
        for _ in 0..3 {
            requests.push(peer.next_request().await);
        }

        // Answer in reverse order, echoing the expression back.
        for request in requests.iter().rev() {
            let expr = request.arguments.as_ref().unwrap()["expression"].clone();
            peer.respond(request, Some(json!({ "result": expr }))).await;
        }

        assert_eq!(a.wait().await.unwrap()["result"], "a");
        assert_eq!(b.wait().await.unwrap()["result"], "b");
        assert_eq!(c.wait().await.unwrap()["result"], "c");
        assert_eq!(session.pending_count().await, 0);
    }

    #[tokio::test]
    async fn unmatched_response_is_dropped_without_disturbing_pending() {
        let (session, mut peer) = in_memory_session(1);

        let pending = session.begin_request("threads", None).await.unwrap();
        let request = peer.next_request().await;

        let stray = Request::new(999, "threads", None);
        peer.respond(&stray, Some(json!({"threads": []}))).await;
        peer.respond(&request, Some(json!({"threads": [{"id": 1, "name": "main"}]})))
            .await;

        let body = pending.wait().await.unwrap();
        assert_eq!(body["threads"][0]["name"], "main");
    }

    #[tokio::test]
    async fn failed_response_carries_adapter_message_or_fallback() {
        let (session, mut peer) = in_memory_session(1);

        let with_message = session.begin_request("evaluate", None).await.unwrap();
        let without_message = session.begin_request("scopes", None).await.unwrap();
        let first = peer.next_request().await;
        let second = peer.next_request().await;
        peer.fail(&first, Some("name 'x' is not defined")).await;
        peer.fail(&second, None).await;

        match with_message.wait().await {
            Err(DapError::Adapter { command, message }) => {
                assert_eq!(command, "evaluate");
                assert_eq!(message, "name 'x' is not defined");
            }
            other => panic!("unexpected: {other:?}"),
        }
        let err = without_message.wait().await.unwrap_err();
        assert!(err.to_string().contains("scopes request failed"), "unexpected: {err}");
    }

    #[tokio::test]
    async fn missing_body_resolves_to_null() {
        let (session, mut peer) = in_memory_session(1);
        let pending = session.begin_request("pause", Some(json!({"threadId": 1}))).await.unwrap();
        let request = peer.next_request().await;
        peer.respond(&request, None).await;
        assert_eq!(pending.wait().await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn events_are_logged_in_order_and_paging_is_idempotent() {
        let (session, mut peer) = in_memory_session(1);
        for name in ["initialized", "output", "stopped", "continued"] {
            peer.event(name, Some(json!({ "name": name }))).await;
        }
        wait_for_events(&session, 4).await;

        let page = session.read_events(1, 2).await;
        assert_eq!(page.next, 3);
        assert_eq!(page.total, 4);
        let names: Vec<_> = page.events.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(names, vec!["output", "stopped"]);
        assert_eq!(page.events[0].index, 1);

        assert_eq!(session.read_events(1, 2).await, page);

        let tail = session.read_events(3, 10).await;
        assert_eq!(tail.events.len(), 1);
        assert_eq!(tail.next, 4);

        let past_end = session.read_events(10, 5).await;
        assert!(past_end.events.is_empty());
        assert_eq!(past_end.next, 10);
    }

    #[tokio::test]
    async fn resume_commands_record_continue_marker() {
        let (session, mut peer) = in_memory_session(1);
        peer.event("stopped", Some(json!({"reason": "breakpoint", "threadId": 1}))).await;
        wait_for_events(&session, 1).await;
        assert_eq!(session.status().await.state, RunState::Stopped);

        let _continue = session
            .begin_request("continue", Some(json!({"threadId": 1})))
            .await
            .unwrap();
        assert_eq!(session.events.read().await.continue_marker(), Some(1));
        assert_eq!(session.status().await.state, RunState::Running);

        let _stack = session.begin_request("stackTrace", None).await.unwrap();
        assert_eq!(session.events.read().await.continue_marker(), Some(1));
    }

    #[tokio::test]
    async fn begin_execution_marks_started() {
        let (session, mut peer) = in_memory_session(1);
        assert_eq!(session.status().await.state, RunState::NotStarted);

        let task = {
            let session = session.clone();
            tokio::spawn(async move { session.begin_execution().await })
        };
        let request = peer.next_request().await;
        assert_eq!(request.command, "configurationDone");
        peer.respond(&request, None).await;

        task.await.unwrap().unwrap();
        assert!(session.is_started());
        assert_eq!(session.status().await.state, RunState::Running);
    }

    #[tokio::test]
    async fn close_rejects_pending_and_is_idempotent() {
        let (session, mut peer) = in_memory_session(1);
        let pending = session.begin_request("threads", None).await.unwrap();
        let _ = peer.next_request().await;

        session.close().await;
        session.close().await;

        assert!(matches!(
            pending.wait().await,
            Err(DapError::SessionClosed { command }) if command == "threads"
        ));
        assert!(session.is_closed());
        assert!(matches!(
            session.request("threads", None).await,
            Err(DapError::SessionClosed { .. })
        ));
        assert_eq!(session.status().await.state, RunState::Disconnected);
    }

    #[tokio::test]
    async fn pending_is_not_registered_after_disconnect() {
        let (session, _peer) = in_memory_session(1);
        session.disconnected.store(true, Ordering::SeqCst);
        session.reject_pending().await;

        let (tx, rx) = oneshot::channel();
        let result = session.register_pending(7, "threads", tx).await;
        assert!(matches!(result, Err(DapError::SessionClosed { .. })));
        assert_eq!(session.pending_count().await, 0);
        assert!(rx.await.is_err(), "sender is dropped, not parked");
    }

    #[tokio::test]
    async fn adapter_hangup_marks_disconnected_and_rejects_pending() {
        let (session, mut peer) = in_memory_session(1);
        let pending = session.begin_request("threads", None).await.unwrap();
        let _ = peer.next_request().await;
        drop(peer);

        assert!(matches!(
            pending.wait().await,
            Err(DapError::SessionClosed { .. })
        ));
        assert!(session.is_disconnected());
        assert_eq!(session.status().await.state, RunState::Disconnected);
    }

    #[tokio::test]
    async fn relative_source_paths_resolve_against_working_directory() {
        let (session, _peer) = in_memory_session(1);
        assert_eq!(
            session.resolve_source_path("src/main.rs"),
            PathBuf::from("/work/project/src/main.rs")
        );
        assert_eq!(
            session.resolve_source_path("/abs/file.py"),
            PathBuf::from("/abs/file.py")
        );
    }

    #[tokio::test]
    async fn output_log_pages_like_event_log() {
        let log = OutputLog::new();
        log.push(OutputStream::Stdout, "one").await;
        log.push(OutputStream::Stderr, "two").await;
        log.push(OutputStream::Stdout, "three").await;

        let page = log.page(1, 5).await;
        assert_eq!(page.next, 3);
        assert_eq!(page.total, 3);
        assert_eq!(page.lines[0].stream, OutputStream::Stderr);
        assert_eq!(page.lines[1].text, "three");
    }

    #[test]
    fn event_log_cursors_track_latest_and_first_terminated() {
        let mut log = EventLog::new();
        log.push("stopped", None);
        log.push("terminated", None);
        log.push("continued", None);
        log.push("stopped", None);
        log.push("terminated", None);

        assert_eq!(log.last_stopped().map(|e| e.index), Some(3));
        assert_eq!(log.last_continued_index(), Some(2));
        assert_eq!(log.first_terminated_index(), Some(1));
        assert_eq!(log.len(), 5);
    }
}
