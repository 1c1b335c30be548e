mod source;

use std::{path::PathBuf, sync::Arc, time::Duration};

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use dap_bridge_core::{
    bootstrap, protocol::commands, wait_until_stopped, AdapterFlavor, BridgeConfig, DapError,
    LaunchRequest, Session, SessionId, SessionRegistry, SystemDiscovery,
};
use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters, ServerHandler},
    model::*,
    tool, tool_handler, tool_router, transport, ErrorData as McpError, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_PAGE_LIMIT: usize = 100;
const READ_MEMORY_MAX_COUNT: u32 = 64 * 1024;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct DebuggerStartParams {
    /// `python` or `lldb`.
    adapter: String,
    program: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    stop_on_entry: bool,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct DebuggerSessionsParams {}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct SessionParams {
    #[serde(default)]
    session_id: Option<SessionId>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct BreakpointSpec {
    /// 1-based line. Either this or `search` is required.
    #[serde(default)]
    line: Option<u32>,
    /// Text to look for; the breakpoint goes on the first matching line.
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    hit_condition: Option<String>,
    #[serde(default)]
    log_message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct DebuggerSetBreakpointsParams {
    #[serde(default)]
    session_id: Option<SessionId>,
    source_path: String,
    breakpoints: Vec<BreakpointSpec>,
    #[serde(default)]
    function_breakpoints: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct ThreadParams {
    #[serde(default)]
    session_id: Option<SessionId>,
    #[serde(default)]
    thread_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct DebuggerWaitParams {
    #[serde(default)]
    session_id: Option<SessionId>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct DebuggerStackTraceParams {
    #[serde(default)]
    session_id: Option<SessionId>,
    #[serde(default)]
    thread_id: Option<i64>,
    #[serde(default)]
    levels: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct DebuggerScopesParams {
    #[serde(default)]
    session_id: Option<SessionId>,
    frame_id: i64,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct DebuggerVariablesParams {
    #[serde(default)]
    session_id: Option<SessionId>,
    variables_reference: i64,
    #[serde(default)]
    start: Option<u32>,
    #[serde(default)]
    count: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct DebuggerEvaluateParams {
    #[serde(default)]
    session_id: Option<SessionId>,
    expression: String,
    #[serde(default)]
    frame_id: Option<i64>,
    #[serde(default)]
    context: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct DebuggerReadMemoryParams {
    #[serde(default)]
    session_id: Option<SessionId>,
    memory_reference: String,
    #[serde(default)]
    offset: i64,
    count: u32,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct PageParams {
    #[serde(default)]
    session_id: Option<SessionId>,
    #[serde(default)]
    since: usize,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct DebuggerTerminateParams {
    #[serde(default)]
    session_id: Option<SessionId>,
    #[serde(default = "default_true")]
    terminate_debuggee: bool,
}

fn default_true() -> bool {
    true
}

fn to_mcp_error(message: impl Into<String>) -> McpError {
    McpError::internal_error(message.into(), None)
}

fn dap_error(err: DapError) -> McpError {
    if err.is_invalid_input() {
        McpError::invalid_params(err.to_string(), None)
    } else {
        to_mcp_error(err.to_string())
    }
}

/// The session layer applies no timeout, so every tool call bounds its own.
async fn call(session: &Session, command: &str, arguments: Value) -> Result<Value, McpError> {
    match timeout(REQUEST_TIMEOUT, session.request(command, Some(arguments))).await {
        Ok(result) => result.map_err(dap_error),
        Err(_) => Err(to_mcp_error(format!(
            "Timed out after {}s waiting for '{command}' response",
            REQUEST_TIMEOUT.as_secs()
        ))),
    }
}

fn breakpoint_args(spec: &BreakpointSpec, line: u32) -> Value {
    let mut mapped = Map::new();
    mapped.insert("line".to_string(), json!(line));
    if let Some(condition) = &spec.condition {
        mapped.insert("condition".to_string(), json!(condition));
    }
    if let Some(hit_condition) = &spec.hit_condition {
        mapped.insert("hitCondition".to_string(), json!(hit_condition));
    }
    if let Some(log_message) = &spec.log_message {
        mapped.insert("logMessage".to_string(), json!(log_message));
    }
    Value::Object(mapped)
}

fn resolve_breakpoint_line(spec: &BreakpointSpec, path: &std::path::Path) -> Result<u32, String> {
    match (spec.line, spec.search.as_deref()) {
        (Some(line), _) if line > 0 => Ok(line),
        (Some(_), _) => Err("Breakpoint lines are 1-based".to_string()),
        (None, Some(needle)) => source::find_line(path, needle),
        (None, None) => Err("Each breakpoint needs a line or a search string".to_string()),
    }
}

/// Decode the `data` field of a readMemory response.
fn read_memory_data_bytes(body: &Value) -> Result<Vec<u8>, String> {
    let Some(data) = body.get("data").and_then(Value::as_str) else {
        return Ok(Vec::new());
    };
    BASE64_STANDARD
        .decode(data)
        .map_err(|e| format!("Adapter returned invalid base64 memory payload: {e}"))
}

fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Clone)]
struct DebuggerMcpServer {
    tool_router: ToolRouter<Self>,
    registry: Arc<SessionRegistry>,
    discovery: Arc<SystemDiscovery>,
    config: Arc<BridgeConfig>,
}

impl DebuggerMcpServer {
    async fn session(&self, id: Option<SessionId>) -> Result<Arc<Session>, McpError> {
        self.registry.resolve(id).await.map_err(dap_error)
    }

    /// Explicit thread, else the thread of the last stop, else the first
    /// thread the adapter reports.
    async fn resolve_thread_id(
        &self,
        session: &Session,
        explicit: Option<i64>,
    ) -> Result<i64, McpError> {
        if let Some(thread_id) = explicit {
            return Ok(thread_id);
        }
        if let Some(thread_id) = session.status().await.thread_id {
            return Ok(thread_id);
        }
        let threads = call(session, commands::THREADS, json!({})).await?;
        threads
            .get("threads")
            .and_then(Value::as_array)
            .and_then(|threads| threads.first())
            .and_then(|thread| thread.get("id"))
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                to_mcp_error("Missing threadId: provide thread_id or wait for a stopped event")
            })
    }

    async fn step(
        &self,
        params: ThreadParams,
        command: &str,
    ) -> Result<CallToolResult, McpError> {
        let session = self.session(params.session_id).await?;
        let thread_id = self.resolve_thread_id(&session, params.thread_id).await?;

        call(&session, command, json!({ "threadId": thread_id })).await?;
        let outcome = wait_until_stopped(
            &session,
            self.config.default_wait_timeout,
            self.config.stop_poll_interval,
        )
        .await;

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "session_id": session.id(),
            "thread_id": thread_id,
            "wait": outcome,
        })))
    }
}

#[tool_router]
impl DebuggerMcpServer {
    fn new() -> Self {
        Self {
            tool_router: Self::tool_router(),
            registry: Arc::new(SessionRegistry::new()),
            discovery: Arc::new(SystemDiscovery::from_env()),
            config: Arc::new(BridgeConfig::from_env()),
        }
    }

    #[tool(description = "Start a debug adapter (python or lldb) for a program and open a session")]
    async fn debugger_start(
        &self,
        params: Parameters<DebuggerStartParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let flavor: AdapterFlavor = params.adapter.parse().map_err(dap_error)?;

        let mut request = LaunchRequest::new(flavor, params.program)
            .with_args(params.args)
            .with_stop_on_entry(params.stop_on_entry);
        if let Some(cwd) = params.cwd {
            request = request.with_cwd(PathBuf::from(cwd));
        }

        let session = bootstrap(
            &self.registry,
            self.discovery.as_ref(),
            &self.config,
            request,
        )
        .await
        .map_err(dap_error)?;

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "session_id": session.id(),
            "adapter": session.adapter(),
            "pid": session.pid(),
            "working_directory": session.working_directory().display().to_string(),
            "status": session.status().await,
        })))
    }

    #[tool(description = "List open debug sessions")]
    async fn debugger_sessions(
        &self,
        _params: Parameters<DebuggerSessionsParams>,
    ) -> Result<CallToolResult, McpError> {
        let most_recent = self.registry.most_recent().await;
        let mut sessions = Vec::new();
        for session in self.registry.list().await {
            sessions.push(json!({
                "session_id": session.id(),
                "adapter": session.adapter(),
                "program": session.program(),
                "pid": session.pid(),
                "created_at_ms": session.created_at_ms(),
                "state": session.status().await.state,
                "most_recent": most_recent == Some(session.id()),
            }));
        }

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "sessions": sessions,
        })))
    }

    #[tool(description = "Set source breakpoints for a file by line or by search text")]
    async fn debugger_set_breakpoints(
        &self,
        params: Parameters<DebuggerSetBreakpointsParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let session = self.session(params.session_id).await?;
        let source_path = session.resolve_source_path(&params.source_path);

        let mut source_breakpoints = Vec::with_capacity(params.breakpoints.len());
        for spec in &params.breakpoints {
            let line = resolve_breakpoint_line(spec, &source_path).map_err(to_mcp_error)?;
            source_breakpoints.push(breakpoint_args(spec, line));
        }

        let source_response = call(
            &session,
            commands::SET_BREAKPOINTS,
            json!({
                "source": { "path": source_path.display().to_string() },
                "breakpoints": source_breakpoints,
            }),
        )
        .await?;

        let function_response = if params.function_breakpoints.is_empty() {
            Value::Null
        } else {
            let fbp: Vec<Value> = params
                .function_breakpoints
                .iter()
                .map(|name| json!({ "name": name }))
                .collect();
            call(
                &session,
                commands::SET_FUNCTION_BREAKPOINTS,
                json!({ "breakpoints": fbp }),
            )
            .await?
        };

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "source_path": source_path.display().to_string(),
            "source_breakpoints": source_response.get("breakpoints").cloned().unwrap_or_else(|| json!([])),
            "function_breakpoints": function_response
                .get("breakpoints")
                .cloned()
                .unwrap_or_else(|| json!([])),
        })))
    }

    #[tool(description = "Finish configuration and let the debuggee run")]
    async fn debugger_run(
        &self,
        params: Parameters<SessionParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.session(params.0.session_id).await?;
        if session.is_started() {
            return Err(to_mcp_error(format!(
                "Session {} is already running; use debugger_continue",
                session.id()
            )));
        }

        match timeout(REQUEST_TIMEOUT, session.begin_execution()).await {
            Ok(result) => result.map_err(dap_error)?,
            Err(_) => return Err(to_mcp_error("Timed out waiting for configurationDone response")),
        };

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "session_id": session.id(),
            "status": session.status().await,
        })))
    }

    #[tool(description = "Continue execution")]
    async fn debugger_continue(
        &self,
        params: Parameters<ThreadParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let session = self.session(params.session_id).await?;
        let last_stop = session.status().await;
        let thread_id = self.resolve_thread_id(&session, params.thread_id).await?;

        call(&session, commands::CONTINUE, json!({ "threadId": thread_id })).await?;

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "session_id": session.id(),
            "thread_id": thread_id,
            "state": session.status().await.state,
            "last_stop": last_stop,
        })))
    }

    #[tool(description = "Step over the next line and wait for the stop")]
    async fn debugger_step_over(
        &self,
        params: Parameters<ThreadParams>,
    ) -> Result<CallToolResult, McpError> {
        self.step(params.0, commands::NEXT).await
    }

    #[tool(description = "Step into function call and wait for the stop")]
    async fn debugger_step_in(
        &self,
        params: Parameters<ThreadParams>,
    ) -> Result<CallToolResult, McpError> {
        self.step(params.0, commands::STEP_IN).await
    }

    #[tool(description = "Step out of current function and wait for the stop")]
    async fn debugger_step_out(
        &self,
        params: Parameters<ThreadParams>,
    ) -> Result<CallToolResult, McpError> {
        self.step(params.0, commands::STEP_OUT).await
    }

    #[tool(description = "Pause a running thread")]
    async fn debugger_pause(
        &self,
        params: Parameters<ThreadParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let session = self.session(params.session_id).await?;
        let thread_id = self.resolve_thread_id(&session, params.thread_id).await?;

        call(&session, commands::PAUSE, json!({ "threadId": thread_id })).await?;

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "session_id": session.id(),
            "thread_id": thread_id,
        })))
    }

    #[tool(description = "Report whether the debuggee is running, stopped or terminated")]
    async fn debugger_status(
        &self,
        params: Parameters<SessionParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.session(params.0.session_id).await?;
        Ok(CallToolResult::structured(json!({
            "ok": true,
            "session_id": session.id(),
            "status": session.status().await,
        })))
    }

    #[tool(description = "Wait until the debuggee stops, terminates or disconnects")]
    async fn debugger_wait(
        &self,
        params: Parameters<DebuggerWaitParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let session = self.session(params.session_id).await?;
        let wait_timeout = params
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.config.default_wait_timeout);

        let outcome = wait_until_stopped(&session, wait_timeout, self.config.stop_poll_interval).await;

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "session_id": session.id(),
            "wait": outcome,
        })))
    }

    #[tool(description = "Read the call stack of a thread")]
    async fn debugger_stack_trace(
        &self,
        params: Parameters<DebuggerStackTraceParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let session = self.session(params.session_id).await?;
        let thread_id = self.resolve_thread_id(&session, params.thread_id).await?;

        let mut arguments = Map::new();
        arguments.insert("threadId".to_string(), json!(thread_id));
        if let Some(levels) = params.levels {
            arguments.insert("levels".to_string(), json!(levels));
        }

        let raw = call(&session, commands::STACK_TRACE, Value::Object(arguments)).await?;

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "thread_id": thread_id,
            "frames": raw.get("stackFrames").cloned().unwrap_or_else(|| json!([])),
            "total_frames": raw.get("totalFrames").and_then(Value::as_u64),
        })))
    }

    #[tool(description = "List variable scopes of a stack frame")]
    async fn debugger_scopes(
        &self,
        params: Parameters<DebuggerScopesParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let session = self.session(params.session_id).await?;
        let raw = call(&session, commands::SCOPES, json!({ "frameId": params.frame_id })).await?;

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "scopes": raw.get("scopes").cloned().unwrap_or_else(|| json!([])),
        })))
    }

    #[tool(description = "Read variables from a variables reference")]
    async fn debugger_variables(
        &self,
        params: Parameters<DebuggerVariablesParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let session = self.session(params.session_id).await?;

        let mut arguments = Map::new();
        arguments.insert(
            "variablesReference".to_string(),
            json!(params.variables_reference),
        );
        if let Some(start) = params.start {
            arguments.insert("start".to_string(), json!(start));
        }
        if let Some(count) = params.count {
            arguments.insert("count".to_string(), json!(count));
        }

        let raw = call(&session, commands::VARIABLES, Value::Object(arguments)).await?;

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "variables": raw.get("variables").cloned().unwrap_or_else(|| json!([])),
        })))
    }

    #[tool(description = "Evaluate expression in debugger context")]
    async fn debugger_evaluate(
        &self,
        params: Parameters<DebuggerEvaluateParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let session = self.session(params.session_id).await?;

        let mut arguments = Map::new();
        arguments.insert("expression".to_string(), json!(params.expression));
        arguments.insert(
            "context".to_string(),
            json!(params.context.unwrap_or_else(|| "watch".to_string())),
        );
        if let Some(frame_id) = params.frame_id {
            arguments.insert("frameId".to_string(), json!(frame_id));
        }

        let raw = call(&session, commands::EVALUATE, Value::Object(arguments)).await?;

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "result": raw.get("result").and_then(Value::as_str),
            "type": raw.get("type").and_then(Value::as_str),
            "variables_reference": raw.get("variablesReference").and_then(Value::as_i64),
            "memory_reference": raw.get("memoryReference").and_then(Value::as_str),
        })))
    }

    #[tool(description = "Read memory from the debuggee")]
    async fn debugger_read_memory(
        &self,
        params: Parameters<DebuggerReadMemoryParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        if params.count > READ_MEMORY_MAX_COUNT {
            return Err(to_mcp_error(format!(
                "debugger_read_memory count {} exceeds max allowed {} bytes",
                params.count, READ_MEMORY_MAX_COUNT
            )));
        }
        let session = self.session(params.session_id).await?;

        let raw = call(
            &session,
            commands::READ_MEMORY,
            json!({
                "memoryReference": params.memory_reference,
                "offset": params.offset,
                "count": params.count,
            }),
        )
        .await?;
        let bytes = read_memory_data_bytes(&raw).map_err(to_mcp_error)?;

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "address": raw.get("address").and_then(Value::as_str),
            "requested": params.count,
            "bytes_read": bytes.len(),
            "unreadable_bytes": raw.get("unreadableBytes").and_then(Value::as_u64),
            "hex": hex_dump(&bytes),
        })))
    }

    #[tool(description = "Page through adapter events received by the session")]
    async fn debugger_events(
        &self,
        params: Parameters<PageParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let session = self.session(params.session_id).await?;
        let page = session
            .read_events(params.since, params.limit.unwrap_or(DEFAULT_PAGE_LIMIT))
            .await;

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "session_id": session.id(),
            "page": page,
        })))
    }

    #[tool(description = "Page through stdout/stderr captured from the adapter process")]
    async fn debugger_output(
        &self,
        params: Parameters<PageParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let session = self.session(params.session_id).await?;
        let page = session
            .read_output(params.since, params.limit.unwrap_or(DEFAULT_PAGE_LIMIT))
            .await;

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "session_id": session.id(),
            "page": page,
        })))
    }

    #[tool(description = "Disconnect from the adapter, kill it and close the session")]
    async fn debugger_terminate(
        &self,
        params: Parameters<DebuggerTerminateParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let session = self.session(params.session_id).await?;

        let disconnect = session.request(
            commands::DISCONNECT,
            Some(json!({ "terminateDebuggee": params.terminate_debuggee })),
        );
        let disconnect_ok = match timeout(DISCONNECT_TIMEOUT, disconnect).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::warn!(session = session.id(), "disconnect failed: {}", e);
                false
            }
            Err(_) => {
                tracing::warn!(session = session.id(), "disconnect timed out");
                false
            }
        };

        session.close().await;
        self.registry.remove(session.id()).await;

        Ok(CallToolResult::structured(json!({
            "ok": true,
            "session_id": session.id(),
            "disconnect_acknowledged": disconnect_ok,
            "state": "closed",
        })))
    }
}

#[tool_handler]
impl ServerHandler for DebuggerMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Debugger MCP Server driving debugpy and lldb-dap over DAP. Start a session with \
                 debugger_start, set breakpoints, then debugger_run."
                    .into(),
            ),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the MCP transport
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let server = DebuggerMcpServer::new();
    let registry = server.registry.clone();
    let transport = transport::stdio();

    tracing::info!("Starting Debugger MCP Server on stdio...");

    server.serve(transport).await?.waiting().await?;

    registry.close_all().await;
    Ok(())
}
