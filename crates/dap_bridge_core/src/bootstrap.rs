//! Adapter bootstrap
//!
//! Spawns a debug adapter on a free loopback port, connects to it with
//! retries, wraps the connection in a [`Session`], registers it and runs the
//! `initialize` + `launch`/`attach` handshake. Every failure before the
//! session exists kills the spawned process; after that, [`Session::close`]
//! is the only cleanup path.

use std::{
    env,
    net::{Ipv4Addr, SocketAddr, TcpListener},
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
};

use serde_json::{json, Value};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    sync::mpsc,
    time::sleep,
};
use tracing::{debug, info, trace, warn};

use crate::{
    discovery::{AdapterCommand, AdapterDiscovery, AdapterFlavor, StartStyle},
    protocol::commands,
    session::{OutputLog, OutputStream, SessionOptions},
    transport::{Transport, TransportEvent},
    BridgeConfig, DapError, Result, Session, SessionRegistry,
};

/// What to debug and how.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub flavor: AdapterFlavor,
    pub program: String,
    pub args: Vec<String>,
    /// Working directory for the adapter and debuggee. Defaults to the
    /// current directory.
    pub cwd: Option<PathBuf>,
    pub stop_on_entry: bool,
}

impl LaunchRequest {
    pub fn new(flavor: AdapterFlavor, program: impl Into<String>) -> Self {
        Self {
            flavor,
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            stop_on_entry: false,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_stop_on_entry(mut self, stop_on_entry: bool) -> Self {
        self.stop_on_entry = stop_on_entry;
        self
    }
}

/// Start an adapter for `request` and return a registered, initialized
/// session. The debuggee does not run until
/// [`Session::begin_execution`] is called.
pub async fn bootstrap(
    registry: &SessionRegistry,
    discovery: &dyn AdapterDiscovery,
    config: &BridgeConfig,
    request: LaunchRequest,
) -> Result<Arc<Session>> {
    let port = allocate_port()?;
    let command = discovery.locate(&request, port)?;
    let cwd = match &request.cwd {
        Some(cwd) => cwd.clone(),
        None => env::current_dir()?,
    };

    let output = OutputLog::new();
    let mut child = spawn_adapter(&command, &cwd, &output)?;
    let pid = child.id();
    info!(
        adapter = %command.adapter_id,
        pid = ?pid,
        port,
        "Spawned debug adapter"
    );

    let address = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let (transport, inbound) = match connect_with_retry(&mut child, address, config).await {
        Ok(connected) => connected,
        Err(e) => {
            terminate(&mut child).await;
            return Err(e);
        }
    };

    let session = Session::new(
        registry.allocate_id(),
        transport,
        inbound,
        SessionOptions {
            adapter: command.adapter_id.clone(),
            program: request.program.clone(),
            working_directory: cwd.clone(),
            process: Some(child),
            output,
        },
    );
    registry.add(session.clone()).await;

    if let Err(e) = session
        .request(
            commands::INITIALIZE,
            Some(initialize_args(config, &command.adapter_id)),
        )
        .await
    {
        warn!(session = session.id(), "initialize failed: {}", e);
        session.close().await;
        registry.remove(session.id()).await;
        return Err(DapError::Handshake(format!(
            "{} rejected initialize: {e}",
            command.adapter_id
        )));
    }

    match command.start_style {
        StartStyle::Launch => {
            let args = launch_args(&request, &cwd);
            if let Err(e) = session.request(commands::LAUNCH, Some(args)).await {
                warn!(session = session.id(), "launch request failed: {}", e);
            }
        }
        StartStyle::Attach => start_attach(&session).await,
    }

    info!(
        session = session.id(),
        adapter = %command.adapter_id,
        program = %request.program,
        "Debug session ready"
    );
    Ok(session)
}

/// Ask the OS for a free loopback port. The listener is dropped before the
/// adapter binds, so another process could in principle grab it first.
pub fn allocate_port() -> Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .map_err(|e| DapError::PortAllocation(e.to_string()))?;
    let port = listener
        .local_addr()
        .map_err(|e| DapError::PortAllocation(e.to_string()))?
        .port();
    Ok(port)
}

fn spawn_adapter(command: &AdapterCommand, cwd: &Path, output: &OutputLog) -> Result<Child> {
    let mut child = Command::new(&command.executable)
        .args(&command.args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| DapError::Spawn {
            program: command.executable.display().to_string(),
            message: e.to_string(),
        })?;

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(capture_lines(stdout, OutputStream::Stdout, output.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(capture_lines(stderr, OutputStream::Stderr, output.clone()));
    }
    Ok(child)
}

async fn capture_lines<R>(stream: R, kind: OutputStream, output: OutputLog)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                // Non-UTF-8 output is kept lossily; the pipe must stay drained.
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
                trace!(stream = ?kind, "adapter: {}", line);
                output.push(kind, line).await;
            }
            Err(e) => {
                debug!(stream = ?kind, "Stopped capturing adapter output: {}", e);
                break;
            }
        }
    }
}

/// Connect to `address`, retrying with a fixed delay while the adapter
/// starts listening. Gives up early if the adapter process exits.
pub async fn connect_with_retry(
    child: &mut Child,
    address: SocketAddr,
    config: &BridgeConfig,
) -> Result<(Transport, mpsc::UnboundedReceiver<TransportEvent>)> {
    let attempts = config.connect_attempts.max(1);
    let mut last_error = String::from("no attempt made");

    for attempt in 1..=attempts {
        match Transport::connect(address).await {
            Ok(connected) => {
                debug!(%address, attempt, "Connected to debug adapter");
                return Ok(connected);
            }
            Err(e) => {
                trace!(%address, attempt, "Connect attempt failed: {}", e);
                last_error = e.to_string();
            }
        }

        if let Ok(Some(status)) = child.try_wait() {
            return Err(DapError::ConnectRetriesExhausted {
                address: address.to_string(),
                attempts: attempt,
                pid: None,
                last_error: format!("adapter exited early ({status}); last error: {last_error}"),
            });
        }

        if attempt < attempts {
            sleep(config.connect_retry_delay).await;
        }
    }

    warn!(%address, attempts, "Debug adapter never accepted a connection");
    Err(DapError::ConnectRetriesExhausted {
        address: address.to_string(),
        attempts,
        pid: child.id(),
        last_error,
    })
}

async fn terminate(child: &mut Child) {
    match child.kill().await {
        Ok(()) => debug!("Killed adapter process after failed bootstrap"),
        Err(e) => warn!("Failed to kill adapter process: {}", e),
    }
}

/// debugpy answers `attach` only after `configurationDone`, so the response
/// is awaited in the background and only logged.
async fn start_attach(session: &Arc<Session>) {
    match session
        .begin_request(commands::ATTACH, Some(attach_args()))
        .await
    {
        Ok(pending) => {
            let id = session.id();
            tokio::spawn(async move {
                match pending.wait().await {
                    Ok(_) => debug!(session = id, "attach acknowledged"),
                    Err(e) => warn!(session = id, "attach request failed: {}", e),
                }
            });
        }
        Err(e) => warn!(session = session.id(), "Failed to send attach: {}", e),
    }
}

fn initialize_args(config: &BridgeConfig, adapter_id: &str) -> Value {
    json!({
        "adapterID": adapter_id,
        "clientID": config.client_id,
        "clientName": config.client_name,
        "locale": "en-US",
        "pathFormat": "path",
        "linesStartAt1": true,
        "columnsStartAt1": true,
        "supportsVariableType": true,
        "supportsVariablePaging": true,
        "supportsRunInTerminalRequest": false,
        "supportsMemoryReferences": true,
    })
}

fn launch_args(request: &LaunchRequest, cwd: &Path) -> Value {
    let program = Path::new(&request.program);
    let program = if program.is_absolute() {
        program.to_path_buf()
    } else {
        cwd.join(program)
    };
    json!({
        "program": program.display().to_string(),
        "args": request.args,
        "cwd": cwd.display().to_string(),
        "stopOnEntry": request.stop_on_entry,
    })
}

fn attach_args() -> Value {
    json!({
        "justMyCode": false,
        "redirectOutput": true,
    })
}
