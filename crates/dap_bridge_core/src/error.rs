use thiserror::Error;

use crate::session::SessionId;

#[derive(Error, Debug)]
pub enum DapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A single frame could not be decoded; the stream itself is still usable.
    #[error("Malformed DAP frame: {0}")]
    Decode(String),

    #[error("DAP request '{command}' failed: {message}")]
    Adapter { command: String, message: String },

    #[error("Session closed before '{command}' received a response")]
    SessionClosed { command: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No such session: {0}")]
    NoSuchSession(SessionId),

    #[error("No session specified and no debug session exists")]
    NoSession,

    #[error("Failed to allocate a local port: {0}")]
    PortAllocation(String),

    #[error("Unknown adapter flavor '{0}' (expected 'python' or 'lldb')")]
    UnknownFlavor(String),

    #[error("Debug adapter not found: {0}")]
    AdapterNotFound(String),

    #[error("Failed to spawn debug adapter '{program}': {message}")]
    Spawn { program: String, message: String },

    #[error(
        "Debug adapter (pid {pid:?}) never accepted a connection on {address} after {attempts} attempts: {last_error}"
    )]
    ConnectRetriesExhausted {
        address: String,
        attempts: u32,
        pid: Option<u32>,
        last_error: String,
    },

    #[error("DAP handshake failed: {0}")]
    Handshake(String),
}

impl DapError {
    pub fn adapter(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Adapter {
            command: command.into(),
            message: message.into(),
        }
    }

    /// True for the two "which session?" resource errors.
    pub fn is_session_lookup(&self) -> bool {
        matches!(self, Self::NoSuchSession(_) | Self::NoSession)
    }

    /// Errors caused by the caller's input rather than the adapter or host.
    pub fn is_invalid_input(&self) -> bool {
        self.is_session_lookup() || matches!(self, Self::UnknownFlavor(_))
    }
}
