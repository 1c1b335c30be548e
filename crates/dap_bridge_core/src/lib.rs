//! DAP Bridge Core
//!
//! A debug-adapter protocol client engine for driving native debuggers
//! (debugpy, lldb-dap) from an automated agent. Provides the wire codec, a
//! loopback TCP transport, per-session request/response/event handling, a
//! session registry, adapter bootstrap with connect retries, and run/stop
//! status inference over the session event log.

pub mod bootstrap;
pub mod codec;
pub mod config;
pub mod discovery;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod status;
pub mod transport;

// Re-export commonly used types
pub use bootstrap::{bootstrap, LaunchRequest};
pub use config::BridgeConfig;
pub use discovery::{AdapterCommand, AdapterDiscovery, AdapterFlavor, StartStyle, SystemDiscovery};
pub use error::DapError;
pub use protocol::{Event, ProtocolMessage, Request, Response};
pub use registry::SessionRegistry;
pub use session::{EventPage, LoggedEvent, OutputLine, OutputLog, OutputPage, OutputStream, Session, SessionId};
pub use status::{infer_status, wait_until_stopped, RunState, StatusReport, WaitOutcome};
pub use transport::{Transport, TransportEvent};

/// Result type alias using DapError
pub type Result<T> = std::result::Result<T, DapError>;
