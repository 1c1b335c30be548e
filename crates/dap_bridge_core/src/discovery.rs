//! Locating a debug adapter for a flavor
//!
//! Bootstrap only needs an executable, its arguments, and whether the
//! adapter expects a `launch` or an `attach` request. [`SystemDiscovery`]
//! covers the two supported adapters from the environment and `PATH`;
//! anything smarter (installing debugpy, probing LLDB versions) plugs in
//! through [`AdapterDiscovery`].

use std::{
    env,
    ffi::OsStr,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{bootstrap::LaunchRequest, DapError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterFlavor {
    /// debugpy, which runs the target itself and listens for the client.
    Python,
    /// lldb-dap (formerly lldb-vscode) in TCP server mode.
    Lldb,
}

impl AdapterFlavor {
    pub fn adapter_id(self) -> &'static str {
        match self {
            Self::Python => "debugpy",
            Self::Lldb => "lldb-dap",
        }
    }
}

impl fmt::Display for AdapterFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Python => f.write_str("python"),
            Self::Lldb => f.write_str("lldb"),
        }
    }
}

impl FromStr for AdapterFlavor {
    type Err = DapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "python" | "py" | "debugpy" => Ok(Self::Python),
            "lldb" | "lldb-dap" | "rust" | "c" | "cpp" | "c++" => Ok(Self::Lldb),
            _ => Err(DapError::UnknownFlavor(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartStyle {
    /// The client sends `launch` and waits for the response.
    Launch,
    /// The client sends `attach` without waiting for the response.
    Attach,
}

#[derive(Debug, Clone)]
pub struct AdapterCommand {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub adapter_id: String,
    pub start_style: StartStyle,
}

pub trait AdapterDiscovery: Send + Sync {
    /// Resolve the adapter command for `request`, listening on `port`.
    fn locate(&self, request: &LaunchRequest, port: u16) -> Result<AdapterCommand>;
}

const PYTHON_ENV: &str = "DAP_PYTHON";
const LLDB_ADAPTER_ENV: &str = "DAP_LLDB_ADAPTER_PATH";
const DEFAULT_PYTHON: &str = "python3";
const LLDB_ADAPTER_NAMES: &[&str] = &["lldb-dap", "lldb-vscode"];

/// Environment- and `PATH`-based discovery.
#[derive(Debug, Clone, Default)]
pub struct SystemDiscovery {
    python: Option<PathBuf>,
    lldb_adapter: Option<PathBuf>,
}

impl SystemDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        Self {
            python: env::var_os(PYTHON_ENV).map(PathBuf::from),
            lldb_adapter: env::var_os(LLDB_ADAPTER_ENV).map(PathBuf::from),
        }
    }

    pub fn with_python(mut self, python: impl Into<PathBuf>) -> Self {
        self.python = Some(python.into());
        self
    }

    pub fn with_lldb_adapter(mut self, adapter: impl Into<PathBuf>) -> Self {
        self.lldb_adapter = Some(adapter.into());
        self
    }

    fn python_command(&self, request: &LaunchRequest, port: u16) -> Result<AdapterCommand> {
        let python = self
            .python
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PYTHON));
        let executable = resolve_executable(&python).ok_or_else(|| {
            DapError::AdapterNotFound(format!(
                "Python interpreter '{}' not found. Set {PYTHON_ENV} or install python3.",
                python.display()
            ))
        })?;

        let mut args = vec![
            "-m".to_string(),
            "debugpy".to_string(),
            "--listen".to_string(),
            format!("127.0.0.1:{port}"),
            "--wait-for-client".to_string(),
            request.program.clone(),
        ];
        args.extend(request.args.iter().cloned());

        Ok(AdapterCommand {
            executable,
            args,
            adapter_id: AdapterFlavor::Python.adapter_id().to_string(),
            start_style: StartStyle::Attach,
        })
    }

    fn lldb_command(&self, port: u16) -> Result<AdapterCommand> {
        let executable = match &self.lldb_adapter {
            Some(path) => resolve_executable(path).ok_or_else(|| {
                DapError::AdapterNotFound(format!(
                    "{LLDB_ADAPTER_ENV} points at '{}', which is not an executable file",
                    path.display()
                ))
            })?,
            None => LLDB_ADAPTER_NAMES
                .iter()
                .find_map(|name| find_on_path(name))
                .ok_or_else(|| {
                    DapError::AdapterNotFound(format!(
                        "no LLDB debug adapter ({}) on PATH. Set {LLDB_ADAPTER_ENV}.",
                        LLDB_ADAPTER_NAMES.join(", ")
                    ))
                })?,
        };

        Ok(AdapterCommand {
            executable,
            args: vec![
                "--connection".to_string(),
                format!("listen://127.0.0.1:{port}"),
            ],
            adapter_id: AdapterFlavor::Lldb.adapter_id().to_string(),
            start_style: StartStyle::Launch,
        })
    }
}

impl AdapterDiscovery for SystemDiscovery {
    fn locate(&self, request: &LaunchRequest, port: u16) -> Result<AdapterCommand> {
        match request.flavor {
            AdapterFlavor::Python => self.python_command(request, port),
            AdapterFlavor::Lldb => self.lldb_command(port),
        }
    }
}

/// Paths with a separator are checked directly; bare names go through `PATH`.
fn resolve_executable(candidate: &Path) -> Option<PathBuf> {
    if candidate.components().count() > 1 {
        candidate.is_file().then(|| candidate.to_path_buf())
    } else {
        find_on_path(candidate.as_os_str())
    }
}

fn find_on_path(name: impl AsRef<OsStr>) -> Option<PathBuf> {
    let name = name.as_ref();
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
