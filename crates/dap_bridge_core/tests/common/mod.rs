#![allow(dead_code)]

use std::{
    net::{Ipv4Addr, TcpListener as StdTcpListener},
    path::PathBuf,
    sync::{Arc, Mutex},
};

use dap_bridge_core::{
    codec::{encode, FrameDecoder},
    protocol::events,
    AdapterCommand, AdapterDiscovery, DapError, Event, LaunchRequest, ProtocolMessage, Request,
    Response, StartStyle,
};
use serde_json::{json, Value};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{tcp::OwnedWriteHalf, TcpListener},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct FakeBehavior {
    pub fail_initialize: bool,
    /// Answer `attach` only after `configurationDone`, like debugpy.
    pub defer_attach: bool,
}

/// In-process stand-in for a debug adapter, serving one client connection.
#[derive(Clone, Default)]
pub struct FakeAdapter {
    behavior: FakeBehavior,
    seen: Arc<Mutex<Vec<Request>>>,
}

impl FakeAdapter {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            seen: Arc::default(),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.command.clone())
            .collect()
    }

    pub fn request(&self, command: &str) -> Option<Request> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.command == command)
            .cloned()
    }

    /// Bind `127.0.0.1:port` and serve in the background.
    pub fn listen_on(&self, port: u16) -> std::io::Result<()> {
        let listener = StdTcpListener::bind((Ipv4Addr::LOCALHOST, port))?;
        listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(listener)?;
        tokio::spawn(self.clone().serve(listener));
        Ok(())
    }

    pub async fn serve(self, listener: TcpListener) {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let (mut reader, writer) = stream.into_split();
        let mut out = Outbound { writer, seq: 0 };
        let mut decoder = FrameDecoder::new();
        let mut deferred_attach: Option<Request> = None;
        let mut chunk = [0_u8; 4096];

        loop {
            let n = match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            decoder.extend(&chunk[..n]);

            while let Some(Ok(ProtocolMessage::Request(request))) = decoder.next_message() {
                self.seen.lock().unwrap().push(request.clone());
                match request.command.as_str() {
                    "initialize" if self.behavior.fail_initialize => {
                        out.fail(&request, "unsupported client").await;
                    }
                    "initialize" => {
                        out.respond(&request, Some(json!({"supportsConfigurationDoneRequest": true})))
                            .await;
                        out.event(events::INITIALIZED, None).await;
                    }
                    "attach" if self.behavior.defer_attach => {
                        deferred_attach = Some(request);
                    }
                    "launch" | "attach" | "setBreakpoints" | "pause" => {
                        out.respond(&request, None).await;
                    }
                    "configurationDone" => {
                        out.respond(&request, None).await;
                        if let Some(attach) = deferred_attach.take() {
                            out.respond(&attach, None).await;
                        }
                        out.event(events::STOPPED, Some(json!({"reason": "entry", "threadId": 1})))
                            .await;
                    }
                    "continue" => {
                        out.respond(&request, Some(json!({"allThreadsContinued": true})))
                            .await;
                        out.event(events::CONTINUED, Some(json!({"threadId": 1}))).await;
                        out.event(events::OUTPUT, Some(json!({"category": "stdout", "output": "done\n"})))
                            .await;
                        out.event(events::EXITED, Some(json!({"exitCode": 0}))).await;
                        out.event(events::TERMINATED, None).await;
                    }
                    "threads" => {
                        out.respond(&request, Some(json!({"threads": [{"id": 1, "name": "main"}]})))
                            .await;
                    }
                    "evaluate" => {
                        let expression = request
                            .arguments
                            .as_ref()
                            .and_then(|a| a.get("expression"))
                            .cloned()
                            .unwrap_or(Value::Null);
                        out.respond(&request, Some(json!({"result": expression, "variablesReference": 0})))
                            .await;
                    }
                    "disconnect" => {
                        out.respond(&request, None).await;
                        return;
                    }
                    _ => out.fail(&request, "unsupported request").await,
                }
            }
        }
    }
}

struct Outbound {
    writer: OwnedWriteHalf,
    seq: i64,
}

impl Outbound {
    async fn send(&mut self, message: ProtocolMessage) {
        let bytes = encode(&message).unwrap();
        let _ = self.writer.write_all(&bytes).await;
    }

    async fn respond(&mut self, request: &Request, body: Option<Value>) {
        self.seq += 1;
        let mut response = Response::success(self.seq, request.seq, request.command.clone());
        response.body = body;
        self.send(ProtocolMessage::Response(response)).await;
    }

    async fn fail(&mut self, request: &Request, message: &str) {
        self.seq += 1;
        let response = Response::error(self.seq, request.seq, request.command.clone(), message);
        self.send(ProtocolMessage::Response(response)).await;
    }

    async fn event(&mut self, name: &str, body: Option<Value>) {
        self.seq += 1;
        let mut event = Event::new(self.seq, name);
        event.body = body;
        self.send(ProtocolMessage::Event(event)).await;
    }
}

/// Discovery that starts a [`FakeAdapter`] on the requested port and hands
/// bootstrap a long-running placeholder process to own.
pub struct FakeDiscovery {
    pub adapter: Option<FakeAdapter>,
    pub start_style: StartStyle,
}

impl FakeDiscovery {
    pub fn serving(adapter: FakeAdapter, start_style: StartStyle) -> Self {
        Self {
            adapter: Some(adapter),
            start_style,
        }
    }

    /// Nothing ever listens on the port.
    pub fn silent() -> Self {
        Self {
            adapter: None,
            start_style: StartStyle::Launch,
        }
    }
}

impl AdapterDiscovery for FakeDiscovery {
    fn locate(&self, _request: &LaunchRequest, port: u16) -> dap_bridge_core::Result<AdapterCommand> {
        if let Some(adapter) = &self.adapter {
            adapter.listen_on(port).map_err(DapError::Io)?;
        }
        Ok(AdapterCommand {
            executable: PathBuf::from("sleep"),
            args: vec!["30".to_string()],
            adapter_id: "fake-adapter".to_string(),
            start_style: self.start_style,
        })
    }
}

#[cfg(target_os = "linux")]
pub fn process_alive(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{pid}")).exists()
}
