//! Hand-written doubles shared by the resolver and session driver tests.

use crate::console::{Console, LineReader, Notice, NoticeSink};
use crate::model::{ModelError, ModelRequest, ModelResponse, ResponsesApi};
use crate::tooling::{ToolContent, ToolInvokeError, ToolSession};
use crate::types::ToolDescriptor;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

pub fn answer(text: &str) -> ModelResponse {
    ModelResponse {
        id: Some("resp_answer".into()),
        output: vec![json!({
            "type": "message",
            "id": "msg_1",
            "role": "assistant",
            "status": "completed",
            "content": [{"type": "output_text", "text": text, "annotations": []}]
        })],
    }
}

pub fn function_call(call_id: &str, name: &str, arguments: &str) -> ModelResponse {
    ModelResponse {
        id: Some("resp_call".into()),
        output: vec![json!({
            "type": "function_call",
            "id": "fc_1",
            "call_id": call_id,
            "name": name,
            "arguments": arguments,
            "status": "completed"
        })],
    }
}

#[derive(Clone)]
pub struct ScriptedProvider {
    responses: Arc<Mutex<VecDeque<Result<ModelResponse, ModelError>>>>,
    recordings: Arc<Mutex<Vec<ModelRequest>>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Result<ModelResponse, ModelError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            recordings: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn requests(&self) -> Vec<ModelRequest> {
        self.recordings.lock().await.clone()
    }
}

#[async_trait]
impl ResponsesApi for ScriptedProvider {
    async fn create(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        self.recordings.lock().await.push(request);
        self.responses
            .lock()
            .await
            .pop_front()
            .expect("model called more often than scripted")
    }
}

#[derive(Clone, Default)]
pub struct StubSession {
    pub tools: Vec<ToolDescriptor>,
    replies: Arc<StdMutex<VecDeque<Result<Vec<ToolContent>, ToolInvokeError>>>>,
    calls: Arc<StdMutex<Vec<(String, Value)>>>,
    connects: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    connected: bool,
    refuse_connect: bool,
    fail_catalog: bool,
}

impl StubSession {
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        Self {
            tools,
            ..Self::default()
        }
    }

    pub fn refusing_connections() -> Self {
        Self {
            refuse_connect: true,
            ..Self::default()
        }
    }

    pub fn failing_catalog() -> Self {
        Self {
            fail_catalog: true,
            ..Self::default()
        }
    }

    pub fn connected() -> Self {
        Self {
            connected: true,
            ..Self::default()
        }
    }

    pub fn reply_with(self, reply: Result<Vec<ToolContent>, ToolInvokeError>) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolSession for StubSession {
    async fn connect(&mut self) -> Result<(), ToolInvokeError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse_connect {
            return Err(ToolInvokeError::Transport {
                server: "stub".into(),
                message: "connection refused".into(),
            });
        }
        self.connected = true;
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolInvokeError> {
        if self.fail_catalog {
            return Err(ToolInvokeError::Transport {
                server: "stub".into(),
                message: "tools/list timed out".into(),
            });
        }
        Ok(self.tools.clone())
    }

    async fn call_tool(
        &self,
        tool: &str,
        arguments: Value,
    ) -> Result<Vec<ToolContent>, ToolInvokeError> {
        self.calls
            .lock()
            .unwrap()
            .push((tool.to_string(), arguments));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("tool called more often than scripted")
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn close(&mut self) -> Result<(), ToolInvokeError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.connected = false;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub notices: Vec<Notice>,
}

impl NoticeSink for RecordingSink {
    fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }
}

/// Console fed from a fixed list of lines; `None` once the list runs out.
pub struct ScriptedConsole {
    lines: VecDeque<io::Result<String>>,
    reads: usize,
    pub notices: Vec<Notice>,
}

impl ScriptedConsole {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|line| Ok(line.to_string())).collect(),
            reads: 0,
            notices: Vec::new(),
        }
    }

    pub fn failing_after(lines: &[&str]) -> Self {
        let mut console = Self::new(lines);
        console
            .lines
            .push_back(Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin closed")));
        console
    }

    pub fn answers(&self) -> Vec<String> {
        answers_in(&self.notices)
    }

    pub fn read_count(&self) -> usize {
        self.reads
    }
}

fn answers_in(notices: &[Notice]) -> Vec<String> {
    notices
        .iter()
        .filter_map(|notice| match notice {
            Notice::Answer { text } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

impl NoticeSink for ScriptedConsole {
    fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }
}

#[async_trait]
impl Console for ScriptedConsole {
    async fn read_line(&mut self) -> io::Result<Option<String>> {
        self.reads += 1;
        self.lines.pop_front().transpose()
    }
}

/// Console reading raw bytes the way the terminal reads stdin.
pub struct ByteConsole {
    input: LineReader<&'static [u8]>,
    pub notices: Vec<Notice>,
}

impl ByteConsole {
    pub fn new(input: &'static [u8]) -> Self {
        Self {
            input: LineReader::new(input),
            notices: Vec::new(),
        }
    }

    pub fn answers(&self) -> Vec<String> {
        answers_in(&self.notices)
    }
}

impl NoticeSink for ByteConsole {
    fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }
}

#[async_trait]
impl Console for ByteConsole {
    async fn read_line(&mut self) -> io::Result<Option<String>> {
        self.input.next_line().await
    }
}
