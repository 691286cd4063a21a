//! Scripted engine adapter for integration tests.
//!
//! [`MockEngine::new`] returns the adapter plus a [`MockEngineHandle`]. The
//! handle pushes [`EngineEvent`]s into the session as if the remote engine had
//! produced them and records every call the pipeline makes.

// Not every test binary uses every helper
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use voice_bridge::core::engine::{EngineAdapter, EngineError, EngineEvent, EngineResult};
use voice_bridge::core::frames::{AudioFrame, ContextFrame, Role};

/// One call made by the pipeline.
#[derive(Debug, Clone)]
pub enum EngineCall {
    Connect,
    Context(ContextFrame),
    Audio(usize),
    TriggerResponse,
    Interrupt,
    ToolResult { call_id: String, result: Value },
    Disconnect,
}

pub struct MockEngine {
    events: Option<mpsc::Receiver<EngineEvent>>,
    calls: Arc<Mutex<Vec<EngineCall>>>,
    connected: Arc<AtomicBool>,
    fail_connect: bool,
}

#[derive(Clone)]
pub struct MockEngineHandle {
    events: mpsc::Sender<EngineEvent>,
    calls: Arc<Mutex<Vec<EngineCall>>>,
    connected: Arc<AtomicBool>,
}

impl MockEngine {
    pub fn new() -> (Self, MockEngineHandle) {
        let (tx, rx) = mpsc::channel(256);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let connected = Arc::new(AtomicBool::new(false));
        let engine = Self {
            events: Some(rx),
            calls: calls.clone(),
            connected: connected.clone(),
            fail_connect: false,
        };
        let handle = MockEngineHandle {
            events: tx,
            calls,
            connected,
        };
        (engine, handle)
    }

    /// An engine whose connection attempt is refused.
    pub fn failing() -> Self {
        let (mut engine, _) = Self::new();
        engine.fail_connect = true;
        engine
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl EngineAdapter for MockEngine {
    async fn connect(&mut self) -> EngineResult<mpsc::Receiver<EngineEvent>> {
        self.record(EngineCall::Connect);
        if self.fail_connect {
            return Err(EngineError::ConnectionFailed("refused".to_string()));
        }
        let events = self.events.take().ok_or(EngineError::NotConnected)?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(events)
    }

    async fn send_context(&self, context: &ContextFrame) -> EngineResult<()> {
        self.record(EngineCall::Context(context.clone()));
        Ok(())
    }

    async fn send_audio(&self, pcm: Bytes) -> EngineResult<()> {
        self.record(EngineCall::Audio(pcm.len()));
        Ok(())
    }

    async fn trigger_response(&self) -> EngineResult<()> {
        self.record(EngineCall::TriggerResponse);
        Ok(())
    }

    async fn interrupt(&self) -> EngineResult<()> {
        self.record(EngineCall::Interrupt);
        Ok(())
    }

    async fn submit_tool_result(&self, call_id: &str, result: &Value) -> EngineResult<()> {
        self.record(EngineCall::ToolResult {
            call_id: call_id.to_string(),
            result: result.clone(),
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> EngineResult<()> {
        self.record(EngineCall::Disconnect);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

impl MockEngineHandle {
    pub async fn push(&self, event: EngineEvent) {
        self.events
            .send(event)
            .await
            .expect("pipeline dropped the engine event stream");
    }

    pub async fn audio(&self, response_id: &str, pcm: Bytes, sample_rate: u32) {
        self.push(EngineEvent::Audio {
            frame: AudioFrame::outbound(pcm, sample_rate),
            response_id: Some(response_id.to_string()),
        })
        .await;
    }

    pub async fn transcript(&self, role: Role, content: &str) {
        self.push(EngineEvent::Transcript {
            role,
            content: content.to_string(),
        })
        .await;
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, matches: impl Fn(&EngineCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| matches(c)).count()
    }

    /// Poll until a recorded call satisfies `matches`.
    pub async fn wait_for(&self, matches: impl Fn(&EngineCall) -> bool) -> EngineCall {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(call) = self.calls.lock().iter().find(|c| matches(c)).cloned() {
                return call;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("Timed out waiting for engine call; saw {:?}", self.calls());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// PCM s16le of `samples` samples alternating between `+amplitude` and
/// `-amplitude`.
pub fn square_wave(samples: usize, amplitude: i16) -> Bytes {
    let mut pcm = Vec::with_capacity(samples * 2);
    for i in 0..samples {
        let value = if i % 2 == 0 { amplitude } else { -amplitude };
        pcm.extend_from_slice(&value.to_le_bytes());
    }
    Bytes::from(pcm)
}
