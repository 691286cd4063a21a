//! WebSocket client for engines speaking the realtime event protocol.
//!
//! The socket is split between two tasks. The writer drains two outgoing
//! lanes, control events first and audio appends second, so a
//! `response.cancel` overtakes queued audio. The reader translates server
//! events into [`EngineEvent`]s for the pipeline. A slow pipeline only
//! stalls the reader; the writer keeps draining. When the reader ends the
//! event sender is dropped, which the pipeline observes as the engine going
//! away.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use base64::prelude::*;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::config::RealtimeVoice;
use super::messages::{
    ClientEvent, ConversationItem, PCM16_FORMAT, ServerEvent, SessionConfig, TurnDetection,
    tool_defs,
};
use super::{REALTIME_DEFAULT_MODEL, REALTIME_SAMPLE_RATE};
use crate::core::engine::base::{
    EngineAdapter, EngineConfig, EngineError, EngineEvent, EngineResult,
};
use crate::core::frames::{AudioFrame, ContextFrame, Role};

/// Channel capacity for control events (session, items, responses).
const CONTROL_CHANNEL_CAPACITY: usize = 64;

/// Channel capacity for outgoing audio appends.
const AUDIO_CHANNEL_CAPACITY: usize = 256;

/// Channel capacity for events handed to the pipeline.
const EVENT_CHANNEL_CAPACITY: usize = 512;

/// Silence the engine waits for before closing the user turn.
const TURN_SILENCE_MS: u32 = 500;

/// How long each socket task may take to stop on disconnect.
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Frames for the writer task's control lane.
enum Outgoing {
    Event(ClientEvent),
    Pong(Bytes),
}

/// Ids of `session.update` events not yet acknowledged, oldest first.
type PendingSessionUpdates = Arc<Mutex<VecDeque<String>>>;

pub struct RealtimeEngine {
    config: EngineConfig,
    voice: RealtimeVoice,
    connected: Arc<AtomicBool>,
    control_sender: Option<mpsc::Sender<Outgoing>>,
    audio_sender: Option<mpsc::Sender<ClientEvent>>,
    pending_session_updates: PendingSessionUpdates,
    /// Set once prior turns were replayed to the engine
    history_synced: AtomicBool,
    writer_handle: Option<JoinHandle<()>>,
    reader_handle: Option<JoinHandle<()>>,
}

impl RealtimeEngine {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        if config.api_key.is_empty() {
            return Err(EngineError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }
        let voice = RealtimeVoice::parse(&config.voice).ok_or_else(|| {
            let supported: Vec<&str> = RealtimeVoice::all().iter().map(|v| v.as_str()).collect();
            EngineError::InvalidConfiguration(format!(
                "Unsupported voice '{}', expected one of: {}",
                config.voice,
                supported.join(", ")
            ))
        })?;
        if config.input_sample_rate != REALTIME_SAMPLE_RATE
            || config.output_sample_rate != REALTIME_SAMPLE_RATE
        {
            warn!(
                input = config.input_sample_rate,
                output = config.output_sample_rate,
                "Realtime engines expect {} Hz PCM16",
                REALTIME_SAMPLE_RATE
            );
        }
        crate::utils::validate_engine_url(&config.url)
            .map_err(|e| EngineError::InvalidConfiguration(e.to_string()))?;

        Ok(Self {
            config,
            voice,
            connected: Arc::new(AtomicBool::new(false)),
            control_sender: None,
            audio_sender: None,
            pending_session_updates: Arc::new(Mutex::new(VecDeque::new())),
            history_synced: AtomicBool::new(false),
            writer_handle: None,
            reader_handle: None,
        })
    }

    fn model(&self) -> &str {
        self.config.model.as_deref().unwrap_or(REALTIME_DEFAULT_MODEL)
    }

    fn build_ws_url(&self) -> EngineResult<url::Url> {
        let mut url = url::Url::parse(&self.config.url)
            .map_err(|e| EngineError::InvalidConfiguration(e.to_string()))?;
        if !url.query_pairs().any(|(key, _)| key == "model") {
            url.query_pairs_mut().append_pair("model", self.model());
        }
        Ok(url)
    }

    fn build_request(&self, url: &url::Url) -> EngineResult<http::Request<()>> {
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(EngineError::InvalidConfiguration(
                    "Engine URL has no host".to_string(),
                ));
            }
        };

        http::Request::builder()
            .uri(url.as_str())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("OpenAI-Beta", "realtime=v1")
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            )
            .header("Sec-WebSocket-Version", "13")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", host)
            .body(())
            .map_err(|e| EngineError::ConnectionFailed(e.to_string()))
    }

    fn session_config(&self, context: &ContextFrame) -> SessionConfig {
        let tools = tool_defs(context);
        SessionConfig {
            modalities: Some(vec!["text".to_string(), "audio".to_string()]),
            instructions: context.system_instruction(),
            voice: Some(self.voice.as_str().to_string()),
            input_audio_format: Some(PCM16_FORMAT.to_string()),
            output_audio_format: Some(PCM16_FORMAT.to_string()),
            input_audio_transcription: Some(super::messages::InputAudioTranscription {
                model: "whisper-1".to_string(),
            }),
            turn_detection: Some(TurnDetection {
                silence_duration_ms: Some(TURN_SILENCE_MS),
                prefix_padding_ms: None,
                create_response: true,
                interrupt_response: false,
            }),
            tool_choice: (!tools.is_empty()).then(|| "auto".to_string()),
            tools: (!tools.is_empty()).then_some(tools),
        }
    }

    /// Queue an event on its lane: audio appends on the audio lane,
    /// everything else on the control lane.
    async fn send_event(&self, event: ClientEvent) -> EngineResult<()> {
        match event {
            ClientEvent::InputAudioBufferAppend { .. } => {
                let sender = self.audio_sender.as_ref().ok_or(EngineError::NotConnected)?;
                sender
                    .send(event)
                    .await
                    .map_err(|_| EngineError::NotConnected)
            }
            event => {
                let sender = self
                    .control_sender
                    .as_ref()
                    .ok_or(EngineError::NotConnected)?;
                sender
                    .send(Outgoing::Event(event))
                    .await
                    .map_err(|_| EngineError::NotConnected)
            }
        }
    }

    fn ensure_ready(&self) -> EngineResult<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(EngineError::NotConnected)
        }
    }
}

/// Per-connection translation state.
#[derive(Default)]
struct EventTranslator {
    output_sample_rate: u32,
    /// call_id -> function name, learned from `response.output_item.added`
    pending_function_calls: HashMap<String, String>,
    pending_session_updates: PendingSessionUpdates,
}

impl EventTranslator {
    fn translate(&mut self, event: ServerEvent) -> Option<EngineEvent> {
        match event {
            ServerEvent::SessionCreated { session } => {
                info!("Engine session created: {}", session.id);
                None
            }
            ServerEvent::SessionUpdated { session } => {
                self.pending_session_updates.lock().pop_front();
                debug!("Engine session updated: {}", session.id);
                None
            }
            ServerEvent::Error { error } => {
                error!(
                    code = ?error.code,
                    event_id = ?error.event_id,
                    "Engine error: {} - {}", error.error_type, error.message
                );
                // A rejected session.update leaves the engine without
                // instructions or tools.
                let rejects_session = error.event_id.as_deref().is_some_and(|id| {
                    let mut pending = self.pending_session_updates.lock();
                    let position = pending.iter().position(|pending_id| pending_id == id);
                    position.and_then(|i| pending.remove(i)).is_some()
                });
                Some(EngineEvent::Error {
                    message: format!("{}: {}", error.error_type, error.message),
                    fatal: rejects_session,
                })
            }
            ServerEvent::ResponseCreated { response } => Some(EngineEvent::ResponseStarted {
                response_id: response.id,
            }),
            ServerEvent::ResponseDone { response } => {
                debug!(status = ?response.status, "Response done: {:?}", response.id);
                Some(EngineEvent::ResponseDone {
                    response_id: response.id,
                })
            }
            ServerEvent::OutputItemAdded { item, .. } => {
                if item.item_type == "function_call"
                    && let (Some(call_id), Some(name)) = (item.call_id, item.name)
                {
                    debug!("Tracking function call: call_id={}, name={}", call_id, name);
                    self.pending_function_calls.insert(call_id, name);
                }
                None
            }
            ServerEvent::AudioDelta { response_id, delta } => {
                match BASE64_STANDARD.decode(&delta) {
                    Ok(pcm) => Some(EngineEvent::Audio {
                        frame: AudioFrame::outbound(Bytes::from(pcm), self.output_sample_rate),
                        response_id,
                    }),
                    Err(e) => {
                        warn!("Failed to decode audio delta: {}", e);
                        None
                    }
                }
            }
            ServerEvent::AudioTranscriptDone { transcript, .. } => Some(EngineEvent::Transcript {
                role: Role::Assistant,
                content: transcript,
            }),
            ServerEvent::TranscriptionCompleted { transcript } => Some(EngineEvent::Transcript {
                role: Role::User,
                content: transcript,
            }),
            ServerEvent::FunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
            } => {
                let tracked = self.pending_function_calls.remove(&call_id);
                let Some(name) = name.or(tracked) else {
                    warn!("Function name not found for call_id: {}", call_id);
                    return None;
                };
                Some(EngineEvent::ToolCall {
                    call_id,
                    name,
                    arguments,
                })
            }
            ServerEvent::Unknown => {
                trace!("Unhandled server event");
                None
            }
        }
    }
}

#[async_trait]
impl EngineAdapter for RealtimeEngine {
    async fn connect(&mut self) -> EngineResult<mpsc::Receiver<EngineEvent>> {
        if self.connected.load(Ordering::SeqCst) {
            return Err(EngineError::ConnectionFailed(
                "Engine already connected".to_string(),
            ));
        }

        let url = self.build_ws_url()?;
        let request = self.build_request(&url)?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| EngineError::ConnectionFailed(e.to_string()))?;

        info!(model = self.model(), voice = %self.voice, "Connected to realtime engine");

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let (control_tx, mut control_rx) = mpsc::channel::<Outgoing>(CONTROL_CHANNEL_CAPACITY);
        let (audio_tx, mut audio_rx) = mpsc::channel::<ClientEvent>(AUDIO_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<EngineEvent>(EVENT_CHANNEL_CAPACITY);

        self.pending_session_updates.lock().clear();
        self.history_synced.store(false, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        let mut translator = EventTranslator {
            output_sample_rate: self.config.output_sample_rate,
            pending_session_updates: self.pending_session_updates.clone(),
            ..Default::default()
        };

        // Neither task may keep the other's channel open: the pipeline sees
        // the engine as gone once the reader drops `event_tx`, and the writer
        // stops once the adapter drops its senders.
        let writer_events = event_tx.downgrade();
        let pong_sender = control_tx.downgrade();

        let connected = self.connected.clone();
        let writer = tokio::spawn(async move {
            loop {
                let outgoing = tokio::select! {
                    biased;
                    control = control_rx.recv() => control,
                    audio = audio_rx.recv() => audio.map(Outgoing::Event),
                };
                let Some(outgoing) = outgoing else {
                    debug!("Engine sender dropped, closing connection");
                    let _ = ws_sink.send(Message::Close(None)).await;
                    break;
                };

                let message = match outgoing {
                    Outgoing::Pong(data) => Message::Pong(data),
                    Outgoing::Event(event) => match serde_json::to_string(&event) {
                        Ok(json) => Message::Text(json.into()),
                        Err(e) => {
                            error!("Failed to serialize engine event: {}", e);
                            continue;
                        }
                    },
                };

                if let Err(e) = ws_sink.send(message).await {
                    error!("Failed to send engine message: {}", e);
                    if let Some(events) = writer_events.upgrade() {
                        let _ = events
                            .send(EngineEvent::Error {
                                message: e.to_string(),
                                fatal: true,
                            })
                            .await;
                    }
                    break;
                }
            }
            connected.store(false, Ordering::SeqCst);
            debug!("Engine writer task ended");
        });

        let connected = self.connected.clone();
        let reader = tokio::spawn(async move {
            while let Some(incoming) = ws_stream.next().await {
                match incoming {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            if let Some(event) = translator.translate(event)
                                && event_tx.send(event).await.is_err()
                            {
                                debug!("Engine event receiver dropped");
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to parse engine event: {}", e),
                    },
                    Ok(Message::Ping(data)) => {
                        if let Some(sender) = pong_sender.upgrade()
                            && sender.try_send(Outgoing::Pong(data)).is_err()
                        {
                            debug!("Control lane full, skipping pong");
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        info!("Engine closed connection: {:?}", frame);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("Engine WebSocket error: {}", e);
                        let _ = event_tx
                            .send(EngineEvent::Error {
                                message: e.to_string(),
                                fatal: true,
                            })
                            .await;
                        break;
                    }
                }
            }
            connected.store(false, Ordering::SeqCst);
            info!("Engine connection task ended");
        });

        self.control_sender = Some(control_tx);
        self.audio_sender = Some(audio_tx);
        self.writer_handle = Some(writer);
        self.reader_handle = Some(reader);
        Ok(event_rx)
    }

    /// Push instructions and tools through `session.update`. Prior turns are
    /// replayed only on the first sync of a connection; after that the
    /// engine's own conversation already holds every turn it heard or spoke.
    async fn send_context(&self, context: &ContextFrame) -> EngineResult<()> {
        self.ensure_ready()?;
        let event_id = format!("evt_{}", Uuid::new_v4().simple());
        self.pending_session_updates
            .lock()
            .push_back(event_id.clone());
        self.send_event(ClientEvent::SessionUpdate {
            event_id: Some(event_id),
            session: self.session_config(context),
        })
        .await?;

        if !self.history_synced.swap(true, Ordering::SeqCst) {
            for message in context.turns() {
                let item = ConversationItem::message(message.role, &message.content);
                self.send_event(ClientEvent::ConversationItemCreate { item })
                    .await?;
            }
        }
        Ok(())
    }

    async fn send_audio(&self, pcm: Bytes) -> EngineResult<()> {
        self.ensure_ready()?;
        self.send_event(ClientEvent::audio_append(&pcm)).await
    }

    async fn trigger_response(&self) -> EngineResult<()> {
        self.ensure_ready()?;
        self.send_event(ClientEvent::ResponseCreate).await
    }

    async fn interrupt(&self) -> EngineResult<()> {
        self.ensure_ready()?;
        self.send_event(ClientEvent::ResponseCancel).await
    }

    async fn submit_tool_result(&self, call_id: &str, result: &Value) -> EngineResult<()> {
        self.ensure_ready()?;
        let output = serde_json::to_string(result)
            .map_err(|e| EngineError::SerializationError(e.to_string()))?;
        self.send_event(ClientEvent::ConversationItemCreate {
            item: ConversationItem::function_output(call_id, output),
        })
        .await?;
        self.send_event(ClientEvent::ResponseCreate).await
    }

    async fn disconnect(&mut self) -> EngineResult<()> {
        // Dropping the senders lets the writer send a close frame and exit.
        self.control_sender = None;
        self.audio_sender = None;
        if let Some(handle) = self.writer_handle.take()
            && tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, handle).await.is_err()
        {
            warn!("Engine writer task did not stop in time");
        }
        if let Some(handle) = self.reader_handle.take() {
            let abort = handle.abort_handle();
            if tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, handle).await.is_err() {
                warn!("Engine reader task did not stop in time, aborting");
                abort.abort();
            }
        }
        self.connected.store(false, Ordering::SeqCst);
        info!("Disconnected from realtime engine");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.control_sender.is_some()
    }

    fn provider_name(&self) -> &'static str {
        "realtime"
    }
}

impl Drop for RealtimeEngine {
    fn drop(&mut self) {
        for handle in [self.writer_handle.take(), self.reader_handle.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frames::ContextMessage;
    use crate::core::tools::ToolDeclaration;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    fn config() -> EngineConfig {
        EngineConfig {
            provider: "realtime".to_string(),
            url: "wss://engine.example.com/v1/realtime".to_string(),
            api_key: "sk-test".to_string(),
            model: None,
            voice: "alloy".to_string(),
            input_sample_rate: 24000,
            output_sample_rate: 24000,
        }
    }

    fn translator() -> EventTranslator {
        EventTranslator {
            output_sample_rate: 24000,
            ..Default::default()
        }
    }

    fn parse(json: &str) -> ServerEvent {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_new_requires_api_key() {
        let mut config = config();
        config.api_key.clear();
        assert!(matches!(
            RealtimeEngine::new(config),
            Err(EngineError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_new_rejects_http_url() {
        let mut config = config();
        config.url = "https://engine.example.com".to_string();
        assert!(matches!(
            RealtimeEngine::new(config),
            Err(EngineError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_ws_url_appends_model() {
        let engine = RealtimeEngine::new(config()).unwrap();
        let url = engine.build_ws_url().unwrap();
        assert_eq!(
            url.as_str(),
            format!("wss://engine.example.com/v1/realtime?model={REALTIME_DEFAULT_MODEL}")
        );
        let request = engine.build_request(&url).unwrap();
        assert_eq!(request.headers()["Host"], "engine.example.com");
        assert_eq!(request.headers()["Authorization"], "Bearer sk-test");
    }

    #[test]
    fn test_session_config_from_context() {
        let engine = RealtimeEngine::new(config()).unwrap();
        let context = ContextFrame {
            messages: vec![ContextMessage::new(Role::System, "be brief")],
            tools: Arc::from(vec![ToolDeclaration::new("lookup", "Look up")]),
        };
        let session = engine.session_config(&context);
        assert_eq!(session.instructions.as_deref(), Some("be brief"));
        assert_eq!(session.voice.as_deref(), Some("alloy"));
        assert_eq!(session.tools.as_ref().map(Vec::len), Some(1));
        assert_eq!(session.tool_choice.as_deref(), Some("auto"));
        assert!(!session.turn_detection.unwrap().interrupt_response);
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let mut engine = RealtimeEngine::new(config()).unwrap();
        assert!(!engine.is_ready());
        assert!(matches!(
            engine.send_audio(Bytes::from_static(&[0, 0])).await,
            Err(EngineError::NotConnected)
        ));
        assert!(matches!(
            engine.trigger_response().await,
            Err(EngineError::NotConnected)
        ));
        assert!(engine.disconnect().await.is_ok());
    }

    #[test]
    fn test_translate_audio_delta() {
        let mut translator = translator();
        let event = translator.translate(parse(
            r#"{"type":"response.audio.delta","response_id":"resp_1","delta":"AQACAA=="}"#,
        ));
        match event {
            Some(EngineEvent::Audio { frame, response_id }) => {
                assert_eq!(frame.payload.as_ref(), &[1, 0, 2, 0]);
                assert_eq!(frame.sample_rate, 24000);
                assert_eq!(response_id.as_deref(), Some("resp_1"));
            }
            _ => panic!("Expected audio event"),
        }
    }

    #[test]
    fn test_translate_function_call_uses_tracked_name() {
        let mut translator = translator();
        assert!(
            translator
                .translate(parse(
                    r#"{"type":"response.output_item.added","response_id":"r","item":{"type":"function_call","call_id":"c1","name":"trackOrderTool"}}"#
                ))
                .is_none()
        );
        let event = translator.translate(parse(
            r#"{"type":"response.function_call_arguments.done","call_id":"c1","arguments":"{\"orderId\":\"1\"}"}"#,
        ));
        match event {
            Some(EngineEvent::ToolCall {
                call_id,
                name,
                arguments,
            }) => {
                assert_eq!(call_id, "c1");
                assert_eq!(name, "trackOrderTool");
                assert_eq!(arguments, r#"{"orderId":"1"}"#);
            }
            _ => panic!("Expected tool call"),
        }
        assert!(translator.pending_function_calls.is_empty());
    }

    #[test]
    fn test_translate_untracked_function_call_dropped() {
        let mut translator = translator();
        let event = translator.translate(parse(
            r#"{"type":"response.function_call_arguments.done","call_id":"c9","arguments":"{}"}"#,
        ));
        assert!(event.is_none());
    }

    #[test]
    fn test_translate_transcripts() {
        let mut translator = translator();
        match translator.translate(parse(
            r#"{"type":"conversation.item.input_audio_transcription.completed","item_id":"i","content_index":0,"transcript":"hello"}"#,
        )) {
            Some(EngineEvent::Transcript { role, content }) => {
                assert_eq!(role, Role::User);
                assert_eq!(content, "hello");
            }
            _ => panic!("Expected user transcript"),
        }
        match translator.translate(parse(
            r#"{"type":"response.audio_transcript.done","response_id":"r","transcript":"hi there"}"#,
        )) {
            Some(EngineEvent::Transcript { role, .. }) => assert_eq!(role, Role::Assistant),
            _ => panic!("Expected assistant transcript"),
        }
    }

    #[test]
    fn test_translate_error_is_not_fatal() {
        let mut translator = translator();
        match translator.translate(parse(
            r#"{"type":"error","error":{"type":"invalid_request_error","message":"bad"}}"#,
        )) {
            Some(EngineEvent::Error { message, fatal }) => {
                assert!(message.contains("bad"));
                assert!(!fatal);
            }
            _ => panic!("Expected error event"),
        }
    }

    #[test]
    fn test_new_rejects_unknown_voice() {
        let mut config = config();
        config.voice = "matthew".to_string();
        match RealtimeEngine::new(config) {
            Err(EngineError::InvalidConfiguration(message)) => {
                assert!(message.contains("matthew"));
                assert!(message.contains("alloy"));
            }
            _ => panic!("Expected invalid configuration"),
        }
    }

    #[test]
    fn test_error_answering_session_update_is_fatal() {
        let mut translator = translator();
        translator
            .pending_session_updates
            .lock()
            .push_back("evt_1".to_string());

        match translator.translate(parse(
            r#"{"type":"error","error":{"type":"invalid_request_error","message":"Invalid voice","event_id":"evt_1"}}"#,
        )) {
            Some(EngineEvent::Error { fatal, .. }) => assert!(fatal),
            _ => panic!("Expected error event"),
        }
        assert!(translator.pending_session_updates.lock().is_empty());

        // Errors caused by other events stay non-fatal
        match translator.translate(parse(
            r#"{"type":"error","error":{"type":"invalid_request_error","message":"no response","event_id":"evt_9"}}"#,
        )) {
            Some(EngineEvent::Error { fatal, .. }) => assert!(!fatal),
            _ => panic!("Expected error event"),
        }
    }

    #[test]
    fn test_session_updated_acknowledges_oldest_update() {
        let mut translator = translator();
        {
            let mut pending = translator.pending_session_updates.lock();
            pending.push_back("evt_1".to_string());
            pending.push_back("evt_2".to_string());
        }
        translator.translate(parse(r#"{"type":"session.updated","session":{"id":"s"}}"#));
        let pending = translator.pending_session_updates.lock();
        assert_eq!(pending.iter().collect::<Vec<_>>(), vec!["evt_2"]);
    }

    /// Fake engine that floods audio deltas at the client and reports the
    /// `type` of every event it receives.
    async fn spawn_flooding_engine(deltas: usize) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let socket = tokio_tungstenite::accept_async(stream).await.unwrap();
            let (mut sink, mut stream) = socket.split();

            tokio::spawn(async move {
                let delta = r#"{"type":"response.audio.delta","response_id":"r1","delta":"AAAA"}"#;
                for _ in 0..deltas {
                    if sink.send(Message::Text(delta.to_string().into())).await.is_err() {
                        break;
                    }
                }
            });

            while let Some(Ok(message)) = stream.next().await {
                if let Message::Text(text) = message {
                    let value: Value = serde_json::from_str(&text).unwrap();
                    let event_type = value["type"].as_str().unwrap_or_default().to_string();
                    let _ = seen_tx.send(event_type);
                }
            }
        });

        (addr, seen_rx)
    }

    fn local_engine(addr: SocketAddr) -> RealtimeEngine {
        let mut config = config();
        config.url = format!("ws://{addr}/v1/realtime");
        RealtimeEngine::new(config).unwrap()
    }

    async fn next_seen(seen: &mut mpsc::UnboundedReceiver<String>) -> String {
        tokio::time::timeout(Duration::from_secs(5), seen.recv())
            .await
            .expect("engine saw nothing")
            .expect("engine server ended")
    }

    #[tokio::test]
    async fn test_outgoing_events_flow_while_events_unread() {
        let (addr, mut seen) = spawn_flooding_engine(EVENT_CHANNEL_CAPACITY * 4).await;
        let mut engine = local_engine(addr);
        let events = engine.connect().await.unwrap();

        // Nobody reads `events`, so the reader task ends up blocked
        tokio::time::sleep(Duration::from_millis(200)).await;

        let sends = async {
            for _ in 0..AUDIO_CHANNEL_CAPACITY * 2 {
                engine.send_audio(Bytes::from_static(&[0, 0])).await.unwrap();
            }
            engine.interrupt().await.unwrap();
        };
        tokio::time::timeout(Duration::from_secs(5), sends)
            .await
            .expect("outgoing events stalled behind unread engine events");

        let mut appends = 0;
        loop {
            match next_seen(&mut seen).await.as_str() {
                "input_audio_buffer.append" => appends += 1,
                "response.cancel" => break,
                other => panic!("Unexpected event {other}"),
            }
        }
        assert!(appends <= AUDIO_CHANNEL_CAPACITY * 2);

        drop(events);
        engine.disconnect().await.unwrap();
        assert!(!engine.is_ready());
    }

    #[tokio::test]
    async fn test_history_replayed_on_first_sync_only() {
        let (addr, mut seen) = spawn_flooding_engine(0).await;
        let mut engine = local_engine(addr);
        let _events = engine.connect().await.unwrap();

        let context = ContextFrame {
            messages: vec![
                ContextMessage::new(Role::System, "be brief"),
                ContextMessage::new(Role::User, "hi"),
                ContextMessage::new(Role::Assistant, "hello"),
            ],
            tools: Arc::from(Vec::<ToolDeclaration>::new()),
        };
        engine.send_context(&context).await.unwrap();
        engine.send_context(&context).await.unwrap();
        engine.trigger_response().await.unwrap();

        let mut received = Vec::new();
        loop {
            let event_type = next_seen(&mut seen).await;
            let done = event_type == "response.create";
            received.push(event_type);
            if done {
                break;
            }
        }
        assert_eq!(
            received,
            vec![
                "session.update",
                "conversation.item.create",
                "conversation.item.create",
                "session.update",
                "response.create",
            ]
        );
        assert_eq!(engine.pending_session_updates.lock().len(), 2);

        engine.disconnect().await.unwrap();
    }
}
