//! Session orchestration.
//!
//! A [`Pipeline`] runs one conversation. Two stages execute concurrently:
//!
//! - inbound: client payload -> codec -> VAD / barge-in -> resampler -> engine
//! - outbound: engine event -> barge-in filter -> resampler -> codec -> client,
//!   with transcripts flowing through both aggregators and tool calls through
//!   the registry
//!
//! The first stage to finish ends the session. A clean end (client gone or
//! cancellation) releases the engine; a fault additionally closes the client
//! transport with 1011.
//!
//! Both stages share the engine through `&dyn EngineAdapter`; no lock is held
//! across an engine call.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::session::{PipelineSettings, SessionHooks, SessionSummary};
use crate::core::aggregators::{TranscriptAggregator, TurnAggregator};
use crate::core::engine::{BoxedEngine, EngineAdapter, EngineError, EngineEvent};
use crate::core::frames::{AudioFrame, Role};
use crate::core::resampler::StreamResampler;
use crate::core::tools::ToolRegistry;
use crate::core::transport::TransportOutput;
use crate::core::vad::{BargeInController, BargeInDecision, VADEvent, create_vad};
use crate::errors::{CLOSE_NORMAL, PipelineFault, PipelineResult};

#[derive(Debug, Default)]
struct SessionCounters {
    transcripts: AtomicU64,
    tool_calls: AtomicU64,
    discarded_audio: AtomicU64,
    malformed_inputs: AtomicU64,
}

pub struct Pipeline {
    session_id: String,
    settings: PipelineSettings,
    tools: Arc<ToolRegistry>,
    hooks: SessionHooks,
    barge_in: BargeInController,
    counters: SessionCounters,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings, tools: Arc<ToolRegistry>, hooks: SessionHooks) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            settings,
            tools,
            hooks,
            barge_in: BargeInController::new(),
            counters: SessionCounters::default(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Run the session to completion.
    ///
    /// `inbound` carries raw client payloads; its closing means the client
    /// disconnected. `cancel` stops the session from outside.
    pub async fn run(
        self,
        mut engine: BoxedEngine,
        mut inbound: mpsc::Receiver<Bytes>,
        output: TransportOutput,
        cancel: CancellationToken,
    ) -> PipelineResult<SessionSummary> {
        let session_id = self.session_id.clone();
        info!(session_id = %session_id, "Starting pipeline");

        let result = self
            .drive(&mut engine, &mut inbound, &output, &cancel)
            .await;

        // Stops whichever stage is still pending.
        cancel.cancel();
        self.release_engine(&mut engine).await;

        match &result {
            Ok(()) => {
                if !output.is_closed() {
                    let _ = output.close(CLOSE_NORMAL, "Session ended").await;
                }
            }
            Err(fault) => {
                error!(session_id = %session_id, "Pipeline fault: {}", fault);
                if let Err(e) = output.close(fault.close_code(), fault.close_reason()).await {
                    debug!(session_id = %session_id, "Could not send close frame: {}", e);
                }
            }
        }

        if let Some(callback) = &self.hooks.on_disconnect {
            callback(session_id.clone()).await;
        }

        let summary = self.summary();
        info!(
            session_id = %session_id,
            interruptions = summary.interruptions,
            transcripts = summary.transcripts,
            tool_calls = summary.tool_calls,
            "Pipeline finished"
        );
        result.map(|()| summary)
    }

    async fn drive(
        &self,
        engine: &mut BoxedEngine,
        inbound: &mut mpsc::Receiver<Bytes>,
        output: &TransportOutput,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        let events = engine.connect().await?;
        let engine: &dyn EngineAdapter = &**engine;
        info!(session_id = %self.session_id, "Engine connected");

        if let Some(callback) = &self.hooks.on_connect {
            callback(self.session_id.clone()).await;
        }

        let turns = TurnAggregator::new(
            self.settings.system_instruction.as_str(),
            self.tools.declarations(),
        );
        engine.send_context(&turns.snapshot()).await?;
        engine.trigger_response().await?;

        let mut transcripts = TranscriptAggregator::new(output.clone());
        if let Some(callback) = &self.hooks.on_transcript {
            transcripts = transcripts.with_callback(callback.clone());
        }

        tokio::select! {
            result = self.inbound_stage(inbound, engine, output, cancel) => result,
            result = self.outbound_stage(events, turns, transcripts, engine, output, cancel) => result,
        }
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    async fn inbound_stage(
        &self,
        inbound: &mut mpsc::Receiver<Bytes>,
        engine: &dyn EngineAdapter,
        output: &TransportOutput,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        let codec = *output.codec();
        let mut vad = create_vad(self.settings.vad.clone(), codec.sample_rate())
            .map_err(|e| PipelineFault::Stage(format!("VAD setup failed: {e}")))?;
        let mut resampler = StreamResampler::new();
        let engine_rate = self.settings.engine_input_sample_rate;

        loop {
            let payload = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                payload = inbound.recv() => payload,
            };
            let Some(payload) = payload else {
                info!(session_id = %self.session_id, "Client input closed");
                return Ok(());
            };

            let frame = match codec.deserialize(&payload) {
                Ok(frame) => frame,
                Err(e) => {
                    self.counters.malformed_inputs.fetch_add(1, Ordering::Relaxed);
                    warn!(session_id = %self.session_id, "Dropping malformed inbound payload: {}", e);
                    continue;
                }
            };

            for event in vad.process(&frame.payload) {
                match event {
                    VADEvent::SpeechStarted { pre_roll } => {
                        debug!(
                            session_id = %self.session_id,
                            pre_roll_bytes = pre_roll.len(),
                            "User speech started"
                        );
                        match self.barge_in.on_speech_started() {
                            BargeInDecision::Interrupt => self.interrupt(engine, output).await?,
                            BargeInDecision::Coalesced => {
                                debug!(session_id = %self.session_id, "Interruption already in flight")
                            }
                            BargeInDecision::Ignore => {}
                        }
                    }
                    VADEvent::SpeechStopped => {
                        debug!(session_id = %self.session_id, "User speech stopped");
                    }
                }
            }

            let pcm = resampler.push(&frame.payload, frame.sample_rate, engine_rate);
            if pcm.is_empty() {
                continue;
            }

            if engine.is_ready() {
                engine.send_audio(pcm).await?;
            } else {
                trace!(session_id = %self.session_id, "Engine not ready, dropping audio");
            }
        }
    }

    /// Stop playback, discard queued audio and cancel the engine response.
    async fn interrupt(
        &self,
        engine: &dyn EngineAdapter,
        output: &TransportOutput,
    ) -> PipelineResult<()> {
        info!(session_id = %self.session_id, "User barge-in, interrupting assistant");
        output.interrupt().await?;
        if let Err(e) = engine.interrupt().await {
            warn!(session_id = %self.session_id, "Engine interrupt failed: {}", e);
        }
        self.barge_in.complete_interruption();
        Ok(())
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    async fn outbound_stage(
        &self,
        mut events: mpsc::Receiver<EngineEvent>,
        mut turns: TurnAggregator,
        mut transcripts: TranscriptAggregator,
        engine: &dyn EngineAdapter,
        output: &TransportOutput,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        let client_rate = output.codec().sample_rate();
        let mut resampler = StreamResampler::new();
        let mut epoch = output.epoch();
        // History length the engine last received
        let mut synced_turns = turns.len();

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                event = events.recv() => event,
            };
            let Some(event) = event else {
                warn!(session_id = %self.session_id, "Engine event stream ended");
                return Err(PipelineFault::EngineClosed);
            };

            match event {
                EngineEvent::Audio { frame, response_id } => {
                    // Read before the barge-in check so an interruption racing
                    // with this chunk still invalidates it.
                    let observed = output.epoch();
                    if !self.barge_in.on_assistant_audio(response_id.as_deref()) {
                        self.counters.discarded_audio.fetch_add(1, Ordering::Relaxed);
                        trace!(session_id = %self.session_id, "Discarding audio from cancelled response");
                        continue;
                    }
                    // Leftover samples belong to the interrupted turn.
                    if observed != epoch {
                        epoch = observed;
                        resampler.reset();
                    }
                    let pcm = resampler.push(&frame.payload, frame.sample_rate, client_rate);
                    if pcm.is_empty() {
                        continue;
                    }
                    let frame = AudioFrame::outbound(pcm, client_rate);
                    let playback = Duration::from_millis(frame.duration_ms());
                    output.send_audio_at(frame, observed).await?;
                    self.barge_in.on_audio_forwarded(playback);
                }
                EngineEvent::Transcript { role, content } => {
                    let frame = transcripts.emit(role, &content).await;
                    self.counters.transcripts.fetch_add(1, Ordering::Relaxed);
                    match role {
                        Role::User => turns.append_user(&frame.content),
                        Role::Assistant => turns.append_assistant(&frame.content),
                        Role::System => {}
                    }
                }
                EngineEvent::ToolCall {
                    call_id,
                    name,
                    arguments,
                } => {
                    self.counters.tool_calls.fetch_add(1, Ordering::Relaxed);
                    info!(session_id = %self.session_id, tool = %name, call_id = %call_id, "Tool call requested");
                    let result = self.tools.invoke_or_error(&name, &arguments).await;
                    engine.submit_tool_result(&call_id, &result).await?;
                }
                EngineEvent::ResponseStarted { response_id } => {
                    debug!(session_id = %self.session_id, response_id = ?response_id, "Response started");
                }
                EngineEvent::ResponseDone { response_id } => {
                    debug!(session_id = %self.session_id, response_id = ?response_id, "Response done");
                    self.barge_in.on_response_done(response_id.as_deref());
                    if turns.len() != synced_turns {
                        debug!(session_id = %self.session_id, turns = turns.len(), "Syncing context after exchange");
                        engine.send_context(&turns.snapshot()).await?;
                        synced_turns = turns.len();
                    }
                }
                EngineEvent::Error { message, fatal } => {
                    if fatal {
                        return Err(PipelineFault::Engine(EngineError::ProviderError(message)));
                    }
                    warn!(session_id = %self.session_id, "Engine reported error: {}", message);
                }
            }
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    async fn release_engine(&self, engine: &mut BoxedEngine) {
        if engine.is_ready()
            && let Err(e) = engine.interrupt().await
        {
            debug!(session_id = %self.session_id, "Engine interrupt on teardown failed: {}", e);
        }
        if let Err(e) = engine.disconnect().await {
            error!(session_id = %self.session_id, "Failed to disconnect engine: {:?}", e);
        }
    }

    fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            interruptions: self.barge_in.interruption_count(),
            coalesced_interruptions: self.barge_in.coalesced_count(),
            transcripts: self.counters.transcripts.load(Ordering::Relaxed),
            tool_calls: self.counters.tool_calls.load(Ordering::Relaxed),
            discarded_audio: self.counters.discarded_audio.load(Ordering::Relaxed),
            malformed_inputs: self.counters.malformed_inputs.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("session_id", &self.session_id)
            .field("settings", &self.settings)
            .field("hooks", &self.hooks)
            .finish()
    }
}
