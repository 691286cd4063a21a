//! Client WebSocket handler
//!
//! Authenticates the upgrade, then wires the socket to a [`Pipeline`]: a
//! reader task feeds raw payloads into the inbound channel and a writer task
//! drains the two outbound lanes onto the socket.

use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::Response,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::codec::ProtocolCodec;
use crate::core::pipeline::Pipeline;
use crate::core::transport::{self, OutboundMessage, TransportReceiver};
use crate::errors::{AuthError, PipelineFault};
use crate::state::AppState;

use super::auth::{authorize_subprotocol, offered_subprotocols};

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// How long the writer may take to flush the close frame after the session ends
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Client WebSocket handler
///
/// The shared secret must be among the offered subprotocols. A rejected
/// client still gets a completed upgrade, echoing its first offer, so it can
/// read the 1008 close code.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let ws = ws
        .max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE);

    let offered = match offered_subprotocols(&headers) {
        Ok(offered) => offered,
        Err(e) => {
            warn!("Rejecting WebSocket connection: {}", e);
            return ws.on_upgrade(move |socket| reject_socket(socket, e));
        }
    };

    match authorize_subprotocol(&offered, &state.config.api_key) {
        Ok(token) => {
            info!("WebSocket connection authorized");
            ws.protocols([token])
                .on_upgrade(move |socket| handle_session(socket, state))
        }
        Err(e) => {
            warn!(offered = offered.len(), "Rejecting WebSocket connection: {}", e);
            let ws = match offered.into_iter().next() {
                Some(first) => ws.protocols([first]),
                None => ws,
            };
            ws.on_upgrade(move |socket| reject_socket(socket, e))
        }
    }
}

/// Close an unauthenticated socket without creating any session state.
async fn reject_socket(mut socket: WebSocket, reason: AuthError) {
    let frame = CloseFrame {
        code: reason.close_code(),
        reason: Utf8Bytes::from_static(reason.close_reason()),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!("Failed to send auth close frame: {}", e);
    }
}

/// Run one authenticated session to completion.
async fn handle_session(socket: WebSocket, state: Arc<AppState>) {
    let settings = state.config.pipeline_settings();
    let codec = ProtocolCodec::new(settings.client_sample_rate);
    let (output, receiver) = transport::channel(codec, settings.channel_capacity);
    let (inbound_tx, inbound_rx) = mpsc::channel::<Bytes>(settings.channel_capacity);
    let cancel = CancellationToken::new();

    let (sender, stream) = socket.split();
    let writer = tokio::spawn(write_outbound(sender, receiver));

    let engine = match (state.engine_factory)(&state.config.engine) {
        Ok(engine) => engine,
        Err(e) => {
            let fault = PipelineFault::Engine(e);
            error!("Failed to create engine: {}", fault);
            let _ = output.close(fault.close_code(), fault.close_reason()).await;
            drop(output);
            finish_writer(writer).await;
            return;
        }
    };

    let reader = tokio::spawn(read_inbound(stream, inbound_tx, cancel.clone()));

    let pipeline = Pipeline::new(settings, state.tools.clone(), state.hooks.clone());
    let session_id = pipeline.session_id().to_string();
    info!(session_id = %session_id, provider = engine.provider_name(), "Session opened");

    match pipeline.run(engine, inbound_rx, output, cancel.clone()).await {
        Ok(summary) => info!(session_id = %session_id, summary = ?summary, "Session closed"),
        Err(e) => warn!(session_id = %session_id, "Session ended with fault: {}", e),
    }

    cancel.cancel();
    if let Err(e) = reader.await {
        debug!(session_id = %session_id, "Reader task ended abnormally: {}", e);
    }
    finish_writer(writer).await;
    info!(session_id = %session_id, "WebSocket connection terminated");
}

/// Forward client frames to the pipeline until the client leaves or the
/// session is cancelled.
async fn read_inbound(
    mut stream: futures::stream::SplitStream<WebSocket>,
    inbound_tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = stream.next() => next,
        };

        let payload = match next {
            Some(Ok(Message::Text(text))) => Bytes::copy_from_slice(text.as_str().as_bytes()),
            Some(Ok(Message::Binary(data))) => data,
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => {
                info!("WebSocket connection closed by client");
                break;
            }
            Some(Err(e)) => {
                warn!("WebSocket error: {}", e);
                break;
            }
        };

        if inbound_tx.send(payload).await.is_err() {
            break;
        }
    }
}

/// Write outbound messages until a close frame has been sent or the
/// transport is dropped.
async fn write_outbound(
    mut sender: futures::stream::SplitSink<WebSocket, Message>,
    mut receiver: TransportReceiver,
) {
    while let Some(message) = receiver.recv().await {
        let should_close = matches!(message, OutboundMessage::Close { .. });

        let message = match message {
            OutboundMessage::Text(text) => Message::Text(text.into()),
            OutboundMessage::Close { code, reason } => {
                info!(code, reason = %reason, "Closing WebSocket connection");
                Message::Close(Some(CloseFrame {
                    code,
                    reason: reason.into(),
                }))
            }
        };

        if let Err(e) = sender.send(message).await {
            debug!("Failed to send WebSocket message: {}", e);
            break;
        }

        if should_close {
            break;
        }
    }

    let dropped = receiver.dropped_audio();
    if dropped > 0 {
        debug!(dropped, "Discarded stale outbound audio");
    }
}

async fn finish_writer(writer: tokio::task::JoinHandle<()>) {
    let abort = writer.abort_handle();
    match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Writer task ended abnormally: {}", e),
        Err(_) => {
            warn!("Writer task did not finish in time, aborting");
            abort.abort();
        }
    }
}
