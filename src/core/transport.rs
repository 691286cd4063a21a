//! Outbound side of the client transport.
//!
//! The pipeline writes frames through a [`TransportOutput`]; the WebSocket
//! writer task drains the matching [`TransportReceiver`]. Control and
//! transcript messages travel on a priority lane. Audio travels on its own
//! lane and every entry is tagged with the interruption epoch current when it
//! was queued. [`TransportOutput::interrupt`] bumps the epoch, so audio queued
//! before the interruption is dropped by the receiver instead of being played.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::select;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::codec::ProtocolCodec;
use super::frames::{AudioFrame, ControlKind, Frame};
use crate::errors::{PipelineFault, PipelineResult};

/// Message handed to the WebSocket writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Debug)]
struct QueuedAudio {
    epoch: u64,
    text: String,
}

enum Lane {
    Priority(Option<OutboundMessage>),
    Audio(Option<QueuedAudio>),
}

/// Create a connected output/receiver pair. `capacity` bounds each lane.
pub fn channel(codec: ProtocolCodec, capacity: usize) -> (TransportOutput, TransportReceiver) {
    let capacity = capacity.max(1);
    let (priority_tx, priority_rx) = mpsc::channel(capacity);
    let (audio_tx, audio_rx) = mpsc::channel(capacity);
    let epoch = Arc::new(AtomicU64::new(0));
    let dropped = Arc::new(AtomicU64::new(0));

    let output = TransportOutput {
        codec,
        priority_tx,
        audio_tx,
        epoch: epoch.clone(),
    };
    let receiver = TransportReceiver {
        priority_rx,
        audio_rx,
        epoch,
        dropped,
    };
    (output, receiver)
}

/// Cloneable writer half used by pipeline stages.
#[derive(Debug, Clone)]
pub struct TransportOutput {
    codec: ProtocolCodec,
    priority_tx: mpsc::Sender<OutboundMessage>,
    audio_tx: mpsc::Sender<QueuedAudio>,
    epoch: Arc<AtomicU64>,
}

impl TransportOutput {
    pub fn codec(&self) -> &ProtocolCodec {
        &self.codec
    }

    /// Current interruption epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Serialize and queue a frame. Frames without a wire form are skipped.
    pub async fn send_frame(&self, frame: &Frame) -> PipelineResult<()> {
        let Some(text) = self.codec.serialize(frame) else {
            trace!("Frame has no wire representation, skipping");
            return Ok(());
        };

        match frame {
            Frame::Audio(_) => {
                let queued = QueuedAudio {
                    epoch: self.epoch(),
                    text,
                };
                self.audio_tx
                    .send(queued)
                    .await
                    .map_err(|_| PipelineFault::TransportClosed)
            }
            _ => self.send_text(text).await,
        }
    }

    /// Queue audio tagged with an epoch observed earlier. If an interruption
    /// happened since, the audio is discarded by the receiver.
    pub async fn send_audio_at(&self, frame: AudioFrame, epoch: u64) -> PipelineResult<()> {
        let Some(text) = self.codec.serialize(&Frame::Audio(frame)) else {
            return Ok(());
        };
        self.audio_tx
            .send(QueuedAudio { epoch, text })
            .await
            .map_err(|_| PipelineFault::TransportClosed)
    }

    /// Queue a pre-serialized message on the priority lane.
    pub async fn send_text(&self, text: String) -> PipelineResult<()> {
        self.priority_tx
            .send(OutboundMessage::Text(text))
            .await
            .map_err(|_| PipelineFault::TransportClosed)
    }

    /// Invalidate all queued audio and tell the client to stop playback.
    pub async fn interrupt(&self) -> PipelineResult<()> {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(epoch, "Transport interrupted, discarding queued audio");
        self.send_frame(&Frame::Control(ControlKind::Interruption))
            .await
    }

    pub async fn close(&self, code: u16, reason: impl Into<String>) -> PipelineResult<()> {
        self.priority_tx
            .send(OutboundMessage::Close {
                code,
                reason: reason.into(),
            })
            .await
            .map_err(|_| PipelineFault::TransportClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.priority_tx.is_closed()
    }
}

/// Reader half drained by the WebSocket writer task.
#[derive(Debug)]
pub struct TransportReceiver {
    priority_rx: mpsc::Receiver<OutboundMessage>,
    audio_rx: mpsc::Receiver<QueuedAudio>,
    epoch: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl TransportReceiver {
    /// Next message to write. Priority messages are always preferred and
    /// stale audio is skipped. Returns `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<OutboundMessage> {
        loop {
            let next = select! {
                biased;

                message = self.priority_rx.recv() => Lane::Priority(message),
                queued = self.audio_rx.recv() => Lane::Audio(queued),
            };

            match next {
                Lane::Priority(Some(message)) => return Some(message),
                Lane::Priority(None) => return self.drain_audio(),
                Lane::Audio(Some(queued)) => {
                    if let Some(text) = self.accept(queued) {
                        return Some(OutboundMessage::Text(text));
                    }
                }
                Lane::Audio(None) => return self.priority_rx.recv().await,
            }
        }
    }

    /// Audio entries discarded because an interruption superseded them.
    pub fn dropped_audio(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    fn accept(&self, queued: QueuedAudio) -> Option<String> {
        if queued.epoch < self.epoch.load(Ordering::SeqCst) {
            self.dropped.fetch_add(1, Ordering::SeqCst);
            trace!(epoch = queued.epoch, "Dropping stale audio");
            return None;
        }
        Some(queued.text)
    }

    fn drain_audio(&mut self) -> Option<OutboundMessage> {
        while let Ok(queued) = self.audio_rx.try_recv() {
            if let Some(text) = self.accept(queued) {
                return Some(OutboundMessage::Text(text));
            }
        }
        None
    }
}
