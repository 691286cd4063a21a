//! Finalized-utterance fan-out to the client, the log, and a session hook.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{info, warn};

use crate::core::frames::{Frame, Role, TranscriptFrame};
use crate::core::transport::TransportOutput;

/// Hook invoked for every transcript, after it was forwarded to the client.
pub type TranscriptCallback =
    Arc<dyn Fn(TranscriptFrame) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct TranscriptAggregator {
    output: TransportOutput,
    on_transcript: Option<TranscriptCallback>,
    emitted: u64,
}

impl TranscriptAggregator {
    pub fn new(output: TransportOutput) -> Self {
        Self {
            output,
            on_transcript: None,
            emitted: 0,
        }
    }

    pub fn with_callback(mut self, callback: TranscriptCallback) -> Self {
        self.on_transcript = Some(callback);
        self
    }

    /// Stamp, log and forward one utterance exactly as the engine produced it.
    /// Blank filtering belongs to the turn history, not the client feed.
    ///
    /// A failed send is logged and otherwise ignored; transport loss surfaces
    /// through the session's own shutdown path.
    pub async fn emit(&mut self, role: Role, content: &str) -> TranscriptFrame {
        let frame = TranscriptFrame::now(role, content);
        info!("Transcript: [{}] {}: {}", frame.timestamp, frame.role, frame.content);

        if let Err(e) = self
            .output
            .send_frame(&Frame::Transcript(frame.clone()))
            .await
        {
            warn!("Failed to forward transcript to client: {}", e);
        }
        self.emitted += 1;

        if let Some(callback) = &self.on_transcript {
            callback(frame.clone()).await;
        }
        frame
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

impl std::fmt::Debug for TranscriptAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptAggregator")
            .field("emitted", &self.emitted)
            .field("has_callback", &self.on_transcript.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::ProtocolCodec;
    use crate::core::transport::{self, OutboundMessage};
    use parking_lot::Mutex;

    #[tokio::test]
    async fn test_transcripts_forwarded_in_order() {
        let (output, mut receiver) = transport::channel(ProtocolCodec::new(16000), 8);
        let mut aggregator = TranscriptAggregator::new(output);

        aggregator.emit(Role::User, "what time is it").await;
        aggregator.emit(Role::Assistant, "It is noon.").await;

        let mut seen = Vec::new();
        for _ in 0..2 {
            match receiver.recv().await {
                Some(OutboundMessage::Text(text)) => {
                    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                    assert_eq!(value["event"], "transcript");
                    seen.push((
                        value["role"].as_str().unwrap().to_string(),
                        value["content"].as_str().unwrap().to_string(),
                    ));
                }
                _ => panic!("Expected transcript text"),
            }
        }
        assert_eq!(
            seen,
            vec![
                ("user".to_string(), "what time is it".to_string()),
                ("assistant".to_string(), "It is noon.".to_string()),
            ]
        );
        assert_eq!(aggregator.emitted(), 2);
    }

    #[tokio::test]
    async fn test_callback_receives_frame() {
        let (output, _receiver) = transport::channel(ProtocolCodec::new(16000), 8);
        let captured: Arc<Mutex<Vec<TranscriptFrame>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = captured.clone();
        let callback: TranscriptCallback = Arc::new(move |frame: TranscriptFrame| {
            let sink = sink.clone();
            Box::pin(async move {
                sink.lock().push(frame);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });

        let mut aggregator = TranscriptAggregator::new(output).with_callback(callback);
        aggregator.emit(Role::User, "hello").await;

        let captured = captured.lock();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].content, "hello");
        assert_eq!(captured[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_content_forwarded_unchanged() {
        let (output, mut receiver) = transport::channel(ProtocolCodec::new(16000), 8);
        let mut aggregator = TranscriptAggregator::new(output);

        let frame = aggregator.emit(Role::Assistant, "  Thanks  ").await;
        assert_eq!(frame.content, "  Thanks  ");
        aggregator.emit(Role::User, "   ").await;

        for expected in ["  Thanks  ", "   "] {
            match receiver.recv().await {
                Some(OutboundMessage::Text(text)) => {
                    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                    assert_eq!(value["content"], expected);
                }
                _ => panic!("Expected transcript text"),
            }
        }
        assert_eq!(aggregator.emitted(), 2);
    }

    #[tokio::test]
    async fn test_closed_transport_still_counts() {
        let (output, receiver) = transport::channel(ProtocolCodec::new(16000), 8);
        let mut aggregator = TranscriptAggregator::new(output);

        drop(receiver);
        let frame = aggregator.emit(Role::User, "still logged").await;
        assert_eq!(frame.content, "still logged");
        assert_eq!(aggregator.emitted(), 1);
    }
}
