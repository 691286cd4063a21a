//! Barge-in decision logic.
//!
//! The controller is shared by the inbound stage (which reports speech starts)
//! and the outbound stage (which reports assistant playback and response
//! boundaries). It guarantees that at most one interruption is in flight per
//! session.
//!
//! The engine finishes generating long before the client finishes playing,
//! so the assistant counts as speaking until the playback deadline of the
//! audio already sent has passed, not only until `response.done`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// What the pipeline must do in response to a speech start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BargeInDecision {
    /// The assistant is silent; nothing to interrupt.
    Ignore,
    /// Start a new interruption.
    Interrupt,
    /// An interruption is already in flight.
    Coalesced,
}

#[derive(Debug, Default)]
pub struct BargeInController {
    assistant_speaking: AtomicBool,
    interruption_in_flight: AtomicBool,
    interruptions: AtomicU64,
    coalesced: AtomicU64,
    active_response: Mutex<Option<String>>,
    cancelled_responses: Mutex<HashSet<String>>,
    /// When the client finishes playing the audio forwarded so far
    playback_until: Mutex<Option<Instant>>,
}

impl BargeInController {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a response is generating or its audio is still playing
    /// on the client.
    pub fn is_assistant_speaking(&self) -> bool {
        self.assistant_speaking.load(Ordering::SeqCst) || self.is_playing_back()
    }

    fn is_playing_back(&self) -> bool {
        self.playback_until
            .lock()
            .is_some_and(|until| until > Instant::now())
    }

    /// Extend the playback deadline by audio just handed to the client.
    /// Chunks play back to back, so a chunk sent while earlier audio is still
    /// playing starts when that audio ends.
    pub fn on_audio_forwarded(&self, duration: Duration) {
        let now = Instant::now();
        let mut until = self.playback_until.lock();
        let start = until.filter(|t| *t > now).unwrap_or(now);
        *until = Some(start + duration);
    }

    pub fn interruption_in_flight(&self) -> bool {
        self.interruption_in_flight.load(Ordering::SeqCst)
    }

    /// Interruptions started over the lifetime of the session.
    pub fn interruption_count(&self) -> u64 {
        self.interruptions.load(Ordering::SeqCst)
    }

    /// Speech starts absorbed by an interruption already in flight.
    pub fn coalesced_count(&self) -> u64 {
        self.coalesced.load(Ordering::SeqCst)
    }

    /// Called for every speech start reported by the detector.
    pub fn on_speech_started(&self) -> BargeInDecision {
        if !self.is_assistant_speaking() {
            return BargeInDecision::Ignore;
        }

        match self.interruption_in_flight.compare_exchange(
            false,
            true,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {
                self.interruptions.fetch_add(1, Ordering::SeqCst);
                let cancelled = self.active_response.lock().take();
                if let Some(id) = cancelled {
                    debug!(response_id = %id, "Cancelling active response");
                    self.cancelled_responses.lock().insert(id);
                }
                BargeInDecision::Interrupt
            }
            Err(_) => {
                self.coalesced.fetch_add(1, Ordering::SeqCst);
                BargeInDecision::Coalesced
            }
        }
    }

    /// Called once downstream cancellation for the current interruption has
    /// finished.
    pub fn complete_interruption(&self) {
        *self.playback_until.lock() = None;
        self.assistant_speaking.store(false, Ordering::SeqCst);
        self.interruption_in_flight.store(false, Ordering::SeqCst);
    }

    /// Record assistant audio about to be played. Returns `false` if the audio
    /// belongs to a cancelled response or arrives while an interruption is in
    /// flight, in which case it must be dropped.
    pub fn on_assistant_audio(&self, response_id: Option<&str>) -> bool {
        if let Some(id) = response_id
            && self.cancelled_responses.lock().contains(id)
        {
            return false;
        }
        if self.interruption_in_flight() {
            return false;
        }

        if let Some(id) = response_id {
            let mut active = self.active_response.lock();
            if active.as_deref() != Some(id) {
                *active = Some(id.to_string());
            }
        }
        self.assistant_speaking.store(true, Ordering::SeqCst);
        true
    }

    /// Whether events tagged with this response id should be discarded.
    pub fn is_cancelled(&self, response_id: &str) -> bool {
        self.cancelled_responses.lock().contains(response_id)
    }

    /// The engine finished generating a response. Audio already sent keeps
    /// the assistant speaking until its playback deadline.
    pub fn on_response_done(&self, response_id: Option<&str>) {
        let mut active = self.active_response.lock();
        let matches = match (response_id, active.as_deref()) {
            (Some(done), Some(current)) => done == current,
            _ => true,
        };
        if matches {
            *active = None;
            self.assistant_speaking.store(false, Ordering::SeqCst);
        }
        if let Some(id) = response_id {
            self.cancelled_responses.lock().remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignore_when_assistant_silent() {
        let controller = BargeInController::new();
        assert_eq!(controller.on_speech_started(), BargeInDecision::Ignore);
        assert_eq!(controller.interruption_count(), 0);
    }

    #[test]
    fn test_single_interruption_is_coalesced() {
        let controller = BargeInController::new();
        assert!(controller.on_assistant_audio(Some("resp_1")));

        assert_eq!(controller.on_speech_started(), BargeInDecision::Interrupt);
        assert_eq!(controller.on_speech_started(), BargeInDecision::Coalesced);
        assert_eq!(controller.interruption_count(), 1);
        assert_eq!(controller.coalesced_count(), 1);

        controller.complete_interruption();
        assert!(!controller.interruption_in_flight());
        assert!(!controller.is_assistant_speaking());
        assert_eq!(controller.on_speech_started(), BargeInDecision::Ignore);
    }

    #[test]
    fn test_late_audio_from_cancelled_response_is_dropped() {
        let controller = BargeInController::new();
        controller.on_assistant_audio(Some("resp_1"));
        controller.on_speech_started();

        // Dropped while the interruption is in flight
        assert!(!controller.on_assistant_audio(Some("resp_2")));

        controller.complete_interruption();
        assert!(!controller.on_assistant_audio(Some("resp_1")));
        assert!(controller.is_cancelled("resp_1"));

        // A fresh response plays normally
        assert!(controller.on_assistant_audio(Some("resp_2")));
        assert!(controller.is_assistant_speaking());
    }

    #[test]
    fn test_response_done_clears_speaking() {
        let controller = BargeInController::new();
        controller.on_assistant_audio(Some("resp_1"));

        controller.on_response_done(Some("other"));
        assert!(controller.is_assistant_speaking());

        controller.on_response_done(Some("resp_1"));
        assert!(!controller.is_assistant_speaking());
    }

    #[test]
    fn test_playback_outlives_response_done() {
        let controller = BargeInController::new();
        controller.on_assistant_audio(Some("resp_1"));
        controller.on_audio_forwarded(Duration::from_secs(2));
        controller.on_response_done(Some("resp_1"));

        assert!(controller.is_assistant_speaking());
        assert_eq!(controller.on_speech_started(), BargeInDecision::Interrupt);

        controller.complete_interruption();
        assert!(!controller.is_assistant_speaking());
    }

    #[test]
    fn test_forwarded_audio_accumulates() {
        let controller = BargeInController::new();
        for _ in 0..50 {
            controller.on_audio_forwarded(Duration::from_millis(20));
        }
        let until = (*controller.playback_until.lock()).expect("deadline set");
        assert!(until >= Instant::now() + Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_playback_deadline_expires() {
        let controller = BargeInController::new();
        controller.on_audio_forwarded(Duration::from_millis(20));
        assert!(controller.is_assistant_speaking());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!controller.is_assistant_speaking());
        assert_eq!(controller.on_speech_started(), BargeInDecision::Ignore);
    }

    #[test]
    fn test_response_done_forgets_cancelled_id() {
        let controller = BargeInController::new();
        controller.on_assistant_audio(Some("resp_1"));
        controller.on_speech_started();
        controller.complete_interruption();
        assert!(controller.is_cancelled("resp_1"));

        controller.on_response_done(Some("resp_1"));
        assert!(!controller.is_cancelled("resp_1"));
    }
}
