use std::collections::VecDeque;

/// Ordered queue of serialized signaling payloads awaiting transmission.
///
/// Producers append; the conductor's drain routine peeks the head and removes
/// it only once the relay has accepted the hand-off, so a transient failure
/// leaves the queue position untouched for the next drain trigger.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    pending: VecDeque<String>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, payload: String) {
        self.pending.push_back(payload);
    }

    pub fn front(&self) -> Option<&str> {
        self.pending.front().map(String::as_str)
    }

    /// Remove the head payload. Called only after the transport accepted it.
    pub fn pop(&mut self) -> Option<String> {
        self.pending.pop_front()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
