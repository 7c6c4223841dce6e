//! Outbound scheduler: collects the messages of one synchronous turn.

use serde_json::Value;
use tether_proto::Frame;

/// Ordered list of messages waiting for the next flush.
///
/// Everything queued within one turn (one inbound dispatch cycle, one
/// explicit batch, or one public API call) leaves the peer as a single
/// wire frame, in enqueue order.
#[derive(Debug, Default)]
pub(crate) struct OutboundQueue {
    pending: Vec<Value>,
}

impl OutboundQueue {
    /// Appends a message to the pending list.
    pub(crate) fn push(&mut self, message: Value) {
        self.pending.push(message);
    }

    /// Takes every pending message and shapes the outbound frame.
    ///
    /// Returns `None` when nothing is pending; the queue is empty
    /// afterwards either way.
    pub(crate) fn drain(&mut self) -> Option<Frame> {
        Frame::from_messages(std::mem::take(&mut self.pending))
    }

    /// Whether any message is pending.
    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
