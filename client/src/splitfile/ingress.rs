use crate::Parent;
use futures::channel::mpsc;

/// Message types that can be sent to the `Mailbox`
pub enum Message {
    /// A segment computed its check blocks.
    Encoded(u32),

    /// Every block of a segment was assigned a key.
    HasKeys(u32),

    /// A segment reached its terminal outcome.
    Finished(u32),

    /// Abort the insertion of the payload.
    Cancel,
}

/// Ingress mailbox for [`Engine`](super::Engine).
///
/// Segments report to the engine through the [Parent] implementation of the mailbox.
#[derive(Clone)]
pub struct Mailbox {
    sender: mpsc::UnboundedSender<Message>,
}

impl Mailbox {
    pub(super) fn new(sender: mpsc::UnboundedSender<Message>) -> Self {
        Self { sender }
    }

    /// Cancel the insertion of the payload.
    ///
    /// Has no effect once the insertion has completed.
    pub fn cancel(&self) {
        let _ = self.sender.unbounded_send(Message::Cancel);
    }
}

impl Parent for Mailbox {
    fn segment_encoded(&self, segment: u32) {
        let _ = self.sender.unbounded_send(Message::Encoded(segment));
    }

    fn segment_has_keys(&self, segment: u32) {
        let _ = self.sender.unbounded_send(Message::HasKeys(segment));
    }

    fn segment_finished(&self, segment: u32) {
        let _ = self.sender.unbounded_send(Message::Finished(segment));
    }
}
