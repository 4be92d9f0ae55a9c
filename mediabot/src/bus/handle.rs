//! Actor handle for non-blocking message passing.
//!
//! Delivery on the bus is fire-and-forget: a full or closed mailbox is
//! reported to the caller as a [`SendError`] and never blocks it.

use std::fmt;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default mailbox capacity for actors.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Why an envelope could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("actor has stopped")]
    ActorStopped,
    #[error("mailbox is full")]
    MailboxFull,
}

impl<T> From<mpsc::error::TrySendError<T>> for SendError {
    fn from(err: mpsc::error::TrySendError<T>) -> Self {
        match err {
            mpsc::error::TrySendError::Full(_) => SendError::MailboxFull,
            mpsc::error::TrySendError::Closed(_) => SendError::ActorStopped,
        }
    }
}

/// Identity of a running actor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorMetadata {
    pub component: &'static str,
    /// Incremented every time the slot is rebuilt.
    pub generation: u64,
}

impl ActorMetadata {
    pub fn new(component: &'static str, generation: u64) -> Self {
        Self {
            component,
            generation,
        }
    }
}

/// A handle to an actor's mailbox.
pub struct ActorHandle<M> {
    sender: mpsc::Sender<M>,
    cancellation_token: CancellationToken,
    /// Actor metadata.
    pub metadata: ActorMetadata,
    max_capacity: usize,
}

impl<M> ActorHandle<M> {
    pub fn new(
        sender: mpsc::Sender<M>,
        cancellation_token: CancellationToken,
        metadata: ActorMetadata,
    ) -> Self {
        let max_capacity = sender.max_capacity();
        Self {
            sender,
            cancellation_token,
            metadata,
            max_capacity,
        }
    }

    /// Try to send a message without blocking.
    ///
    /// Returns immediately with an error if the mailbox is full or closed.
    pub fn try_send(&self, msg: M) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(SendError::from)
    }

    /// `(free slots, capacity)` of the mailbox.
    pub fn mailbox_capacity(&self) -> (usize, usize) {
        (self.sender.capacity(), self.max_capacity)
    }

    /// Whether the receiving side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub fn component(&self) -> &'static str {
        self.metadata.component
    }

    pub fn generation(&self) -> u64 {
        self.metadata.generation
    }
}

impl<M> Clone for ActorHandle<M> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            cancellation_token: self.cancellation_token.clone(),
            metadata: self.metadata,
            max_capacity: self.max_capacity,
        }
    }
}

impl<M> fmt::Debug for ActorHandle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorHandle")
            .field("metadata", &self.metadata)
            .field("capacity", &self.mailbox_capacity())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_try_send_delivers() {
        let (tx, mut rx) = mpsc::channel::<u32>(4);
        let handle = ActorHandle::new(tx, CancellationToken::new(), ActorMetadata::new("a", 0));

        handle.try_send(7).unwrap();
        assert_eq!(rx.recv().await, Some(7));
    }

    #[tokio::test]
    async fn test_try_send_full_mailbox() {
        let (tx, _rx) = mpsc::channel::<u32>(1);
        let handle = ActorHandle::new(tx, CancellationToken::new(), ActorMetadata::new("a", 0));

        handle.try_send(1).unwrap();
        assert_eq!(handle.try_send(2), Err(SendError::MailboxFull));
        assert_eq!(handle.mailbox_capacity(), (0, 1));
    }

    #[tokio::test]
    async fn test_try_send_closed_mailbox() {
        let (tx, rx) = mpsc::channel::<u32>(1);
        let handle = ActorHandle::new(tx, CancellationToken::new(), ActorMetadata::new("a", 0));
        drop(rx);

        assert!(handle.is_closed());
        assert_eq!(handle.try_send(1), Err(SendError::ActorStopped));
    }

    #[test]
    fn test_cancel() {
        let (tx, _rx) = mpsc::channel::<u32>(1);
        let handle = ActorHandle::new(tx, CancellationToken::new(), ActorMetadata::new("a", 3));
        assert!(!handle.is_cancelled());
        handle.clone().cancel();
        assert!(handle.is_cancelled());
        assert_eq!(handle.generation(), 3);
        assert_eq!(handle.component(), "a");
    }
}
