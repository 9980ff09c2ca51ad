//! Per-worker inbox.
//!
//! A [`Mailbox`] is an unbounded `crossbeam` channel whose both ends are kept
//! together. Producers never block; the single consumer blocks while the
//! queue is empty. Closing the mailbox drops the sending half, discards
//! whatever is still queued and wakes a consumer blocked in
//! [`Mailbox::receive`].

use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::RwLock;
use switchyard_types::{Message, Protocol};

/// Returned by the receive methods once the mailbox has been torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxClosed;

/// Unbounded, strictly FIFO message queue owned by exactly one subscriber.
pub struct Mailbox<P: Protocol> {
    // `None` once closed.
    sender: RwLock<Option<Sender<Message<P>>>>,
    receiver: Receiver<Message<P>>,
}

impl<P: Protocol> Mailbox<P> {
    pub fn new() -> Self {
        let (sender, receiver) = channel::unbounded();
        Self {
            sender: RwLock::new(Some(sender)),
            receiver,
        }
    }

    /// Enqueue `message` without blocking.
    ///
    /// Hands the message back when the mailbox is already closed so the
    /// caller can route it elsewhere.
    pub fn deliver(&self, message: Message<P>) -> Result<(), Message<P>> {
        let guard = self.sender.read();
        match guard.as_ref() {
            Some(sender) => sender.send(message).map_err(|err| err.into_inner()),
            None => Err(message),
        }
    }

    /// Block until a message is available and return it.
    pub fn receive(&self) -> Result<Message<P>, MailboxClosed> {
        self.receiver.recv().map_err(|_| MailboxClosed)
    }

    /// Like [`receive`](Self::receive) but gives up after `timeout`,
    /// returning `Ok(None)`.
    pub fn receive_timeout(&self, timeout: Duration) -> Result<Option<Message<P>>, MailboxClosed> {
        match self.receiver.recv_timeout(timeout) {
            Ok(message) => Ok(Some(message)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(MailboxClosed),
        }
    }

    /// Non-blocking variant of [`receive`](Self::receive).
    pub fn try_receive(&self) -> Result<Option<Message<P>>, MailboxClosed> {
        match self.receiver.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(MailboxClosed),
        }
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Tear the mailbox down. Returns the number of undelivered messages
    /// that were discarded. Closing twice is a no-op.
    pub fn close(&self) -> usize {
        let sender = self.sender.write().take();
        if sender.is_none() {
            return 0;
        }
        drop(sender);
        self.receiver.try_iter().count()
    }
}

impl<P: Protocol> Default for Mailbox<P> {
    fn default() -> Self {
        Self::new()
    }
}
