//! Bounded per-connection outbound queues.
//!
//! The driver lock is held while actions execute, so delivery must never
//! wait on a socket. Each connection gets an [`OutboundQueue`]: the executor
//! pushes without blocking and a dedicated writer task drains it onto the
//! WebSocket. A slow reader only ever fills its own queue; what happens then
//! is decided by the [`SlowConsumerPolicy`].

use std::{
    collections::VecDeque,
    fmt,
    str::FromStr,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tokio::sync::{Notify, watch};
use tokio_tungstenite::tungstenite::Message;

/// Frames buffered per connection before the slow-consumer policy applies.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Close reason used when a queue overflows under
/// [`SlowConsumerPolicy::Disconnect`].
pub const SLOW_CONSUMER_REASON: &str = "slow consumer";

/// What to do when a connection's outbound queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SlowConsumerPolicy {
    /// Discard the oldest queued frame to make room
    #[default]
    DropOldest,
    /// Close the connection
    Disconnect,
}

impl fmt::Display for SlowConsumerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DropOldest => f.write_str("drop-oldest"),
            Self::Disconnect => f.write_str("disconnect"),
        }
    }
}

impl FromStr for SlowConsumerPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop-oldest" => Ok(Self::DropOldest),
            "disconnect" => Ok(Self::Disconnect),
            other => Err(format!("unknown slow consumer policy '{other}' (drop-oldest, disconnect)")),
        }
    }
}

/// Result of [`OutboundQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Frame queued
    Queued,
    /// Frame queued after discarding the oldest one
    DroppedOldest,
    /// Queue was full and has been closed; frame discarded
    Overflow,
    /// Queue already closed; frame discarded
    Closed,
}

/// Next thing the writer task should do.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    /// Write this message
    Frame(Message),
    /// Send a close frame with this reason and stop
    Close(String),
}

#[derive(Debug, Default)]
struct Inner {
    queue: VecDeque<Message>,
    closing: Option<String>,
}

/// Bounded single-consumer queue of outbound messages.
#[derive(Debug)]
pub struct OutboundQueue {
    inner: Mutex<Inner>,
    capacity: usize,
    policy: SlowConsumerPolicy,
    /// Wakes the writer task
    ready: Notify,
    /// Flips to `true` once, on close
    closed: watch::Sender<bool>,
}

impl OutboundQueue {
    /// Create an empty queue. A capacity of zero is treated as one.
    pub fn new(capacity: usize, policy: SlowConsumerPolicy) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: capacity.max(1),
            policy,
            ready: Notify::new(),
            closed,
        }
    }

    /// Queue a message without blocking.
    pub fn push(&self, message: Message) -> PushOutcome {
        let mut inner = self.lock();
        if inner.closing.is_some() {
            return PushOutcome::Closed;
        }

        let outcome = if inner.queue.len() < self.capacity {
            PushOutcome::Queued
        } else {
            match self.policy {
                SlowConsumerPolicy::DropOldest => {
                    inner.queue.pop_front();
                    PushOutcome::DroppedOldest
                },
                SlowConsumerPolicy::Disconnect => {
                    Self::begin_close(&mut inner, SLOW_CONSUMER_REASON);
                    drop(inner);
                    self.signal_closed();
                    return PushOutcome::Overflow;
                },
            }
        };

        inner.queue.push_back(message);
        drop(inner);
        self.ready.notify_one();
        outcome
    }

    /// Close the queue. Pending frames are discarded and the writer is told
    /// to send a close frame with `reason`.
    ///
    /// Returns `false` if the queue was already closed; the first reason wins.
    pub fn close(&self, reason: &str) -> bool {
        let mut inner = self.lock();
        if inner.closing.is_some() {
            return false;
        }

        Self::begin_close(&mut inner, reason);
        drop(inner);
        self.signal_closed();
        true
    }

    /// Whether [`Self::close`] has been called (or the queue overflowed).
    pub fn is_closed(&self) -> bool {
        self.lock().closing.is_some()
    }

    /// Why the queue was closed.
    pub fn close_reason(&self) -> Option<String> {
        self.lock().closing.clone()
    }

    /// Number of frames waiting to be written.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Check if nothing is waiting to be written.
    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Wait for the next message, or the close instruction.
    ///
    /// Intended for a single writer task.
    pub async fn next(&self) -> Outgoing {
        loop {
            {
                let mut inner = self.lock();
                if let Some(reason) = &inner.closing {
                    return Outgoing::Close(reason.clone());
                }
                if let Some(message) = inner.queue.pop_front() {
                    return Outgoing::Frame(message);
                }
            }

            self.ready.notified().await;
        }
    }

    /// Resolves once the queue is closed.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives in `self`, so this can't observe a dropped channel
        let _ = rx.wait_for(|closed| *closed).await;
    }

    fn begin_close(inner: &mut Inner, reason: &str) {
        inner.queue.clear();
        inner.closing = Some(reason.to_owned());
    }

    fn signal_closed(&self) {
        self.closed.send_replace(true);
        self.ready.notify_one();
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves the queue structurally valid
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
