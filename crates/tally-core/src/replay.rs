//! Single-slot replay cache.
//!
//! Holds the last published value and hands it to every new subscriber
//! before any later value. Each subscriber has its own unbounded queue, so a
//! slow observer sees every published value in order and never lags out.

use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tracing::trace;

/// Outcome of [`ReplayCache::publish_if_newer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    /// The value replaced the slot and was delivered to subscribers.
    Applied,
    /// A value with an equal or higher sequence was already applied.
    Stale { applied: u64 },
}

struct Slot<T> {
    value: Option<T>,
    applied_seq: Option<u64>,
    subscribers: Vec<mpsc::UnboundedSender<T>>,
    closed: bool,
}

/// Capacity-one cache that replays its value to late subscribers.
///
/// Reading the slot and registering a subscriber happen under the same lock
/// as publishing, so a subscriber never misses or duplicates a value.
pub struct ReplayCache<T> {
    slot: Mutex<Slot<T>>,
}

impl<T: Clone> ReplayCache<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                value: None,
                applied_seq: None,
                subscribers: Vec::new(),
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The current value, if one has been published.
    pub fn current(&self) -> Option<T> {
        self.lock().value.clone()
    }

    /// Sequence number of the last value applied through
    /// [`publish_if_newer`](Self::publish_if_newer).
    pub fn applied_seq(&self) -> Option<u64> {
        self.lock().applied_seq
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut slot = self.lock();
        slot.subscribers.retain(|tx| !tx.is_closed());
        slot.subscribers.len()
    }

    /// Subscribe: receive the current value (if any), then every later one.
    ///
    /// Subscribing to a closed cache yields the current value and then ends.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut slot = self.lock();

        if let Some(value) = &slot.value {
            // Cannot fail: we hold the receiver.
            let _ = tx.send(value.clone());
        }
        if !slot.closed {
            slot.subscribers.push(tx);
        }

        Subscription { rx }
    }

    /// Replace the slot unconditionally and notify subscribers.
    pub fn publish(&self, value: T) {
        let mut slot = self.lock();
        if slot.closed {
            return;
        }
        Self::deliver(&mut slot, value);
    }

    /// Replace the slot only if `seq` is higher than any applied so far.
    pub fn publish_if_newer(&self, seq: u64, value: T) -> Publish {
        let mut slot = self.lock();

        if let Some(applied) = slot.applied_seq
            && seq <= applied
        {
            return Publish::Stale { applied };
        }
        if slot.closed {
            return Publish::Stale {
                applied: slot.applied_seq.unwrap_or(0),
            };
        }

        slot.applied_seq = Some(seq);
        Self::deliver(&mut slot, value);
        Publish::Applied
    }

    /// End every subscription. The last value stays readable.
    pub fn close(&self) {
        let mut slot = self.lock();
        slot.closed = true;
        slot.subscribers.clear();
    }

    fn deliver(slot: &mut Slot<T>, value: T) {
        slot.subscribers.retain(|tx| tx.send(value.clone()).is_ok());
        trace!(subscribers = slot.subscribers.len(), "replay cache: value published");
        slot.value = Some(value);
    }
}

impl<T: Clone> Default for ReplayCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscriber's view of a [`ReplayCache`].
///
/// Yields values in publish order and ends when the cache is closed or
/// dropped.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Wait for the next value.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take the next value if one is already queued.
    pub fn try_next(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Drain queued values, returning the most recent one.
    pub fn latest(&mut self) -> Option<T> {
        let mut latest = None;
        while let Ok(value) = self.rx.try_recv() {
            latest = Some(value);
        }
        latest
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
