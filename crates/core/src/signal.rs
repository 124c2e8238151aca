//! Minimal publish/subscribe primitive for state-change notifications.
//!
//! A [`Signal`] holds a list of subscribers. Each [`emit`](Signal::emit)
//! delivers the value to every subscriber exactly once, either by calling a
//! registered callback synchronously or by pushing it into an unbounded
//! channel returned from [`subscribe`](Signal::subscribe).
//!
//! Callbacks are invoked without any internal lock held, so a callback may
//! connect or disconnect subscribers (including itself) on the same signal.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;

/// Handle returned by [`Signal::connect`], used to disconnect later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

enum Subscriber<T> {
    Callback(Callback<T>),
    Channel(mpsc::UnboundedSender<T>),
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Callback(cb) => Self::Callback(Arc::clone(cb)),
            Self::Channel(tx) => Self::Channel(tx.clone()),
        }
    }
}

pub struct Signal<T> {
    name: &'static str,
    next_id: AtomicU64,
    emitted: AtomicU64,
    subscribers: RwLock<Vec<(SubscriptionId, Subscriber<T>)>>,
}

impl<T: Clone + Send + 'static> Signal<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(0),
            emitted: AtomicU64::new(0),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register a callback invoked on every emission.
    pub fn connect<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.add(Subscriber::Callback(Arc::new(callback)))
    }

    /// Subscribe through a channel. The subscription ends when the receiver is dropped.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.add(Subscriber::Channel(tx));
        rx
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn disconnect(&self, id: SubscriptionId) -> bool {
        let mut subs = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        subs.len() != before
    }

    /// Deliver `value` to every current subscriber. Returns how many received it.
    pub fn emit(&self, value: T) -> usize {
        let snapshot: Vec<(SubscriptionId, Subscriber<T>)> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.emitted.fetch_add(1, Ordering::Relaxed);

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, subscriber) in snapshot {
            match subscriber {
                Subscriber::Callback(cb) => {
                    cb(&value);
                    delivered += 1;
                }
                Subscriber::Channel(tx) => {
                    if tx.send(value.clone()).is_ok() {
                        delivered += 1;
                    } else {
                        closed.push(id);
                    }
                }
            }
        }

        if !closed.is_empty() {
            tracing::trace!(signal = self.name, count = closed.len(), "pruning closed subscribers");
            self.subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| !closed.contains(id));
        }

        delivered
    }

    /// Total number of emissions since construction.
    pub fn emission_count(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn add(&self, subscriber: Subscriber<T>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, subscriber));
        id
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.name)
            .field("emitted", &self.emitted.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
