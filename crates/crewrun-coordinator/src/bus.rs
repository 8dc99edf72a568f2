//! Event bus: fan-out of task lifecycle events to observers.
//!
//! Publishing never blocks. `on` observers each get an unbounded queue fed in
//! publish order and drained by their own tokio task, so a slow callback only
//! delays itself and never loses events. Raw receivers from `subscribe` and
//! `stream` are bounded by the configured capacity and may lag.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{trace, warn};

use crewrun_core::{TaskEvent, TaskEventKind};

/// An `on` subscription's queue and the kinds it asked for.
#[derive(Debug)]
struct Observer {
    kinds: Vec<TaskEventKind>,
    tx: mpsc::UnboundedSender<TaskEvent>,
}

/// Publish/subscribe channel for [`TaskEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TaskEvent>,
    observers: Arc<Mutex<Vec<Observer>>>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per raw receiver.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            observers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn observers(&self) -> MutexGuard<'_, Vec<Observer>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish an event to all current observers and receivers.
    pub fn publish(&self, event: TaskEvent) {
        trace!(kind = %event.kind, task_id = %event.task.id, "Publishing task event");

        self.observers().retain(|observer| {
            if observer.tx.is_closed() {
                return false;
            }
            !observer.kinds.contains(&event.kind) || observer.tx.send(event.clone()).is_ok()
        });

        // No raw receivers is fine
        let _ = self.tx.send(event);
    }

    /// Raw receiver over every event published from now on.
    ///
    /// Bounded: a receiver that falls more than `capacity` events behind gets
    /// `RecvError::Lagged` and misses the overwritten events.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }

    /// Stream of events, skipping over any the consumer lagged behind on.
    pub fn stream(&self) -> impl Stream<Item = TaskEvent> + Send + 'static {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|item| match item {
            Ok(event) => Some(event),
            Err(err) => {
                warn!(error = %err, "Event stream lagged, skipping events");
                None
            }
        })
    }

    /// Invoke `callback` for every event of `kind`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on<F>(&self, kind: TaskEventKind, callback: F) -> Subscription
    where
        F: Fn(TaskEvent) + Send + Sync + 'static,
    {
        self.on_any(&[kind], callback)
    }

    /// Invoke `callback` for every event whose kind is in `kinds`, in publish
    /// order.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_any<F>(&self, kinds: &[TaskEventKind], callback: F) -> Subscription
    where
        F: Fn(TaskEvent) + Send + Sync + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.observers().push(Observer {
            kinds: kinds.to_vec(),
            tx,
        });

        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                callback(event);
            }
        });
        Subscription { handle }
    }

    /// Number of live raw receivers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Number of registered `on` observers.
    pub fn observer_count(&self) -> usize {
        self.observers().iter().filter(|o| !o.tx.is_closed()).count()
    }
}

/// Handle to an `on` callback; dropping it keeps the callback running.
#[derive(Debug)]
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Stop delivering events to the callback.
    pub fn unsubscribe(self) {
        self.handle.abort();
    }
}
