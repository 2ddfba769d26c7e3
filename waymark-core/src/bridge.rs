use std::sync::{Arc, Weak};

use log::debug;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::position::Position;

struct ActiveSubscriber {
    generation: u64,
    queue: mpsc::UnboundedSender<Position>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct SubscriberSlot {
    active: Option<ActiveSubscriber>,
    next_generation: u64,
}

/// Single-subscriber fan-in for accepted positions.
///
/// The emitting side never waits on the handler: fixes are queued onto an
/// unbounded channel and drained by a consumer task owned by the
/// subscription, so delivery is ordered but asynchronous, and a panicking
/// handler takes down its own task rather than the emitter. Subscribing
/// again replaces the previous handler.
#[derive(Clone, Default)]
pub struct PositionBridge {
    slot: Arc<Mutex<SubscriberSlot>>,
}

impl PositionBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` as the sole subscriber, tearing down any previous
    /// one. The handler runs on its own task, one fix at a time, in
    /// emission order.
    pub async fn subscribe<F>(&self, mut handler: F) -> Subscription
    where
        F: FnMut(Position) + Send + 'static,
    {
        let (queue, mut fixes) = mpsc::unbounded_channel::<Position>();
        let cancel = CancellationToken::new();

        let consumer_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = consumer_cancel.cancelled() => break,

                    fix = fixes.recv() => match fix {
                        Some(position) => handler(position),
                        None => break,
                    },
                }
            }
        });

        let mut slot = self.slot.lock().await;
        let generation = slot.next_generation;
        slot.next_generation += 1;

        if let Some(previous) = slot.active.replace(ActiveSubscriber {
            generation,
            queue,
            cancel: cancel.clone(),
        }) {
            previous.cancel.cancel();
            debug!("replaced position subscriber {}", previous.generation);
        }

        Subscription {
            generation,
            cancel,
            slot: Arc::downgrade(&self.slot),
        }
    }

    /// Queue a position for the current subscriber, if any.
    pub async fn emit(&self, position: Position) {
        let mut slot = self.slot.lock().await;
        let delivered = match &slot.active {
            Some(subscriber) => subscriber.queue.send(position).is_ok(),
            None => return,
        };
        if !delivered {
            // The consumer task is gone, usually a panicked handler.
            if let Some(subscriber) = slot.active.take() {
                debug!("position subscriber {} went away", subscriber.generation);
            }
        }
    }
}

/// Handle to an installed position handler.
///
/// Dropping one changes nothing; the handler stays live until
/// [Subscription::unsubscribe] is called or a new subscriber replaces it.
#[derive(Clone)]
pub struct Subscription {
    generation: u64,
    cancel: CancellationToken,
    slot: Weak<Mutex<SubscriberSlot>>,
}

impl Subscription {
    /// Tear down the handler. Safe to call more than once, and a stale
    /// handle never tears down a newer subscriber.
    pub async fn unsubscribe(&self) {
        self.cancel.cancel();
        if let Some(slot) = self.slot.upgrade() {
            let mut slot = slot.lock().await;
            let is_current = slot
                .active
                .as_ref()
                .is_some_and(|subscriber| subscriber.generation == self.generation);
            if is_current {
                slot.active = None;
            }
        }
    }
}
