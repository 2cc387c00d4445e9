use std::future::Future;
use std::pin::Pin;

use tokio::sync::{mpsc, oneshot};

use super::error::BackendError;
use super::ids::ChatId;
use super::types::Message;

pub type SubscriptionWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// One push from the live message feed: the full ordered message set, or a terminal error.
#[derive(Debug)]
pub enum FeedEvent {
    Snapshot(Vec<Message>),
    Failed(BackendError),
}

/// Keeps a subscription open. Dropping it fires the cancel channel and the worker
/// tears its transport down.
#[derive(Debug)]
pub struct SubscriptionGuard {
    chat_id: ChatId,
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl SubscriptionGuard {
    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

/// Receiving half of a subscription. Ends once the worker stops.
#[derive(Debug)]
pub struct FeedEvents {
    events: mpsc::UnboundedReceiver<FeedEvent>,
}

impl FeedEvents {
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }
}

/// Live message subscription scoped to one chat.
#[derive(Debug)]
pub struct MessageSubscription {
    guard: SubscriptionGuard,
    events: FeedEvents,
}

/// A subscription plus the future that drives it. The caller decides which runtime
/// polls the worker.
pub struct SubscriptionHandle {
    pub subscription: MessageSubscription,
    pub worker: SubscriptionWorker,
}

impl MessageSubscription {
    pub fn chat_id(&self) -> ChatId {
        self.guard.chat_id
    }

    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }

    /// Separates the cancel guard from the event stream so they can live in
    /// different owners.
    pub fn split(self) -> (SubscriptionGuard, FeedEvents) {
        (self.guard, self.events)
    }
}

pub(crate) fn make_feed_channel(
    chat_id: ChatId,
) -> (
    mpsc::UnboundedSender<FeedEvent>,
    MessageSubscription,
    oneshot::Receiver<()>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let subscription = MessageSubscription {
        guard: SubscriptionGuard {
            chat_id,
            cancel_tx: Some(cancel_tx),
        },
        events: FeedEvents { events: event_rx },
    };
    (event_tx, subscription, cancel_rx)
}
