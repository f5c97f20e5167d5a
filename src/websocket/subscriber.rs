use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{Sink, SinkExt};
use log::debug;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::data::{Subscriber, SubscriberId};
use crate::errors::DeliveryError;

// A peer that stopped reading can keep the close handshake pending forever
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

pub struct WsSubscriber<S> {
    id: SubscriberId,
    sink: Mutex<S>,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl<S> WsSubscriber<S>
where
    S: Sink<Message, Error = WsError> + Unpin + Send,
{
    pub fn new(sink: S) -> Self {
        Self {
            id: SubscriberId::new(),
            sink: Mutex::new(sink),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    pub async fn send_text(&self, text: String) -> Result<(), DeliveryError> {
        self.send(Message::Text(text)).await
    }

    async fn send(&self, message: Message) -> Result<(), DeliveryError> {
        if self.closed.load(Ordering::Acquire) || self.shutdown.is_cancelled() {
            return Err(DeliveryError::Closed);
        }
        if let Err(e) = self.sink.lock().await.send(message).await {
            self.shutdown.cancel();
            return Err(e.into());
        }
        Ok(())
    }

    pub fn terminated(&self) -> WaitForCancellationFuture<'_> {
        self.shutdown.cancelled()
    }

    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.cancel();

        let closing = async { self.sink.lock().await.close().await };
        match tokio::time::timeout(CLOSE_TIMEOUT, closing).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Closing session {} failed: {}", self.id, e),
            Err(_) => debug!("Closing session {} timed out", self.id),
        }
    }
}

#[async_trait]
impl<S> Subscriber for WsSubscriber<S>
where
    S: Sink<Message, Error = WsError> + Unpin + Send,
{
    fn id(&self) -> SubscriberId {
        self.id
    }

    async fn deliver(&self, message: &[u8]) -> Result<(), DeliveryError> {
        let frame = match std::str::from_utf8(message) {
            Ok(text) => Message::Text(text.to_string()),
            Err(_) => Message::Binary(message.to_vec()),
        };
        self.send(frame).await
    }

    fn evicted(&self) {
        self.shutdown.cancel();
    }
}
