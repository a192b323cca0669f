use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;

/// Best-effort publish/subscribe fan-out for live job I/O.
///
/// Delivery is fire-and-forget: no acknowledgement, no replay. A
/// listener that attaches after an event was published has missed it
/// permanently; durable state lives only in the job store.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<()>;
    async fn subscribe(&self, channel: &str) -> Result<BusSubscription>;
}

/// Live feed of one channel. Dropping the subscription tears it down,
/// so a session that ends on any path stops listening with it.
pub struct BusSubscription {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    forward: Option<JoinHandle<()>>,
}

impl BusSubscription {
    pub fn new(rx: mpsc::UnboundedReceiver<Vec<u8>>, forward: Option<JoinHandle<()>>) -> Self {
        Self { rx, forward }
    }

    /// Next payload on the channel; `None` once the subscription is
    /// closed upstream.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.forward.take() {
            task.abort();
        }
    }
}

/// Redis pub/sub event bus. Publishes go through a shared connection
/// manager; each subscription holds its own pub/sub connection inside a
/// forwarding task that is aborted when the subscription drops.
pub struct RedisEventBus {
    client: redis::Client,
    publisher: ConnectionManager,
}

impl RedisEventBus {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let publisher = ConnectionManager::new(client.clone()).await?;
        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<()> {
        let mut conn = self.publisher.clone();
        let _: () = redis::AsyncCommands::publish(&mut conn, channel, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BusSubscription> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let forward = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                if tx.send(msg.get_payload_bytes().to_vec()).is_err() {
                    break;
                }
            }
        });
        Ok(BusSubscription::new(rx, Some(forward)))
    }
}
