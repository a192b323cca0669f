use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties};
use tracing::{error, info, warn};

use crate::engine::Engine;
use crate::error::Result;
use crate::types::JobRequest;

/// Bounded-concurrency consumer over the durable job queue.
///
/// Deliveries are acknowledged only after the engine reports the job
/// resolved, never on receipt, so a worker crash mid-execution hands
/// the job back to the broker. At-least-once redelivery is expected;
/// the engine's claim check suppresses duplicate sandboxes.
pub struct JobConsumer {
    _connection: Connection,
    channel: Channel,
    queue: String,
}

impl JobConsumer {
    /// Connect, declare the durable queue, and cap in-flight deliveries
    /// at `prefetch` (1 = strictly sequential per worker).
    pub async fn connect(url: &str, queue: &str, prefetch: u16) -> Result<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel.basic_qos(prefetch, BasicQosOptions::default()).await?;
        Ok(Self {
            _connection: connection,
            channel,
            queue: queue.to_string(),
        })
    }

    /// Consume until the broker connection drops.
    pub async fn run(&self, engine: &Engine) -> Result<()> {
        let mut consumer = self
            .channel
            .basic_consume(
                &self.queue,
                "worker",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        info!(queue = %self.queue, "waiting for jobs");

        while let Some(delivery) = consumer.next().await {
            let delivery = delivery?;
            let job = match serde_json::from_slice::<JobRequest>(&delivery.data) {
                Ok(job) => job,
                Err(e) => {
                    // poison message: drop it rather than redeliver forever
                    warn!(error = %e, "malformed job payload, dropping");
                    delivery.acker.ack(BasicAckOptions::default()).await?;
                    continue;
                }
            };
            match engine.process(&job).await {
                Ok(()) => delivery.acker.ack(BasicAckOptions::default()).await?,
                Err(e) => {
                    // the authoritative record was not written; hand the
                    // job back to the broker over losing it silently
                    error!(job_id = %job.job_id, error = %e, "job unresolved, requeueing");
                    delivery
                        .acker
                        .nack(BasicNackOptions {
                            requeue: true,
                            ..Default::default()
                        })
                        .await?;
                }
            }
        }
        Ok(())
    }
}
