use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

const QUEUE_KEY: &str = "media_jobs:dispatch";
const PROCESSING_KEY: &str = "media_jobs:processing";

/// Dispatch messages redelivered more often than this are dropped.
pub const MAX_DELIVERIES: u32 = 3;

/// Payload handed to a worker. Only identifies the job; workers read
/// everything else from the job store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchMessage {
    pub job_id: Uuid,
    pub delivery: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl DispatchMessage {
    pub fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            delivery: 1,
            enqueued_at: Utc::now(),
        }
    }

    /// The same dispatch, marked as one more delivery attempt.
    pub fn redelivery(&self) -> Self {
        Self {
            job_id: self.job_id,
            delivery: self.delivery + 1,
            enqueued_at: Utc::now(),
        }
    }
}

/// Broker-backed dispatch with at-least-once delivery.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Hand off a dispatch message. Does not wait for processing.
    async fn enqueue(&self, message: &DispatchMessage) -> Result<(), QueueError>;

    /// Take the next message, if any, moving it to the in-flight set.
    async fn dequeue(&self) -> Result<Option<DispatchMessage>, QueueError>;

    /// Remove a message from the in-flight set once handled.
    async fn ack(&self, message: &DispatchMessage) -> Result<(), QueueError>;

    /// Number of messages waiting for a worker.
    async fn depth(&self) -> Result<u64, QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;
}

/// Redis-backed dispatch queue. Messages move to a processing list while a
/// worker handles them, so a crashed worker leaves its message visible there.
pub struct RedisTaskQueue {
    client: redis::Client,
}

impl RedisTaskQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(&self, message: &DispatchMessage) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(message).map_err(QueueError::Serialize)?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<DispatchMessage>, QueueError> {
        let mut conn = self.connection().await?;
        let result: Option<String> = conn
            .rpoplpush(QUEUE_KEY, PROCESSING_KEY)
            .await
            .map_err(QueueError::Redis)?;

        match result {
            Some(payload) => {
                let message = serde_json::from_str(&payload).map_err(QueueError::Serialize)?;
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }

    async fn ack(&self, message: &DispatchMessage) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(message).map_err(QueueError::Serialize)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let depth: u64 = conn.llen(QUEUE_KEY).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

/// In-process queue for tests and single-binary runs.
///
/// Cloning creates a new handle to the **same** underlying queue.
#[derive(Clone, Default)]
pub struct MemoryTaskQueue {
    inner: Arc<Mutex<MemoryQueueState>>,
}

#[derive(Default)]
struct MemoryQueueState {
    pending: VecDeque<DispatchMessage>,
    in_flight: Vec<DispatchMessage>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn in_flight(&self) -> usize {
        self.inner.lock().await.in_flight.len()
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, message: &DispatchMessage) -> Result<(), QueueError> {
        self.inner.lock().await.pending.push_back(message.clone());
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<DispatchMessage>, QueueError> {
        let mut state = self.inner.lock().await;
        let message = state.pending.pop_front();
        if let Some(message) = &message {
            state.in_flight.push(message.clone());
        }
        Ok(message)
    }

    async fn ack(&self, message: &DispatchMessage) -> Result<(), QueueError> {
        let mut state = self.inner.lock().await;
        if let Some(pos) = state.in_flight.iter().position(|m| m == message) {
            state.in_flight.remove(pos);
        }
        Ok(())
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        Ok(self.inner.lock().await.pending.len() as u64)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_queue_moves_messages_in_flight_until_ack() {
        let queue = MemoryTaskQueue::new();
        let first = DispatchMessage::new(Uuid::new_v4());
        let second = DispatchMessage::new(Uuid::new_v4());
        queue.enqueue(&first).await.unwrap();
        queue.enqueue(&second).await.unwrap();
        assert_eq!(queue.depth().await.unwrap(), 2);

        let taken = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(taken, first);
        assert_eq!(queue.depth().await.unwrap(), 1);
        assert_eq!(queue.in_flight().await, 1);

        queue.ack(&taken).await.unwrap();
        assert_eq!(queue.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_empty_queue_returns_none() {
        let queue = MemoryTaskQueue::new();
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[test]
    fn test_redelivery_counts_attempts() {
        let message = DispatchMessage::new(Uuid::new_v4());
        let again = message.redelivery();
        assert_eq!(again.job_id, message.job_id);
        assert_eq!(again.delivery, 2);
    }

    #[test]
    fn test_message_round_trips_through_json() {
        let message = DispatchMessage::new(Uuid::new_v4());
        let payload = serde_json::to_string(&message).unwrap();
        let decoded: DispatchMessage = serde_json::from_str(&payload).unwrap();
        assert_eq!(decoded, message);
    }
}
