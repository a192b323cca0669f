use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::Result;
use crate::status::JobRecord;
use crate::types::JobId;

/// TTL-bounded key-value store holding the authoritative status record
/// per job. Writes are full-record replacements; `get` on an unknown or
/// expired id is `None`, not an error.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn put(&self, job_id: JobId, record: &JobRecord, ttl: Duration) -> Result<()>;
    async fn get(&self, job_id: JobId) -> Result<Option<JobRecord>>;
}

fn key(job_id: JobId) -> String {
    format!("job:{job_id}")
}

/// Redis-backed job store. `SET .. EX` gives the atomic full-record
/// replacement the status-polling side relies on: readers see either
/// the prior record or the new one, never a partial write.
#[derive(Clone)]
pub struct RedisJobStore {
    conn: ConnectionManager,
}

impl RedisJobStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn put(&self, job_id: JobId, record: &JobRecord, ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key(job_id), json, ttl.as_secs()).await?;
        Ok(())
    }

    async fn get(&self, job_id: JobId) -> Result<Option<JobRecord>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key(job_id)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_job_scoped() {
        let id = uuid::Uuid::nil();
        assert_eq!(key(id), format!("job:{id}"));
    }
}
