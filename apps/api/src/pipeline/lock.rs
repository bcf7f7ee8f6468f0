//! Single-flight guard: at most one fill in flight per (user, application).
//!
//! Every acquisition hands out a fresh token. Renewal and release only act on
//! the lock while it still carries that token, so a run whose lock expired and
//! was taken over can never extend or delete the new holder's lock.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use redis::aio::MultiplexedConnection;
use redis::Script;
use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::application::ApplicationKey;

const LOCK_PREFIX: &str = "petition:fill-lock:";

const RENEW_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
end
return 0
"#;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Proof of ownership returned by a successful `try_acquire`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockToken(Uuid);

impl LockToken {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

#[async_trait]
pub trait FillLock: Send + Sync {
    /// Returns `None` if another run holds the lock for `key`.
    async fn try_acquire(&self, key: &ApplicationKey) -> Result<Option<LockToken>, AppError>;

    /// Extends the lock by a full TTL. `false` means the lock expired or now
    /// belongs to another run.
    async fn renew(&self, key: &ApplicationKey, token: LockToken) -> Result<bool, AppError>;

    /// Releases the lock if it still carries `token`; otherwise a no-op.
    async fn release(&self, key: &ApplicationKey, token: LockToken) -> Result<(), AppError>;

    fn ttl(&self) -> Duration;
}

/// How often a running fill renews its lock.
pub fn renewal_period(ttl: Duration) -> Duration {
    (ttl / 3).max(Duration::from_millis(1))
}

/// Redis lock: `SET key token NX PX ttl`; renewal and release are
/// compare-and-set scripts on the token.
#[derive(Clone)]
pub struct RedisFillLock {
    connection: MultiplexedConnection,
    ttl: Duration,
}

impl RedisFillLock {
    pub async fn connect(client: &redis::Client, ttl: Duration) -> Result<Self, redis::RedisError> {
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(Self { connection, ttl })
    }

    fn ttl_millis(&self) -> u64 {
        self.ttl.as_millis().max(1) as u64
    }
}

fn redis_key(key: &ApplicationKey) -> String {
    format!("{LOCK_PREFIX}{key}")
}

fn redis_error(e: redis::RedisError) -> AppError {
    AppError::Storage(format!("Redis fill lock failed: {e}"))
}

#[async_trait]
impl FillLock for RedisFillLock {
    async fn try_acquire(&self, key: &ApplicationKey) -> Result<Option<LockToken>, AppError> {
        let token = LockToken::new();
        let mut connection = self.connection.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(redis_key(key))
            .arg(token.0.to_string())
            .arg("NX")
            .arg("PX")
            .arg(self.ttl_millis())
            .query_async(&mut connection)
            .await
            .map_err(redis_error)?;
        Ok(reply.map(|_| token))
    }

    async fn renew(&self, key: &ApplicationKey, token: LockToken) -> Result<bool, AppError> {
        let mut connection = self.connection.clone();
        let renewed: i64 = Script::new(RENEW_SCRIPT)
            .key(redis_key(key))
            .arg(token.0.to_string())
            .arg(self.ttl_millis())
            .invoke_async(&mut connection)
            .await
            .map_err(redis_error)?;
        Ok(renewed == 1)
    }

    async fn release(&self, key: &ApplicationKey, token: LockToken) -> Result<(), AppError> {
        let mut connection = self.connection.clone();
        let removed: i64 = Script::new(RELEASE_SCRIPT)
            .key(redis_key(key))
            .arg(token.0.to_string())
            .invoke_async(&mut connection)
            .await
            .map_err(redis_error)?;
        if removed == 0 {
            debug!("Fill lock for {key} had already expired or changed hands");
        }
        Ok(())
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Process-local lock for tests and single-node deployments.
pub struct InMemoryFillLock {
    held: DashMap<ApplicationKey, (LockToken, Instant)>,
    ttl: Duration,
}

impl InMemoryFillLock {
    pub fn new(ttl: Duration) -> Self {
        Self {
            held: DashMap::new(),
            ttl,
        }
    }

    fn is_live(&self, acquired: Instant) -> bool {
        acquired.elapsed() < self.ttl
    }
}

#[async_trait]
impl FillLock for InMemoryFillLock {
    async fn try_acquire(&self, key: &ApplicationKey) -> Result<Option<LockToken>, AppError> {
        let token = LockToken::new();
        match self.held.entry(*key) {
            Entry::Vacant(slot) => {
                slot.insert((token, Instant::now()));
                Ok(Some(token))
            }
            Entry::Occupied(mut slot) if !self.is_live(slot.get().1) => {
                debug!("Fill lock for {key} expired; taking over");
                slot.insert((token, Instant::now()));
                Ok(Some(token))
            }
            Entry::Occupied(_) => Ok(None),
        }
    }

    async fn renew(&self, key: &ApplicationKey, token: LockToken) -> Result<bool, AppError> {
        let Some(mut held) = self.held.get_mut(key) else {
            return Ok(false);
        };
        let (owner, acquired) = *held;
        if owner != token || !self.is_live(acquired) {
            return Ok(false);
        }
        held.1 = Instant::now();
        Ok(true)
    }

    async fn release(&self, key: &ApplicationKey, token: LockToken) -> Result<(), AppError> {
        if self.held.remove_if(key, |_, (owner, _)| *owner == token).is_none() {
            debug!("Fill lock for {key} had already expired or changed hands");
        }
        Ok(())
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ApplicationKey {
        ApplicationKey::new(Uuid::new_v4(), Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_second_acquire_rejected_until_release() {
        let lock = InMemoryFillLock::new(Duration::from_secs(60));
        let key = key();

        let token = lock.try_acquire(&key).await.unwrap().unwrap();
        assert!(lock.try_acquire(&key).await.unwrap().is_none());
        lock.release(&key, token).await.unwrap();
        assert!(lock.try_acquire(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let lock = InMemoryFillLock::new(Duration::from_secs(60));
        let user = Uuid::new_v4();
        assert!(lock
            .try_acquire(&ApplicationKey::new(user, Uuid::new_v4()))
            .await
            .unwrap()
            .is_some());
        assert!(lock
            .try_acquire(&ApplicationKey::new(user, Uuid::new_v4()))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_expired_lock_can_be_taken_over() {
        let lock = InMemoryFillLock::new(Duration::from_millis(10));
        let key = key();
        assert!(lock.try_acquire(&key).await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(lock.try_acquire(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stale_holder_cannot_release_new_holders_lock() {
        let lock = InMemoryFillLock::new(Duration::from_millis(20));
        let key = key();

        let stale = lock.try_acquire(&key).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let current = lock.try_acquire(&key).await.unwrap().unwrap();

        lock.release(&key, stale).await.unwrap();
        assert!(lock.try_acquire(&key).await.unwrap().is_none());
        assert!(lock.renew(&key, current).await.unwrap());
        assert!(!lock.renew(&key, stale).await.unwrap());
    }

    #[tokio::test]
    async fn test_renewal_keeps_lock_past_ttl() {
        let lock = InMemoryFillLock::new(Duration::from_millis(30));
        let key = key();
        let token = lock.try_acquire(&key).await.unwrap().unwrap();

        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert!(lock.renew(&key, token).await.unwrap());
        }
        assert!(lock.try_acquire(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_lock_cannot_be_renewed() {
        let lock = InMemoryFillLock::new(Duration::from_millis(10));
        let key = key();
        let token = lock.try_acquire(&key).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(!lock.renew(&key, token).await.unwrap());
    }

    #[test]
    fn test_renewal_period_is_a_third_of_ttl() {
        assert_eq!(renewal_period(Duration::from_secs(900)), Duration::from_secs(300));
        assert_eq!(renewal_period(Duration::ZERO), Duration::from_millis(1));
    }

    #[test]
    fn test_redis_key_is_namespaced() {
        let user = Uuid::nil();
        let key = ApplicationKey::new(user, user);
        assert_eq!(
            redis_key(&key),
            format!("petition:fill-lock:{user}/{user}")
        );
    }
}
