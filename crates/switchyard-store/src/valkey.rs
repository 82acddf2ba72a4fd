use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::{Decrement, Store, StoreError, TokenGrant};

/// Takes one token, creating a full bucket with a window expiry when absent.
/// Returns `{remaining, pttl}`; `remaining` is -1 when the bucket is empty.
static TAKE_TOKEN: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r"
        local current = redis.call('GET', KEYS[1])
        if not current then
            local remaining = tonumber(ARGV[1]) - 1
            redis.call('SET', KEYS[1], remaining, 'PX', ARGV[2])
            return {remaining, tonumber(ARGV[2])}
        end
        current = tonumber(current)
        if current > 0 then
            redis.call('DECR', KEYS[1])
            return {current - 1, redis.call('PTTL', KEYS[1])}
        end
        return {-1, redis.call('PTTL', KEYS[1])}
        ",
    )
});

/// Initialises the counter when absent, then subtracts only if enough is left.
/// Returns `{applied, remaining}`.
static TRY_DECREMENT: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r"
        local current = redis.call('GET', KEYS[1])
        if not current then
            redis.call('SET', KEYS[1], ARGV[2], 'PX', ARGV[3])
            current = ARGV[2]
        end
        current = tonumber(current)
        local amount = tonumber(ARGV[1])
        if current >= amount then
            return {1, redis.call('DECRBY', KEYS[1], amount)}
        end
        return {0, current}
        ",
    )
});

/// Adds to a counter, setting the expiry only when the key is created.
static INCR_WITH_TTL: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r"
        local value = redis.call('INCRBY', KEYS[1], ARGV[1])
        if value == tonumber(ARGV[1]) and tonumber(ARGV[2]) > 0 then
            redis.call('PEXPIRE', KEYS[1], ARGV[2])
        end
        return value
        ",
    )
});

/// Replaces the value and returns the previous one, nil when absent.
static SWAP: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r"
        local previous = redis.call('GET', KEYS[1])
        redis.call('SET', KEYS[1], ARGV[1])
        return previous
        ",
    )
});

/// Writes ARGV[3] when the key holds ARGV[2], or is absent when ARGV[1] is '0'.
/// Returns 1 when written.
static COMPARE_AND_SET: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r"
        local current = redis.call('GET', KEYS[1])
        if ARGV[1] == '1' then
            if current ~= ARGV[2] then
                return 0
            end
        elseif current then
            return 0
        end
        redis.call('SET', KEYS[1], ARGV[3])
        return 1
        ",
    )
});

/// Store shared through Redis or Valkey
///
/// Compound operations run as Lua scripts so every broker instance sees the
/// same atomic counters.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    prefix: String,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Open a managed connection that reconnects on failure
    pub async fn connect(url: &str, connect_timeout: Duration, prefix: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| StoreError::Backend(format!("invalid URL: {e}")))?;

        let connection = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Backend(format!("connection timed out after {connect_timeout:?}")))?
            .map_err(|e| StoreError::Backend(format!("connection failed: {e}")))?;

        Ok(Self {
            connection,
            prefix: prefix.to_owned(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{key}", self.prefix)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn backend(op: &str) -> impl FnOnce(redis::RedisError) -> StoreError + '_ {
    move |e| StoreError::Backend(format!("{op} failed: {e}"))
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection.clone();
        conn.get(self.key(key)).await.map_err(backend("GET"))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let key = self.key(key);

        match ttl {
            Some(ttl) => conn.pset_ex(key, value, millis(ttl)).await.map_err(backend("PSETEX")),
            None => conn.set(key, value).await.map_err(backend("SET")),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        conn.del(self.key(key)).await.map_err(backend("DEL"))
    }

    async fn swap(&self, key: &str, value: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection.clone();
        SWAP.key(self.key(key))
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(backend("swap"))
    }

    async fn compare_and_set(&self, key: &str, expected: Option<&str>, value: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        let written: i64 = COMPARE_AND_SET
            .key(self.key(key))
            .arg(if expected.is_some() { "1" } else { "0" })
            .arg(expected.unwrap_or_default())
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(backend("compare_and_set"))?;

        Ok(written == 1)
    }

    async fn incr(&self, key: &str, delta: i64, ttl: Option<Duration>) -> Result<i64, StoreError> {
        let mut conn = self.connection.clone();
        INCR_WITH_TTL
            .key(self.key(key))
            .arg(delta)
            .arg(ttl.map_or(0, millis))
            .invoke_async(&mut conn)
            .await
            .map_err(backend("INCRBY"))
    }

    async fn take_token(&self, key: &str, capacity: u32, window: Duration) -> Result<TokenGrant, StoreError> {
        let mut conn = self.connection.clone();
        let (remaining, pttl): (i64, i64) = TAKE_TOKEN
            .key(self.key(key))
            .arg(capacity)
            .arg(millis(window))
            .invoke_async(&mut conn)
            .await
            .map_err(backend("take_token"))?;

        if remaining < 0 {
            let reset_after = Duration::from_millis(u64::try_from(pttl).unwrap_or(0));
            return Ok(TokenGrant::Exhausted { reset_after });
        }

        Ok(TokenGrant::Granted {
            remaining: u32::try_from(remaining).unwrap_or(u32::MAX),
        })
    }

    async fn try_decrement(
        &self,
        key: &str,
        amount: u64,
        initial: u64,
        ttl: Duration,
    ) -> Result<Decrement, StoreError> {
        let mut conn = self.connection.clone();
        let (applied, remaining): (i64, i64) = TRY_DECREMENT
            .key(self.key(key))
            .arg(amount)
            .arg(initial)
            .arg(millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(backend("try_decrement"))?;

        let remaining = u64::try_from(remaining).unwrap_or(0);
        Ok(if applied == 1 {
            Decrement::Applied { remaining }
        } else {
            Decrement::Insufficient { remaining }
        })
    }
}
