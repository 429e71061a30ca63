//! Redis-backed bucket store, shared by every server process.

use std::{
  sync::atomic::{AtomicBool, Ordering},
  time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use redis::{Client, Script, aio::ConnectionManager};

use super::{BucketStore, Error, Hit, Result};

/// Increment, arm the expiry on the first hit, and report `{count, ttl_ms}`.
/// A key that somehow lost its TTL is re-armed so it cannot live forever.
const HIT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
  ttl = tonumber(ARGV[1])
end
return { count, ttl }
"#;

/// Namespace for bucket keys.
const KEY_PREFIX: &str = "tally:rl:";

pub struct RedisBucketStore {
  conn:   ConnectionManager,
  script: Script,
  closed: AtomicBool,
}

impl RedisBucketStore {
  pub async fn connect(url: &str) -> Result<Self> {
    let client = Client::open(url)?;
    let conn = client.get_connection_manager().await?;
    Ok(Self { conn, script: Script::new(HIT_SCRIPT), closed: AtomicBool::new(false) })
  }
}

impl BucketStore for RedisBucketStore {
  async fn hit(&self, key: &str, window: Duration, now: DateTime<Utc>) -> Result<Hit> {
    if self.closed.load(Ordering::Acquire) {
      return Err(Error::Closed);
    }

    let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX).max(1);
    let mut conn = self.conn.clone();
    let (count, ttl_ms): (i64, i64) = self
      .script
      .key(format!("{KEY_PREFIX}{key}"))
      .arg(window_ms)
      .invoke_async(&mut conn)
      .await?;

    Ok(Hit {
      count:      count.max(0) as u64,
      expires_at: now + TimeDelta::milliseconds(ttl_ms.max(0)),
    })
  }

  async fn close(&self) {
    self.closed.store(true, Ordering::Release);
    tracing::debug!("redis bucket store closed");
  }
}
