//! Process-local bucket store.

use std::{
  collections::HashMap,
  sync::{Mutex, PoisonError},
  time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};

use super::{BucketStore, Hit, Result};

/// Expired buckets are swept once the map grows past this many entries.
const SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct Bucket {
  count:      u64,
  expires_at: DateTime<Utc>,
}

/// Mutex-guarded map of buckets. The lock is never held across an await.
#[derive(Debug, Default)]
pub struct MemoryBucketStore {
  buckets: Mutex<HashMap<String, Bucket>>,
}

impl MemoryBucketStore {
  /// Synchronous hit; infallible.
  pub fn record(&self, key: &str, window: Duration, now: DateTime<Utc>) -> Hit {
    let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);

    if let Some(bucket) = buckets.get_mut(key).filter(|b| b.expires_at >= now) {
      bucket.count += 1;
      return Hit { count: bucket.count, expires_at: bucket.expires_at };
    }

    if buckets.len() >= SWEEP_THRESHOLD {
      buckets.retain(|_, b| b.expires_at >= now);
    }

    let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);
    let expires_at = now.checked_add_signed(window).unwrap_or(DateTime::<Utc>::MAX_UTC);
    buckets.insert(key.to_owned(), Bucket { count: 1, expires_at });
    Hit { count: 1, expires_at }
  }

  pub fn len(&self) -> usize {
    self.buckets.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl BucketStore for MemoryBucketStore {
  async fn hit(&self, key: &str, window: Duration, now: DateTime<Utc>) -> Result<Hit> {
    Ok(self.record(key, window, now))
  }

  async fn close(&self) {
    self.buckets.lock().unwrap_or_else(PoisonError::into_inner).clear();
  }
}
