//! Fixed-window, per-role rate limiting for the analytics and export routes.
//!
//! Buckets live in a [`BucketStore`]. The durable store (Redis) is shared by
//! every server process; when it errors or is slow the decision falls back to
//! a process-local [`MemoryBucketStore`], so the limiter never fails a request
//! on its own account.

mod memory;
mod redis;

use std::{future::Future, net::IpAddr, time::Duration};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

pub use memory::MemoryBucketStore;
pub use self::redis::RedisBucketStore;

use crate::auth::{Actor, Role};

/// Upper bound on a single durable-store round trip.
const DURABLE_TIMEOUT: Duration = Duration::from_millis(250);

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Durable-store failures. Always recovered inside the limiter.
#[derive(Debug, Error)]
pub enum Error {
  #[error("redis error: {0}")]
  Redis(#[from] ::redis::RedisError),

  #[error("durable store timed out after {0:?}")]
  Timeout(Duration),

  #[error("bucket store is closed")]
  Closed,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Policy ──────────────────────────────────────────────────────────────────

/// `max` requests per `window_ms` milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Window {
  pub window_ms: u64,
  pub max:       u64,
}

impl Window {
  pub const fn per_minute(max: u64) -> Self { Self { window_ms: 60_000, max } }

  pub fn duration(&self) -> Duration { Duration::from_millis(self.window_ms) }
}

/// One window per role. Anonymous callers get the student window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RolePolicy {
  pub student: Window,
  pub faculty: Window,
  pub admin:   Window,
}

impl RolePolicy {
  pub const fn new(student: u64, faculty: u64, admin: u64) -> Self {
    Self {
      student: Window::per_minute(student),
      faculty: Window::per_minute(faculty),
      admin:   Window::per_minute(admin),
    }
  }

  pub fn window(&self, role: Option<Role>) -> Window {
    match role {
      Some(Role::Admin) => self.admin,
      Some(Role::Faculty) => self.faculty,
      Some(Role::Student) | None => self.student,
    }
  }
}

/// Routes subject to rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
  Analytics,
  Csv,
  Xlsx,
  Pdf,
}

/// The `rate_limits` configuration table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
  /// `redis://…`; `None` keeps every bucket in process memory.
  pub redis_url: Option<String>,
  pub analytics: RolePolicy,
  pub csv:       RolePolicy,
  pub xlsx:      RolePolicy,
  pub pdf:       RolePolicy,
}

impl Default for RateLimitConfig {
  fn default() -> Self {
    Self {
      redis_url: None,
      analytics: RolePolicy::new(20, 10, 30),
      csv:       RolePolicy::new(20, 6, 12),
      xlsx:      RolePolicy::new(20, 3, 6),
      pdf:       RolePolicy::new(20, 6, 12),
    }
  }
}

impl RateLimitConfig {
  pub fn policy(&self, endpoint: Endpoint) -> &RolePolicy {
    match endpoint {
      Endpoint::Analytics => &self.analytics,
      Endpoint::Csv => &self.csv,
      Endpoint::Xlsx => &self.xlsx,
      Endpoint::Pdf => &self.pdf,
    }
  }
}

// ─── Buckets ─────────────────────────────────────────────────────────────────

/// Bucket state right after a hit was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
  /// Hits in the current window, including this one.
  pub count:      u64,
  pub expires_at: DateTime<Utc>,
}

/// Storage for rate-limit buckets.
pub trait BucketStore: Send + Sync {
  /// Atomically record one hit on `key` and return the bucket. A missing or
  /// expired bucket restarts at `count = 1` expiring `window` after `now`.
  fn hit(
    &self,
    key: &str,
    window: Duration,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Hit>> + Send;

  /// Release connections and drop state. Later hits may fail.
  fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Bucket key: `<role|anon>:<username|ip|unknown>:<path>`.
pub fn bucket_key(actor: Option<&Actor>, ip: Option<IpAddr>, path: &str) -> String {
  let role = actor.map_or("anon", |a| a.role.as_str());
  let identity = match (actor, ip) {
    (Some(a), _) => a.username.clone(),
    (None, Some(ip)) => ip.to_string(),
    (None, None) => "unknown".to_owned(),
  };
  format!("{role}:{identity}:{path}")
}

// ─── Limiter ─────────────────────────────────────────────────────────────────

/// Outcome of [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
  Admitted,
  Rejected { retry_after: u64 },
}

/// Admission control over an optional durable store with in-memory fallback.
pub struct RateLimiter<D = RedisBucketStore> {
  durable: Option<D>,
  memory:  MemoryBucketStore,
  timeout: Duration,
}

impl RateLimiter<RedisBucketStore> {
  /// A limiter that never leaves the process.
  pub fn in_memory() -> Self { Self::new(None) }

  /// Connect to Redis when `redis_url` is configured. A failed connection is
  /// logged and the limiter runs in memory.
  pub async fn from_config(config: &RateLimitConfig) -> Self {
    let Some(url) = config.redis_url.as_deref() else {
      tracing::info!("rate limiting with in-memory buckets");
      return Self::in_memory();
    };

    match tokio::time::timeout(DURABLE_TIMEOUT * 4, RedisBucketStore::connect(url)).await {
      Ok(Ok(store)) => {
        tracing::info!("rate limiting with redis buckets");
        Self::new(Some(store))
      }
      Ok(Err(e)) => {
        tracing::warn!(error = %e, "redis unavailable; rate limiting in memory");
        Self::in_memory()
      }
      Err(_) => {
        tracing::warn!("redis connect timed out; rate limiting in memory");
        Self::in_memory()
      }
    }
  }
}

impl<D: BucketStore> RateLimiter<D> {
  pub fn new(durable: Option<D>) -> Self {
    Self { durable, memory: MemoryBucketStore::default(), timeout: DURABLE_TIMEOUT }
  }

  /// Record a hit on `key` and decide whether it is admitted under `window`.
  pub async fn check(&self, key: &str, window: Window) -> Decision {
    self.check_at(key, window, Utc::now()).await
  }

  pub async fn check_at(&self, key: &str, window: Window, now: DateTime<Utc>) -> Decision {
    let hit = self.hit(key, window.duration(), now).await;
    // The first hit of a fresh bucket is always admitted.
    if hit.count == 1 || hit.count <= window.max {
      return Decision::Admitted;
    }
    let remaining_ms = (hit.expires_at - now).num_milliseconds().max(0) as u64;
    Decision::Rejected { retry_after: remaining_ms.div_ceil(1000) }
  }

  async fn hit(&self, key: &str, window: Duration, now: DateTime<Utc>) -> Hit {
    if let Some(durable) = &self.durable {
      match tokio::time::timeout(self.timeout, durable.hit(key, window, now)).await {
        Ok(Ok(hit)) => return hit,
        Ok(Err(e)) => {
          tracing::warn!(error = %e, key, "durable rate-limit store failed; using memory");
        }
        Err(_) => {
          tracing::warn!(
            error = %Error::Timeout(self.timeout),
            key,
            "durable rate-limit store failed; using memory"
          );
        }
      }
    }
    self.memory.record(key, window, now)
  }

  /// Tear down both stores.
  pub async fn close(&self) {
    if let Some(durable) = &self.durable {
      durable.close().await;
    }
    self.memory.close().await;
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicU64, Ordering};

  use chrono::{TimeDelta, TimeZone};

  use super::*;

  fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() }

  /// A durable store that always errors.
  struct Broken {
    calls: AtomicU64,
  }

  impl BucketStore for Broken {
    async fn hit(&self, _: &str, _: Duration, _: DateTime<Utc>) -> Result<Hit> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      Err(Error::Closed)
    }

    async fn close(&self) {}
  }

  /// A durable store that never answers.
  struct Stalled;

  impl BucketStore for Stalled {
    async fn hit(&self, _: &str, _: Duration, _: DateTime<Utc>) -> Result<Hit> {
      std::future::pending().await
    }

    async fn close(&self) {}
  }

  #[tokio::test]
  async fn rejects_after_max_with_retry_after() {
    let limiter = RateLimiter::in_memory();
    let window = Window::per_minute(3);

    for _ in 0..3 {
      assert_eq!(limiter.check_at("k", window, t0()).await, Decision::Admitted);
    }
    let later = t0() + TimeDelta::milliseconds(20_500);
    assert_eq!(
      limiter.check_at("k", window, later).await,
      Decision::Rejected { retry_after: 40 }
    );

    // Other keys are unaffected.
    assert_eq!(limiter.check_at("other", window, later).await, Decision::Admitted);
  }

  #[tokio::test]
  async fn window_expiry_resets_bucket() {
    let limiter = RateLimiter::in_memory();
    let window = Window::per_minute(1);

    assert_eq!(limiter.check_at("k", window, t0()).await, Decision::Admitted);
    assert!(matches!(
      limiter.check_at("k", window, t0()).await,
      Decision::Rejected { retry_after: 60 }
    ));
    let after = t0() + TimeDelta::milliseconds(60_001);
    assert_eq!(limiter.check_at("k", window, after).await, Decision::Admitted);
  }

  #[tokio::test]
  async fn first_hit_is_admitted_even_with_zero_max() {
    let limiter = RateLimiter::in_memory();
    let window = Window::per_minute(0);

    assert_eq!(limiter.check_at("k", window, t0()).await, Decision::Admitted);
    assert_eq!(
      limiter.check_at("k", window, t0()).await,
      Decision::Rejected { retry_after: 60 }
    );
  }

  #[tokio::test]
  async fn hit_at_expiry_instant_is_still_limited() {
    let limiter = RateLimiter::in_memory();
    let window = Window::per_minute(1);

    assert_eq!(limiter.check_at("k", window, t0()).await, Decision::Admitted);
    let edge = t0() + TimeDelta::seconds(60);
    assert_eq!(
      limiter.check_at("k", window, edge).await,
      Decision::Rejected { retry_after: 0 }
    );
  }

  #[tokio::test]
  async fn durable_errors_fall_back_to_memory() {
    let limiter = RateLimiter::new(Some(Broken { calls: AtomicU64::new(0) }));
    let window = Window::per_minute(2);

    assert_eq!(limiter.check_at("k", window, t0()).await, Decision::Admitted);
    assert_eq!(limiter.check_at("k", window, t0()).await, Decision::Admitted);
    assert!(matches!(
      limiter.check_at("k", window, t0()).await,
      Decision::Rejected { .. }
    ));
    assert_eq!(limiter.durable.as_ref().unwrap().calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn durable_timeouts_fall_back_to_memory() {
    let mut limiter = RateLimiter::new(Some(Stalled));
    limiter.timeout = Duration::from_millis(10);
    let window = Window::per_minute(1);

    assert_eq!(limiter.check_at("k", window, t0()).await, Decision::Admitted);
    assert!(matches!(
      limiter.check_at("k", window, t0()).await,
      Decision::Rejected { .. }
    ));
  }

  #[test]
  fn keys_prefer_identity_over_ip() {
    let actor = Actor { username: "prof".into(), role: Role::Faculty };
    let ip: IpAddr = "10.0.0.7".parse().unwrap();

    assert_eq!(bucket_key(Some(&actor), Some(ip), "/p"), "faculty:prof:/p");
    assert_eq!(bucket_key(None, Some(ip), "/p"), "anon:10.0.0.7:/p");
    assert_eq!(bucket_key(None, None, "/p"), "anon:unknown:/p");
  }

  #[test]
  fn default_policies() {
    let config = RateLimitConfig::default();
    assert_eq!(config.policy(Endpoint::Csv).window(Some(Role::Faculty)).max, 6);
    assert_eq!(config.policy(Endpoint::Xlsx).window(Some(Role::Admin)).max, 6);
    assert_eq!(config.policy(Endpoint::Pdf).window(None).max, 20);
    assert_eq!(config.policy(Endpoint::Analytics).window(Some(Role::Faculty)).max, 10);
    assert_eq!(config.policy(Endpoint::Analytics).window(Some(Role::Admin)).window_ms, 60_000);
  }
}
