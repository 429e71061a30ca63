//! HTTP Basic-auth extractor, roles and role checks.

use std::fmt;

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, request::Parts};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use serde::{Deserialize, Serialize};
use tally_core::store::SurveyStore;

use crate::{AppState, error::ApiError};

/// Account role. Controls which routes a caller may use and which rate-limit
/// window applies to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Student,
  Faculty,
  Admin,
}

impl Role {
  pub fn as_str(self) -> &'static str {
    match self {
      Role::Student => "student",
      Role::Faculty => "faculty",
      Role::Admin => "admin",
    }
  }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// A provisioned account, as listed in configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
  pub role:          Role,
}

/// Credentials accepted as valid for this server instance.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
  pub accounts: Vec<Account>,
}

impl AuthConfig {
  pub fn new(accounts: Vec<Account>) -> Self { Self { accounts } }

  fn find(&self, username: &str) -> Option<&Account> {
    self.accounts.iter().find(|a| a.username == username)
  }
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
  pub username: String,
  pub role:     Role,
}

impl Actor {
  /// Faculty and admins manage surveys and read results.
  pub fn is_staff(&self) -> bool { matches!(self.role, Role::Faculty | Role::Admin) }

  /// `Forbidden` unless the caller holds one of `roles`.
  pub fn require(&self, roles: &[Role]) -> Result<(), ApiError> {
    if roles.contains(&self.role) {
      Ok(())
    } else {
      Err(ApiError::Forbidden(format!("role {} may not do this", self.role)))
    }
  }

  pub fn require_staff(&self) -> Result<(), ApiError> {
    self.require(&[Role::Faculty, Role::Admin])
  }
}

/// Verify `Authorization: Basic …` against the configured accounts.
pub fn verify_auth(headers: &HeaderMap, config: &AuthConfig) -> Result<Actor, ApiError> {
  let header_val = headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(ApiError::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(ApiError::Unauthorized)?;

  let decoded = B64.decode(encoded.trim()).map_err(|_| ApiError::Unauthorized)?;
  let creds   = std::str::from_utf8(&decoded).map_err(|_| ApiError::Unauthorized)?;

  let (username, password) = creds.split_once(':').ok_or(ApiError::Unauthorized)?;

  let account = config.find(username).ok_or(ApiError::Unauthorized)?;

  let parsed_hash = PasswordHash::new(&account.password_hash)
    .map_err(|_| ApiError::Unauthorized)?;

  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| ApiError::Unauthorized)?;

  Ok(Actor { username: account.username.clone(), role: account.role })
}

impl<S> FromRequestParts<AppState<S>> for Actor
where
  S: SurveyStore + Clone + Send + Sync + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let actor = verify_auth(&parts.headers, &state.auth);
    if let Err(e) = &actor {
      tracing::debug!(error = %e, path = %parts.uri.path(), "authentication failed");
    }
    actor
  }
}
