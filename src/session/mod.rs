//! Client-side session lifecycle: token storage, identity claims and the
//! fixed-duration auto-logout window.
//!
//! The store is the single source of truth for "who is logged in". It owns
//! the auto-logout timer as an explicit field: scheduling a new timer always
//! aborts the previous one, so at most one pending logout task exists
//! process-wide.

pub mod storage;

use std::{
    fmt,
    str::FromStr,
    sync::{Arc, Mutex},
};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::api::{
    ApiError,
    auth::{AuthApi, TokenPair},
};
use storage::{SessionFile, StoredSession};

/// Roles understood by the platform, least to most privileged.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Usuario,
    Responsable,
    Admin,
    Superadmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Usuario => "usuario",
            Role::Responsable => "responsable",
            Role::Admin => "admin",
            Role::Superadmin => "superadmin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "usuario" => Ok(Role::Usuario),
            "responsable" => Ok(Role::Responsable),
            "admin" => Ok(Role::Admin),
            "superadmin" => Ok(Role::Superadmin),
            other => Err(format!(
                "unknown role {other:?}, expected usuario | responsable | admin | superadmin"
            )),
        }
    }
}

/// Identity claims carried in the JWT payload segment.
#[derive(Clone, Debug, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub entidad_id: Option<i64>,
    #[serde(default)]
    pub exp: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClaimsError {
    #[error("token is not a three-segment JWT")]
    MissingPayload,
    #[error("token payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("token payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode the identity claims from a JWT without verifying the signature.
/// The API is the authority on token validity; the client only needs the
/// payload for display and render gating.
pub fn decode_claims(token: &str) -> Result<Claims, ClaimsError> {
    let payload = token.split('.').nth(1).ok_or(ClaimsError::MissingPayload)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// An authenticated session. At most one exists per store.
#[derive(Clone, Debug)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub claims: Claims,
    /// Effective role: the server-declared role from login wins over the
    /// role embedded in the token claims.
    pub role: Role,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

struct Inner {
    duration: Duration,
    file: SessionFile,
    state: RwLock<Option<Session>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    pub fn new(duration: Duration, file: SessionFile) -> Self {
        Self {
            inner: Arc::new(Inner {
                duration,
                file,
                state: RwLock::new(None),
                timer: Mutex::new(None),
            }),
        }
    }

    pub fn duration(&self) -> Duration {
        self.inner.duration
    }

    /// Exchange credentials for a token pair and open a session. Returns the
    /// effective role so the caller can route accordingly.
    pub async fn login(
        &self,
        auth: &AuthApi,
        username: &str,
        password: &str,
    ) -> Result<Role, ApiError> {
        let pair = auth.obtain_token(username, password).await?;
        self.install(pair).await
    }

    pub(crate) async fn install(&self, pair: TokenPair) -> Result<Role, ApiError> {
        let claims = decode_claims(&pair.access)?;
        let now = Utc::now();
        let role = pair.role.or(claims.role).unwrap_or(Role::Usuario);

        let session = Session {
            access_token: pair.access,
            refresh_token: pair.refresh,
            claims,
            role,
            last_activity: now,
            expires_at: now + self.inner.duration,
        };
        self.persist(&session)
            .map_err(ApiError::SessionStorage)?;

        *self.inner.state.write().await = Some(session);
        self.schedule_logout(self.inner.duration);

        Ok(role)
    }

    /// Reinstate a persisted session if its activity window has not elapsed.
    /// Runs once at startup and never touches the network: only the local
    /// clock and local storage are trusted. Returns whether a session was
    /// restored.
    pub async fn restore(&self) -> anyhow::Result<bool> {
        let Some(stored) = self.inner.file.load()? else {
            return Ok(false);
        };

        let Some(last_activity) = Utc.timestamp_millis_opt(stored.last_activity).single() else {
            warn!("stored lastActivity is out of range, discarding session");
            self.inner.file.clear()?;
            return Ok(false);
        };

        let Some(remaining) = remaining_window(self.inner.duration, last_activity, Utc::now())
        else {
            info!("stored session exceeded the activity window, clearing it");
            self.inner.file.clear()?;
            return Ok(false);
        };

        let claims = match decode_claims(&stored.auth_token) {
            Ok(claims) => claims,
            Err(err) => {
                warn!(%err, "stored token is not decodable, discarding session");
                self.inner.file.clear()?;
                return Ok(false);
            }
        };

        let role = claims.role.unwrap_or(Role::Usuario);
        let session = Session {
            access_token: stored.auth_token,
            refresh_token: stored.refresh_token,
            claims,
            role,
            last_activity,
            expires_at: last_activity + self.inner.duration,
        };

        debug!(%role, remaining_minutes = remaining.num_minutes(), "session restored");
        *self.inner.state.write().await = Some(session);
        self.schedule_logout(remaining);

        Ok(true)
    }

    /// End the session: best-effort server-side invalidation of the refresh
    /// token, then unconditional local teardown. Calling this while already
    /// logged out is a no-op.
    pub async fn logout(&self, auth: &AuthApi) {
        if let Some(refresh) = self.refresh_token().await {
            if let Err(err) = auth.logout(&refresh).await {
                debug!(%err, "server-side logout failed, clearing the local session anyway");
            }
        }
        self.force_logout().await;
    }

    /// Local-only teardown, used on expiry and on unrecoverable refresh
    /// failure: cancel the pending timer, clear storage, reset state.
    pub async fn force_logout(&self) {
        self.cancel_timer();
        self.clear_local().await;
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.state.read().await.is_some()
    }

    pub async fn current(&self) -> Option<Session> {
        self.inner.state.read().await.clone()
    }

    pub async fn role(&self) -> Option<Role> {
        self.inner.state.read().await.as_ref().map(|s| s.role)
    }

    pub async fn access_token(&self) -> Option<String> {
        self.inner
            .state
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.inner
            .state
            .read()
            .await
            .as_ref()
            .and_then(|s| s.refresh_token.clone())
    }

    /// Record authenticated activity, in memory and in storage.
    pub async fn touch(&self) {
        let mut guard = self.inner.state.write().await;
        if let Some(session) = guard.as_mut() {
            session.last_activity = Utc::now();
            if let Err(err) = self.persist(session) {
                warn!(%err, "failed to persist session activity");
            }
        }
    }

    /// Swap in a rotated access token after a silent refresh. The effective
    /// role is kept: the refresh response carries no role declaration.
    pub(crate) async fn apply_refreshed_token(&self, access: String) -> Result<(), ClaimsError> {
        let claims = decode_claims(&access)?;
        let mut guard = self.inner.state.write().await;
        if let Some(session) = guard.as_mut() {
            session.access_token = access;
            session.claims = claims;
            session.last_activity = Utc::now();
            if let Err(err) = self.persist(session) {
                warn!(%err, "failed to persist refreshed session");
            }
        }
        Ok(())
    }

    fn persist(&self, session: &Session) -> anyhow::Result<()> {
        self.inner.file.save(&StoredSession {
            auth_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
            last_activity: session.last_activity.timestamp_millis(),
        })
    }

    async fn clear_local(&self) {
        if let Err(err) = self.inner.file.clear() {
            warn!(%err, "failed to clear the session file");
        }
        *self.inner.state.write().await = None;
    }

    /// Arm the auto-logout timer, aborting any previously scheduled one.
    fn schedule_logout(&self, delay: Duration) {
        let mut slot = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = slot.take() {
            previous.abort();
        }

        // A non-positive delay degenerates to an immediate logout. The sleep
        // is constructed here so its deadline is anchored at scheduling time,
        // not at the spawned task's first poll.
        let wait = delay.to_std().unwrap_or_default();
        let sleep = tokio::time::sleep(wait);
        let store = self.clone();
        *slot = Some(tokio::spawn(async move {
            sleep.await;
            info!("session window elapsed, logging out");
            store.clear_local().await;
            let mut slot = store
                .inner
                .timer
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *slot = None;
        }));
    }

    fn cancel_timer(&self) {
        let mut slot = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }

    #[cfg(test)]
    fn timer_is_armed(&self) -> bool {
        self.inner
            .timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }
}

/// Time left in the activity window, or `None` when
/// `now - last_activity >= duration` and the session must expire.
fn remaining_window(
    duration: Duration,
    last_activity: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<Duration> {
    let elapsed = now - last_activity;
    if elapsed < duration {
        Some(duration - elapsed)
    } else {
        None
    }
}
