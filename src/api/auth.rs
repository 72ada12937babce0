//! Authentication endpoints. These are the only calls issued without a
//! bearer token, so they bypass the authorized wrapper entirely.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{api::ApiError, session::Role};

/// Response of `POST /token/`: an access token, usually a refresh token, and
/// the server-declared effective role.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenPair {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access: String,
}

#[derive(Clone)]
pub struct AuthApi {
    http: Client,
    base_url: String,
}

impl AuthApi {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// `POST /token/` with credentials. Invalid credentials surface as an
    /// [`ApiError::Status`] carrying the server's payload for display.
    pub async fn obtain_token(&self, username: &str, password: &str) -> Result<TokenPair, ApiError> {
        let response = self
            .http
            .post(format!("{}/token/", self.base_url))
            .json(&Credentials { username, password })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await);
        }
        Ok(response.json().await?)
    }

    /// `POST /token/refresh/`: trade a refresh token for a new access token.
    pub async fn refresh(&self, refresh: &str) -> Result<String, ApiError> {
        let response = self
            .http
            .post(format!("{}/token/refresh/", self.base_url))
            .json(&RefreshRequest { refresh })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await);
        }
        let body: RefreshResponse = response.json().await?;
        Ok(body.access)
    }

    /// `POST /logout/`: best-effort server-side invalidation of the refresh
    /// token. Local teardown never depends on this call succeeding.
    pub async fn logout(&self, refresh: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .post(format!("{}/logout/", self.base_url))
            .json(&RefreshRequest { refresh })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await);
        }
        Ok(())
    }

    /// `POST /auth/forgot-password/`: ask the API to mail a reset token.
    pub async fn forgot_password(&self, email: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .post(format!("{}/auth/forgot-password/", self.base_url))
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await);
        }
        Ok(())
    }

    /// `POST /auth/verify-reset-token/`: check a reset token before showing
    /// the new-password prompt. An expired token comes back as a non-2xx.
    pub async fn verify_reset_token(&self, token: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .post(format!("{}/auth/verify-reset-token/", self.base_url))
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await);
        }
        Ok(())
    }

    /// `POST /auth/reset-password/`: set a new password with a reset token.
    pub async fn reset_password(&self, token: &str, password: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .post(format!("{}/auth/reset-password/", self.base_url))
            .json(&serde_json::json!({ "token": token, "password": password }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await);
        }
        Ok(())
    }
}
