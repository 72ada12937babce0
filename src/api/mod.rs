//! Authorized HTTP access to the Escomunidad API.
//!
//! Every request is decorated with `Authorization: Bearer <token>` from the
//! session store's current value at send time; there is no mutable default
//! header. A 401 answer triggers at most one silent refresh followed by one
//! replay of the original request. Refreshes across concurrent requests are
//! serialized behind a single guard so only one refresh call goes out.

pub mod anuncios;
pub mod auth;
pub mod chat;
pub mod entidades;
mod error;
pub mod notificaciones;
pub mod usuarios;

use std::path::Path;

use anyhow::Context as _;
use mime::Mime;
use reqwest::{Client, RequestBuilder, Response, StatusCode, multipart::Part};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::session::SessionStore;
use auth::AuthApi;
pub use error::ApiError;

pub struct ApiClient {
    http: Client,
    base_url: String,
    auth: AuthApi,
    session: SessionStore,
    /// Serializes silent refreshes: concurrent 401s must not fan out into
    /// parallel refresh calls.
    refresh_guard: Mutex<()>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session: SessionStore) -> Self {
        let http = Client::new();
        let base_url = base_url.into();
        let auth = AuthApi::new(http.clone(), base_url.clone());
        Self {
            http,
            base_url,
            auth,
            session,
            refresh_guard: Mutex::new(()),
        }
    }

    pub fn auth(&self) -> &AuthApi {
        &self.auth
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send an authorized request built by `make`, replaying it once behind a
    /// token refresh if the first attempt comes back 401. The builder closure
    /// is re-invoked for the replay so multipart bodies are rebuilt cleanly.
    pub async fn try_execute<F>(&self, make: F) -> Result<Response, ApiError>
    where
        F: Fn(&Client) -> Result<RequestBuilder, ApiError>,
    {
        let token = self.session.access_token().await;
        let first = self.attach_and_send(&make, token.as_deref()).await?;
        if first.status() != StatusCode::UNAUTHORIZED {
            return self.finish(first, token.is_some()).await;
        }
        if self.session.refresh_token().await.is_none() {
            // Nothing to refresh with; the rejection goes to the caller.
            return Err(ApiError::from_response(first).await);
        }

        let replay_token = self.refreshed_token(token.as_deref()).await?;
        let second = self.attach_and_send(&make, Some(&replay_token)).await?;
        if second.status() == StatusCode::UNAUTHORIZED {
            // The refreshed token is also invalid. Terminal: tear the
            // session down instead of chasing another refresh.
            warn!("replayed request still unauthorized, ending session");
            self.session.force_logout().await;
            return Err(ApiError::SessionExpired);
        }
        self.finish(second, true).await
    }

    pub async fn execute<F>(&self, make: F) -> Result<Response, ApiError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.try_execute(|http| Ok(make(http))).await
    }

    async fn attach_and_send<F>(
        &self,
        make: &F,
        token: Option<&str>,
    ) -> Result<Response, ApiError>
    where
        F: Fn(&Client) -> Result<RequestBuilder, ApiError>,
    {
        let mut builder = make(&self.http)?;
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        Ok(builder.send().await?)
    }

    async fn finish(&self, response: Response, authed: bool) -> Result<Response, ApiError> {
        if response.status().is_success() {
            if authed {
                self.session.touch().await;
            }
            Ok(response)
        } else {
            Err(ApiError::from_response(response).await)
        }
    }

    /// Obtain the token to replay with. Exactly one task refreshes; a task
    /// that finds the token already rotated while it waited just reuses it.
    async fn refreshed_token(&self, stale: Option<&str>) -> Result<String, ApiError> {
        let _guard = self.refresh_guard.lock().await;

        if let Some(current) = self.session.access_token().await {
            if stale != Some(current.as_str()) {
                return Ok(current);
            }
        }

        let Some(refresh) = self.session.refresh_token().await else {
            return Err(ApiError::SessionExpired);
        };

        match self.auth.refresh(&refresh).await {
            Ok(access) => {
                if self
                    .session
                    .apply_refreshed_token(access.clone())
                    .await
                    .is_err()
                {
                    warn!("refresh endpoint returned an undecodable token, ending session");
                    self.session.force_logout().await;
                    return Err(ApiError::SessionExpired);
                }
                debug!("access token refreshed after a 401");
                Ok(access)
            }
            Err(err) => {
                warn!(%err, "token refresh failed, ending session");
                self.session.force_logout().await;
                Err(ApiError::SessionExpired)
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self.execute(|http| http.get(&url).query(query)).await?;
        Ok(response.json().await?)
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self.execute(|http| http.post(&url).json(body)).await?;
        Ok(response.json().await?)
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self.execute(|http| http.put(&url).json(body)).await?;
        Ok(response.json().await?)
    }

    pub async fn patch_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self.execute(|http| http.patch(&url).json(body)).await?;
        Ok(response.json().await?)
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let url = self.url(path);
        self.execute(|http| http.delete(&url)).await?;
        Ok(())
    }
}

/// An in-memory file destined for a multipart field. Reading the bytes up
/// front keeps the request rebuildable for the 401 replay.
#[derive(Clone, Debug)]
pub struct Upload {
    pub filename: String,
    pub content_type: Mime,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("unable to derive a filename from {path:?}"))?
            .to_string();
        let bytes =
            std::fs::read(path).with_context(|| format!("failed to read upload from {path:?}"))?;
        let content_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(mime_for_extension)
            .unwrap_or(mime::APPLICATION_OCTET_STREAM);

        Ok(Self {
            filename,
            content_type,
            bytes,
        })
    }

    pub(crate) fn part(&self) -> Result<Part, ApiError> {
        Ok(Part::bytes(self.bytes.clone())
            .file_name(self.filename.clone())
            .mime_str(self.content_type.as_ref())?)
    }
}

fn mime_for_extension(extension: &str) -> Mime {
    match extension.to_ascii_lowercase().as_str() {
        "png" => mime::IMAGE_PNG,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "gif" => mime::IMAGE_GIF,
        "webp" => "image/webp"
            .parse()
            .unwrap_or(mime::APPLICATION_OCTET_STREAM),
        "pdf" => mime::APPLICATION_PDF,
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        Router,
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::get,
    };
    use serde_json::{Value, json};

    use super::testutil::{FakeApi, forge_token, fresh_store};
    use super::*;
    use crate::api::auth::TokenPair;

    /// `GET /protected/` accepts only the fake API's fresh token.
    async fn protected(
        State(state): State<FakeApi>,
        headers: HeaderMap,
    ) -> Result<axum::Json<Value>, StatusCode> {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == format!("Bearer {}", state.fresh_token))
            .unwrap_or(false);
        if authorized {
            Ok(axum::Json(json!({ "ok": true })))
        } else {
            Err(StatusCode::UNAUTHORIZED)
        }
    }

    async fn client_with_session(refresh: &str) -> (ApiClient, FakeApi, tempfile::TempDir) {
        let fake = FakeApi::new(forge_token(7, "marta", "responsable"));
        let base = fake
            .clone()
            .serve(Router::new().route("/protected/", get(protected)))
            .await;

        let (session, dir) = fresh_store();
        session
            .install(TokenPair {
                // Decodable but no longer accepted by the server.
                access: forge_token(7, "marta", "usuario"),
                refresh: Some(refresh.to_string()),
                role: None,
            })
            .await
            .expect("install session");

        (ApiClient::new(base, session), fake, dir)
    }

    #[tokio::test]
    async fn single_401_refreshes_and_replays_once() {
        let (client, fake, _dir) = client_with_session("good-refresh").await;

        let body: Value = client.get_json("/protected/", &[]).await.expect("replayed");
        assert_eq!(body, json!({ "ok": true }));
        assert_eq!(fake.refresh_count(), 1);

        // The rotated token is now the session's current one.
        assert_eq!(
            client.session().access_token().await.as_deref(),
            Some(fake.fresh_token.as_str())
        );
        client.session().force_logout().await;
    }

    #[tokio::test]
    async fn refresh_failure_forces_logout() {
        let (client, fake, _dir) = client_with_session("revoked-refresh").await;

        let err = client
            .get_json::<Value>("/protected/", &[])
            .await
            .expect_err("refresh must fail");
        assert!(matches!(err, ApiError::SessionExpired));
        assert_eq!(fake.refresh_count(), 1);
        assert!(!client.session().is_authenticated().await);
    }

    #[tokio::test]
    async fn second_401_does_not_refresh_again() {
        // The server rejects every bearer token, so the replay with the
        // refreshed token also comes back 401.
        async fn always_401() -> StatusCode {
            StatusCode::UNAUTHORIZED
        }

        let fake = FakeApi::new(forge_token(7, "marta", "responsable"));
        let base = fake
            .clone()
            .serve(Router::new().route("/protected/", get(always_401)))
            .await;

        let (session, _dir) = fresh_store();
        session
            .install(TokenPair {
                access: forge_token(7, "marta", "usuario"),
                refresh: Some("good-refresh".to_string()),
                role: None,
            })
            .await
            .expect("install session");
        let client = ApiClient::new(base, session);

        let err = client
            .get_json::<Value>("/protected/", &[])
            .await
            .expect_err("replay must fail");
        assert!(matches!(err, ApiError::SessionExpired));
        assert_eq!(fake.refresh_count(), 1);
        assert!(!client.session().is_authenticated().await);
    }

    #[tokio::test]
    async fn unauthenticated_401_passes_through() {
        let fake = FakeApi::new(forge_token(7, "marta", "responsable"));
        let base = fake
            .clone()
            .serve(Router::new().route("/protected/", get(protected)))
            .await;

        let (session, _dir) = fresh_store();
        let client = ApiClient::new(base, session);

        let err = client
            .get_json::<Value>("/protected/", &[])
            .await
            .expect_err("must be rejected");
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(fake.refresh_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_401s_share_one_refresh() {
        let (client, fake, _dir) = client_with_session("good-refresh").await;
        let client = Arc::new(client);

        let a = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.get_json::<Value>("/protected/", &[]).await })
        };
        let b = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.get_json::<Value>("/protected/", &[]).await })
        };

        assert!(a.await.expect("join").is_ok());
        assert!(b.await.expect("join").is_ok());
        assert_eq!(fake.refresh_count(), 1);
        client.session().force_logout().await;
    }

    #[test]
    fn mime_guessing_covers_platform_uploads() {
        assert_eq!(mime_for_extension("png"), mime::IMAGE_PNG);
        assert_eq!(mime_for_extension("JPG"), mime::IMAGE_JPEG);
        assert_eq!(mime_for_extension("pdf"), mime::APPLICATION_PDF);
        assert_eq!(mime_for_extension("bin"), mime::APPLICATION_OCTET_STREAM);
    }
}
