//! User management: role-filtered listing, account creation, activation
//! toggling and welcome-token resending.

use serde::{Deserialize, Serialize};

use crate::{
    api::{ApiClient, ApiError},
    session::Role,
};

#[derive(Clone, Debug, Deserialize)]
pub struct Usuario {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: Role,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub entidad: Option<i64>,
}

fn default_active() -> bool {
    true
}

#[derive(Clone, Debug, Serialize)]
pub struct NuevoUsuario {
    pub username: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entidad: Option<i64>,
}

pub async fn list(api: &ApiClient, role: Option<Role>) -> Result<Vec<Usuario>, ApiError> {
    let mut query: Vec<(&str, String)> = Vec::new();
    if let Some(role) = role {
        query.push(("role", role.as_str().to_string()));
    }
    api.get_json("/users/", &query).await
}

pub async fn create(api: &ApiClient, nuevo: &NuevoUsuario) -> Result<Usuario, ApiError> {
    api.post_json("/usuarios/", nuevo).await
}

/// Flip the account's active flag. Returns the updated user.
pub async fn toggle_active(api: &ApiClient, id: i64) -> Result<Usuario, ApiError> {
    api.patch_json(&format!("/users/{id}/toggle_active/"), &serde_json::json!({}))
        .await
}

/// Re-send the account-activation token to a user who never set a password.
pub async fn resend_token(api: &ApiClient, id: i64) -> Result<(), ApiError> {
    let url = api.url(&format!("/usuarios/{id}/resend_token/"));
    api.execute(|http| http.post(&url)).await?;
    Ok(())
}
