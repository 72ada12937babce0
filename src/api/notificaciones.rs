//! Notification feed and the mark-as-seen batch action.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, ApiError};

#[derive(Clone, Debug, Deserialize)]
pub struct Notificacion {
    pub id: i64,
    pub mensaje: String,
    #[serde(default)]
    pub fecha: Option<NaiveDate>,
    #[serde(default)]
    pub visto: bool,
    pub destinatario: i64,
}

#[derive(Serialize)]
struct MarcarVista<'a> {
    ids: &'a [i64],
}

pub async fn list(api: &ApiClient) -> Result<Vec<Notificacion>, ApiError> {
    api.get_json("/notificaciones/", &[]).await
}

/// `POST /notificaciones/marcar_vista/`: mark the given notifications seen.
pub async fn marcar_vista(api: &ApiClient, ids: &[i64]) -> Result<(), ApiError> {
    let url = api.url("/notificaciones/marcar_vista/");
    api.execute(|http| http.post(&url).json(&MarcarVista { ids }))
        .await?;
    Ok(())
}
