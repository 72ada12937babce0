//! Entity (organization) resource: CRUD on `/entidades/`, with a multipart
//! cover-image upload.

use reqwest::multipart::Form;
use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, ApiError, Upload};

#[derive(Clone, Debug, Deserialize)]
pub struct Entidad {
    pub id: i64,
    pub nombre: String,
    #[serde(default)]
    pub contacto: Option<String>,
    #[serde(default)]
    pub correo: Option<String>,
    #[serde(default)]
    pub telefono: Option<String>,
    #[serde(default)]
    pub foto_portada: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct EntidadDraft {
    pub nombre: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contacto: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telefono: Option<String>,
}

pub async fn list(api: &ApiClient) -> Result<Vec<Entidad>, ApiError> {
    api.get_json("/entidades/", &[]).await
}

pub async fn get(api: &ApiClient, id: i64) -> Result<Entidad, ApiError> {
    api.get_json(&format!("/entidades/{id}/"), &[]).await
}

pub async fn create(
    api: &ApiClient,
    draft: &EntidadDraft,
    cover: Option<&Upload>,
) -> Result<Entidad, ApiError> {
    if cover.is_none() {
        return api.post_json("/entidades/", draft).await;
    }

    let url = api.url("/entidades/");
    let response = api
        .try_execute(|http| Ok(http.post(&url).multipart(form_for(draft, cover)?)))
        .await?;
    Ok(response.json().await?)
}

pub async fn update(
    api: &ApiClient,
    id: i64,
    draft: &EntidadDraft,
    cover: Option<&Upload>,
) -> Result<Entidad, ApiError> {
    if cover.is_none() {
        return api.put_json(&format!("/entidades/{id}/"), draft).await;
    }

    let url = api.url(&format!("/entidades/{id}/"));
    let response = api
        .try_execute(|http| Ok(http.put(&url).multipart(form_for(draft, cover)?)))
        .await?;
    Ok(response.json().await?)
}

pub async fn delete(api: &ApiClient, id: i64) -> Result<(), ApiError> {
    api.delete(&format!("/entidades/{id}/")).await
}

fn form_for(draft: &EntidadDraft, cover: Option<&Upload>) -> Result<Form, ApiError> {
    let mut form = Form::new().text("nombre", draft.nombre.clone());
    if let Some(correo) = &draft.correo {
        form = form.text("correo", correo.clone());
    }
    if let Some(contacto) = &draft.contacto {
        form = form.text("contacto", contacto.clone());
    }
    if let Some(telefono) = &draft.telefono {
        form = form.text("telefono", telefono.clone());
    }
    if let Some(cover) = cover {
        form = form.part("foto_portada", cover.part()?);
    }
    Ok(form)
}
