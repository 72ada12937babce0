//! Announcement resource: CRUD on `/anuncios/`, with multipart uploads for
//! the banner image and the attached PDF.

use chrono::NaiveDate;
use reqwest::multipart::Form;
use serde::{Deserialize, Serialize};

use crate::{
    api::{ApiClient, ApiError, Upload},
    review::EstadoAnuncio,
};

#[derive(Clone, Debug, Deserialize)]
pub struct Anuncio {
    pub id: i64,
    pub titulo: String,
    #[serde(default)]
    pub frase: Option<String>,
    pub descripcion: String,
    #[serde(default)]
    pub fecha_publicacion: Option<NaiveDate>,
    #[serde(default)]
    pub fecha_inicio: Option<NaiveDate>,
    #[serde(default)]
    pub fecha_fin: Option<NaiveDate>,
    #[serde(default)]
    pub banner: Option<String>,
    #[serde(default)]
    pub archivo_pdf: Option<String>,
    #[serde(default)]
    pub estado: EstadoAnuncio,
    /// Reviewer comment from the latest rejection, shown in the rejection
    /// drawer while the announcement stays rejected.
    #[serde(default)]
    pub comentarios_rechazo: Option<String>,
    pub entidad: i64,
    pub usuario: i64,
}

/// Fields the author controls. Used both for creation and for edits.
#[derive(Clone, Debug, Default, Serialize)]
pub struct AnuncioDraft {
    pub titulo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frase: Option<String>,
    pub descripcion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fecha_inicio: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fecha_fin: Option<NaiveDate>,
    pub entidad: i64,
    /// Set only by the resubmission flow, which moves a rejected
    /// announcement back to review.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estado: Option<EstadoAnuncio>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AnuncioFilter {
    pub entidad: Option<i64>,
    pub estado: Option<EstadoAnuncio>,
}

pub async fn list(api: &ApiClient, filter: &AnuncioFilter) -> Result<Vec<Anuncio>, ApiError> {
    let mut query: Vec<(&str, String)> = Vec::new();
    if let Some(entidad) = filter.entidad {
        query.push(("entidad", entidad.to_string()));
    }
    if let Some(estado) = filter.estado {
        query.push(("estado", estado.to_string()));
    }
    api.get_json("/anuncios/", &query).await
}

pub async fn get(api: &ApiClient, id: i64) -> Result<Anuncio, ApiError> {
    api.get_json(&format!("/anuncios/{id}/"), &[]).await
}

/// Public banner feed, served without authentication.
pub async fn public(api: &ApiClient) -> Result<Vec<Anuncio>, ApiError> {
    api.get_json("/anuncios/public/", &[]).await
}

pub async fn create(
    api: &ApiClient,
    draft: &AnuncioDraft,
    banner: Option<&Upload>,
    pdf: Option<&Upload>,
) -> Result<Anuncio, ApiError> {
    if banner.is_none() && pdf.is_none() {
        return api.post_json("/anuncios/", draft).await;
    }

    let url = api.url("/anuncios/");
    let response = api
        .try_execute(|http| Ok(http.post(&url).multipart(form_for(draft, banner, pdf)?)))
        .await?;
    Ok(response.json().await?)
}

pub async fn update(
    api: &ApiClient,
    id: i64,
    draft: &AnuncioDraft,
    banner: Option<&Upload>,
    pdf: Option<&Upload>,
) -> Result<Anuncio, ApiError> {
    if banner.is_none() && pdf.is_none() {
        return api.put_json(&format!("/anuncios/{id}/"), draft).await;
    }

    let url = api.url(&format!("/anuncios/{id}/"));
    let response = api
        .try_execute(|http| Ok(http.put(&url).multipart(form_for(draft, banner, pdf)?)))
        .await?;
    Ok(response.json().await?)
}

pub async fn delete(api: &ApiClient, id: i64) -> Result<(), ApiError> {
    api.delete(&format!("/anuncios/{id}/")).await
}

fn form_for(
    draft: &AnuncioDraft,
    banner: Option<&Upload>,
    pdf: Option<&Upload>,
) -> Result<Form, ApiError> {
    let mut form = Form::new()
        .text("titulo", draft.titulo.clone())
        .text("descripcion", draft.descripcion.clone())
        .text("entidad", draft.entidad.to_string());
    if let Some(frase) = &draft.frase {
        form = form.text("frase", frase.clone());
    }
    if let Some(fecha) = draft.fecha_inicio {
        form = form.text("fecha_inicio", fecha.format("%Y-%m-%d").to_string());
    }
    if let Some(fecha) = draft.fecha_fin {
        form = form.text("fecha_fin", fecha.format("%Y-%m-%d").to_string());
    }
    if let Some(estado) = draft.estado {
        form = form.text("estado", estado.to_string());
    }
    if let Some(banner) = banner {
        form = form.part("banner", banner.part()?);
    }
    if let Some(pdf) = pdf {
        form = form.part("archivo_pdf", pdf.part()?);
    }
    Ok(form)
}
