//! Announcement review workflow.
//!
//! Review states move one way: `pendiente` → `aprobado` or `rechazado`.
//! The only way back is `rechazado` → `pendiente`, and only as a side effect
//! of the owner resubmitting the announcement. The server enforces all of
//! this; the helpers here merely gate which controls the console offers, and
//! local state is mutated strictly after a confirmed 2xx.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    api::{ApiClient, ApiError, Upload, anuncios},
    api::anuncios::{Anuncio, AnuncioDraft},
    session::{Claims, Role},
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstadoAnuncio {
    #[default]
    Pendiente,
    Aprobado,
    Rechazado,
}

impl EstadoAnuncio {
    pub fn as_str(&self) -> &'static str {
        match self {
            EstadoAnuncio::Pendiente => "pendiente",
            EstadoAnuncio::Aprobado => "aprobado",
            EstadoAnuncio::Rechazado => "rechazado",
        }
    }
}

impl fmt::Display for EstadoAnuncio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EstadoAnuncio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pendiente" => Ok(EstadoAnuncio::Pendiente),
            "aprobado" => Ok(EstadoAnuncio::Aprobado),
            "rechazado" => Ok(EstadoAnuncio::Rechazado),
            other => Err(format!(
                "unknown estado {other:?}, expected pendiente | aprobado | rechazado"
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReviewAction {
    Aprobar,
    Rechazar,
}

impl ReviewAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewAction::Aprobar => "aprobar",
            ReviewAction::Rechazar => "rechazar",
        }
    }

    fn resulting_estado(&self) -> EstadoAnuncio {
        match self {
            ReviewAction::Aprobar => EstadoAnuncio::Aprobado,
            ReviewAction::Rechazar => EstadoAnuncio::Rechazado,
        }
    }
}

#[derive(Serialize)]
struct ReviewRequest<'a> {
    accion: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    comentario: Option<&'a str>,
}

/// Whether the approve/reject controls should be offered at all. This is a
/// render hint, not an enforcement boundary: the decision is still sent
/// without pre-validating the server-side state.
pub fn can_review(role: Role, estado: EstadoAnuncio) -> bool {
    let reviewer = matches!(role, Role::Responsable | Role::Admin | Role::Superadmin);
    reviewer && estado == EstadoAnuncio::Pendiente
}

/// Whether the resubmission flow applies: only the announcement's own
/// creator, and only while it sits in `rechazado`.
pub fn can_resubmit(claims: &Claims, anuncio: &Anuncio) -> bool {
    claims.user_id == anuncio.usuario && anuncio.estado == EstadoAnuncio::Rechazado
}

/// Send an approve/reject decision for the announcement. On a confirmed 2xx
/// the locally held `estado` flips to match, and a rejection comment is kept
/// for display; on failure the announcement is left exactly as it was.
pub async fn submit_review(
    api: &ApiClient,
    anuncio: &mut Anuncio,
    accion: ReviewAction,
    comentario: Option<&str>,
) -> Result<(), ApiError> {
    let url = api.url(&format!("/anuncios/{}/revisar/", anuncio.id));
    api.execute(|http| {
        http.post(&url).json(&ReviewRequest {
            accion: accion.as_str(),
            comentario,
        })
    })
    .await?;

    anuncio.estado = accion.resulting_estado();
    anuncio.comentarios_rechazo = match accion {
        ReviewAction::Rechazar => comentario.map(str::to_string),
        ReviewAction::Aprobar => None,
    };
    Ok(())
}

/// Resubmit a rejected announcement with its edited fields. The update
/// payload carries `estado: pendiente` explicitly; the prior rejection
/// comment is not part of the draft and is therefore never resent.
pub async fn resubmit(
    api: &ApiClient,
    anuncio: &mut Anuncio,
    mut draft: AnuncioDraft,
    banner: Option<&Upload>,
    pdf: Option<&Upload>,
) -> Result<(), ApiError> {
    draft.estado = Some(EstadoAnuncio::Pendiente);
    let updated = anuncios::update(api, anuncio.id, &draft, banner, pdf).await?;
    *anuncio = updated;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        Json, Router,
        http::StatusCode,
        routing::{post, put},
    };
    use serde_json::{Value, json};

    use super::*;
    use crate::api::ApiClient;
    use crate::api::auth::TokenPair;
    use crate::api::testutil::{FakeApi, forge_token, fresh_store};

    fn pending_anuncio() -> Anuncio {
        Anuncio {
            id: 7,
            titulo: "Feria del barrio".to_string(),
            frase: None,
            descripcion: "Actividades para toda la comunidad".to_string(),
            fecha_publicacion: None,
            fecha_inicio: None,
            fecha_fin: None,
            banner: None,
            archivo_pdf: None,
            estado: EstadoAnuncio::Pendiente,
            comentarios_rechazo: None,
            entidad: 3,
            usuario: 42,
        }
    }

    async fn client_for(routes: Router<FakeApi>) -> (ApiClient, tempfile::TempDir) {
        let fake = FakeApi::new(forge_token(7, "marta", "responsable"));
        let base = fake.clone().serve(routes).await;

        let (session, dir) = fresh_store();
        session
            .install(TokenPair {
                access: forge_token(7, "marta", "responsable"),
                refresh: None,
                role: None,
            })
            .await
            .expect("install session");
        (ApiClient::new(base, session), dir)
    }

    #[tokio::test]
    async fn approve_flips_estado_after_2xx() {
        let seen: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let captured = Arc::clone(&seen);
        let routes = Router::new().route(
            "/anuncios/7/revisar/",
            post(move |Json(body): Json<Value>| async move {
                *captured.lock().expect("capture lock") = Some(body);
                Json(json!({ "ok": true }))
            }),
        );
        let (client, _dir) = client_for(routes).await;

        let mut anuncio = pending_anuncio();
        submit_review(&client, &mut anuncio, ReviewAction::Aprobar, None)
            .await
            .expect("approve");

        assert_eq!(anuncio.estado, EstadoAnuncio::Aprobado);
        let body = seen.lock().expect("capture lock").clone().expect("payload");
        assert_eq!(body, json!({ "accion": "aprobar" }));
        client.session().force_logout().await;
    }

    #[tokio::test]
    async fn reject_sends_comment_and_keeps_it_locally() {
        let seen: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let captured = Arc::clone(&seen);
        let routes = Router::new().route(
            "/anuncios/7/revisar/",
            post(move |Json(body): Json<Value>| async move {
                *captured.lock().expect("capture lock") = Some(body);
                Json(json!({ "ok": true }))
            }),
        );
        let (client, _dir) = client_for(routes).await;

        let mut anuncio = pending_anuncio();
        submit_review(
            &client,
            &mut anuncio,
            ReviewAction::Rechazar,
            Some("Falta fecha"),
        )
        .await
        .expect("reject");

        assert_eq!(anuncio.estado, EstadoAnuncio::Rechazado);
        assert_eq!(anuncio.comentarios_rechazo.as_deref(), Some("Falta fecha"));
        let body = seen.lock().expect("capture lock").clone().expect("payload");
        assert_eq!(
            body,
            json!({ "accion": "rechazar", "comentario": "Falta fecha" })
        );
        client.session().force_logout().await;
    }

    #[tokio::test]
    async fn failed_review_leaves_estado_untouched() {
        let routes = Router::new().route(
            "/anuncios/7/revisar/",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let (client, _dir) = client_for(routes).await;

        let mut anuncio = pending_anuncio();
        let err = submit_review(&client, &mut anuncio, ReviewAction::Aprobar, None)
            .await
            .expect_err("server error must propagate");

        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR.into()));
        assert_eq!(anuncio.estado, EstadoAnuncio::Pendiente);
        assert_eq!(anuncio.comentarios_rechazo, None);
        client.session().force_logout().await;
    }

    #[tokio::test]
    async fn resubmit_moves_back_to_pendiente_without_old_comment() {
        let seen: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let captured = Arc::clone(&seen);
        let routes = Router::new().route(
            "/anuncios/7/",
            put(move |Json(body): Json<Value>| async move {
                *captured.lock().expect("capture lock") = Some(body);
                Json(json!({
                    "id": 7,
                    "titulo": "Feria del barrio (corregida)",
                    "descripcion": "Con la fecha incluida",
                    "estado": "pendiente",
                    "comentarios_rechazo": null,
                    "entidad": 3,
                    "usuario": 42,
                }))
            }),
        );
        let (client, _dir) = client_for(routes).await;

        let mut anuncio = pending_anuncio();
        anuncio.estado = EstadoAnuncio::Rechazado;
        anuncio.comentarios_rechazo = Some("Falta fecha".to_string());

        let draft = AnuncioDraft {
            titulo: "Feria del barrio (corregida)".to_string(),
            descripcion: "Con la fecha incluida".to_string(),
            entidad: 3,
            ..AnuncioDraft::default()
        };
        resubmit(&client, &mut anuncio, draft, None, None)
            .await
            .expect("resubmit");

        assert_eq!(anuncio.estado, EstadoAnuncio::Pendiente);
        assert_eq!(anuncio.comentarios_rechazo, None);

        let body = seen.lock().expect("capture lock").clone().expect("payload");
        assert_eq!(body.get("estado"), Some(&json!("pendiente")));
        assert!(body.get("comentarios_rechazo").is_none());
        client.session().force_logout().await;
    }

    #[test]
    fn review_controls_gated_by_role_and_estado() {
        assert!(can_review(Role::Responsable, EstadoAnuncio::Pendiente));
        assert!(can_review(Role::Superadmin, EstadoAnuncio::Pendiente));
        assert!(!can_review(Role::Usuario, EstadoAnuncio::Pendiente));
        assert!(!can_review(Role::Responsable, EstadoAnuncio::Aprobado));
        assert!(!can_review(Role::Responsable, EstadoAnuncio::Rechazado));
    }

    #[test]
    fn resubmission_gated_to_owner_of_rejected() {
        let mut anuncio = pending_anuncio();
        let owner = Claims {
            user_id: 42,
            username: "ana".to_string(),
            role: Some(Role::Usuario),
            entidad_id: Some(3),
            exp: None,
        };
        let stranger = Claims {
            user_id: 9,
            ..owner.clone()
        };

        assert!(!can_resubmit(&owner, &anuncio), "pending is not resubmittable");
        anuncio.estado = EstadoAnuncio::Rechazado;
        assert!(can_resubmit(&owner, &anuncio));
        assert!(!can_resubmit(&stranger, &anuncio));
    }

    #[test]
    fn estado_serializes_to_spanish_labels() {
        assert_eq!(
            serde_json::to_string(&EstadoAnuncio::Rechazado).expect("serialize"),
            "\"rechazado\""
        );
        let parsed: EstadoAnuncio = serde_json::from_str("\"aprobado\"").expect("parse");
        assert_eq!(parsed, EstadoAnuncio::Aprobado);
    }
}
