use crate::AppState;
use actix_multipart::{Field, Multipart};
use actix_web::web::{self, ServiceConfig};
use actix_web_validator::{Json, Path, Query};
use futures::StreamExt;
use overlay_error::{web::WebError, WebResult};
use overlay_models::{
    domain::prelude::{
        NewImage, OverlayListParams, OverlayPatch, OverlayQuery, OverlayRecord, PathId,
    },
    web::WebResponse,
};
use overlay_view::{admin::CreateOverlayForm, viewer::Viewer};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, instrument};

pub(super) const ROUTER_PREFIX: &str = "/overlays";

/// Upper bound for a single text field of the create form.
const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;

/// Configure overlay routes
///
/// # Routes
/// - GET ``: list overlays (`active`, `type`, `componentName`, `sort`)
/// - POST ``: create an overlay from a multipart form
/// - GET `/active`: the overlay the viewer would show, or `null`
/// - GET `/{id}`: overlay by id
/// - PATCH `/{id}`: partial update
/// - POST `/{id}/activate`, POST `/{id}/deactivate`
/// - PUT `/{id}/parameters`: replace the parameter object
/// - DELETE `/{id}`
pub(crate) fn configure_routes(cfg: &mut ServiceConfig) {
    cfg.route("", web::get().to(list))
        .route("", web::post().to(create))
        .route("/active", web::get().to(active))
        .route("/{id}", web::get().to(get_by_id))
        .route("/{id}", web::patch().to(update))
        .route("/{id}", web::delete().to(delete))
        .route("/{id}/activate", web::post().to(activate))
        .route("/{id}/deactivate", web::post().to(deactivate))
        .route("/{id}/parameters", web::put().to(update_parameters));
}

async fn list(
    state: web::Data<Arc<AppState>>,
    params: Query<OverlayListParams>,
) -> WebResult<WebResponse<Vec<OverlayRecord>>> {
    let query = OverlayQuery::try_from(params.into_inner()).map_err(WebError::BadRequest)?;
    Ok(WebResponse::ok(state.store.list(&query).await?))
}

async fn active(
    state: web::Data<Arc<AppState>>,
) -> WebResult<WebResponse<Option<OverlayRecord>>> {
    let snapshot = Viewer::resolve(state.store.as_ref()).await?;
    Ok(WebResponse::ok(snapshot.record))
}

async fn get_by_id(
    state: web::Data<Arc<AppState>>,
    req: Path<PathId>,
) -> WebResult<WebResponse<OverlayRecord>> {
    let id = req.id;
    let record = state
        .store
        .get(id)
        .await?
        .ok_or_else(|| WebError::NotFound(format!("overlay {id}")))?;
    Ok(WebResponse::ok(record))
}

#[instrument(name = "api-overlay-create", skip_all)]
async fn create(
    state: web::Data<Arc<AppState>>,
    mut multipart: Multipart,
) -> WebResult<WebResponse<OverlayRecord>> {
    let form = read_create_form(&mut multipart, state.max_upload_bytes).await?;
    let payload = form
        .validate()
        .map_err(|msg| WebError::BadRequest(msg.to_string()))?;
    let record = state.store.create(payload).await?;
    info!(overlay_id = record.id, "Overlay created");
    Ok(WebResponse::ok(record))
}

async fn update(
    state: web::Data<Arc<AppState>>,
    req: Path<PathId>,
    patch: Json<OverlayPatch>,
) -> WebResult<WebResponse<OverlayRecord>> {
    let patch = patch.into_inner();
    if patch.is_empty() {
        return Err(WebError::BadRequest("Nothing to update".to_string()));
    }
    Ok(WebResponse::ok(state.store.update(req.id, patch).await?))
}

async fn activate(
    state: web::Data<Arc<AppState>>,
    req: Path<PathId>,
) -> WebResult<WebResponse<OverlayRecord>> {
    Ok(WebResponse::ok(
        state.store.update(req.id, OverlayPatch::activate()).await?,
    ))
}

async fn deactivate(
    state: web::Data<Arc<AppState>>,
    req: Path<PathId>,
) -> WebResult<WebResponse<OverlayRecord>> {
    Ok(WebResponse::ok(
        state.store.update(req.id, OverlayPatch::deactivate()).await?,
    ))
}

async fn update_parameters(
    state: web::Data<Arc<AppState>>,
    req: Path<PathId>,
    parameters: web::Json<Map<String, Value>>,
) -> WebResult<WebResponse<OverlayRecord>> {
    Ok(WebResponse::ok(
        state
            .store
            .update(req.id, OverlayPatch::parameters(parameters.into_inner()))
            .await?,
    ))
}

async fn delete(
    state: web::Data<Arc<AppState>>,
    req: Path<PathId>,
) -> WebResult<WebResponse<()>> {
    state.store.delete(req.id).await?;
    Ok(WebResponse::<()>::ok_empty())
}

/// Collect the create form. Unknown fields are drained and ignored.
///
/// # Errors
/// - 400 on malformed multipart or an oversized text field
/// - 413 when the image exceeds `max_image_bytes`
async fn read_create_form(
    multipart: &mut Multipart,
    max_image_bytes: usize,
) -> WebResult<CreateOverlayForm> {
    let mut form = CreateOverlayForm::default();

    while let Some(field) = multipart.next().await {
        let mut field = field?;
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "short_description" | "shortDescription" => {
                form.short_description = read_text(&mut field).await?;
            }
            "type" => {
                form.overlay_type = read_text(&mut field).await?.trim().parse().ok();
            }
            "component_name" | "componentName" => {
                form.component_name = read_text(&mut field).await?;
            }
            "image" => {
                let file_name = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .unwrap_or_default()
                    .to_string();
                let mime = field
                    .content_type()
                    .map(|m| m.essence_str().to_string())
                    .unwrap_or_default();
                let bytes = read_bytes(&mut field, max_image_bytes).await?;
                if !bytes.is_empty() {
                    form.image = Some(NewImage {
                        file_name,
                        mime,
                        bytes,
                    });
                }
            }
            _ => {
                while let Some(chunk) = field.next().await {
                    chunk?;
                }
            }
        }
    }

    Ok(form)
}

async fn read_text(field: &mut Field) -> WebResult<String> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.next().await {
        let data = chunk?;
        if buf.len() + data.len() > MAX_TEXT_FIELD_BYTES {
            return Err(WebError::BadRequest("Form field too large".to_string()));
        }
        buf.extend_from_slice(&data);
    }
    String::from_utf8(buf).map_err(|_| WebError::BadRequest("Form field is not UTF-8".to_string()))
}

/// Read a file field with a hard size limit to avoid memory abuse.
async fn read_bytes(field: &mut Field, max_bytes: usize) -> WebResult<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();
    let mut total: usize = 0;
    while let Some(chunk) = field.next().await {
        let data = chunk?;
        total = total.saturating_add(data.len());
        if total > max_bytes {
            return Err(WebError::PayloadTooLarge(format!(
                "File too large: {} bytes (max {})",
                total, max_bytes
            )));
        }
        buf.extend_from_slice(&data);
    }
    Ok(buf)
}
