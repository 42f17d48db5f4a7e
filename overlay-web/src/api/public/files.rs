//! Overlay asset endpoint.
//!
//! # Routes
//! - GET `/files/overlays/{id}/{file_name}` (`?download=1` to save instead of display)

use crate::AppState;
use actix_web::{
    http::header::{self, ContentDisposition, DispositionParam, DispositionType, HeaderValue},
    web, HttpRequest, HttpResponse,
};
use overlay_error::{web::WebError, WebResult};
use overlay_models::constants::ASSET_ROUTE;
use serde::Deserialize;
use std::sync::Arc;

/// Configure asset routes.
pub fn configure_file_routes(cfg: &mut web::ServiceConfig) {
    cfg.route(
        format!("{ASSET_ROUTE}/{{id}}/{{file_name}}").as_str(),
        web::get().to(get_overlay_image),
    );
}

#[derive(Debug, Default, Deserialize)]
struct AssetParams {
    download: Option<String>,
}

impl AssetParams {
    fn wants_download(&self) -> bool {
        matches!(self.download.as_deref(), Some("1") | Some("true"))
    }
}

async fn get_overlay_image(
    req: HttpRequest,
    path: web::Path<(i32, String)>,
    params: web::Query<AssetParams>,
    state: web::Data<Arc<AppState>>,
) -> WebResult<HttpResponse> {
    let (id, file_name) = path.into_inner();
    let asset = state
        .store
        .image(id)
        .await?
        .filter(|asset| asset.file_name == file_name)
        .ok_or_else(|| WebError::NotFound(format!("{ASSET_ROUTE}/{id}/{file_name}")))?;

    let etag = build_weak_etag(asset.updated_at.timestamp_millis(), asset.bytes.len());
    if is_etag_match(&req, &etag) {
        return Ok(HttpResponse::NotModified()
            .insert_header((header::ETAG, etag))
            .finish());
    }

    let mut resp = HttpResponse::Ok();
    resp.insert_header((header::CONTENT_TYPE, asset.mime))
        .insert_header((header::CACHE_CONTROL, "public, max-age=3600"))
        .insert_header((header::ETAG, etag));
    if params.wants_download() {
        resp.insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(asset.file_name)],
        });
    }
    Ok(resp.body(asset.bytes))
}

#[inline]
fn build_weak_etag(updated_ms: i64, len: usize) -> HeaderValue {
    let value = format!("W/\"{}-{}\"", updated_ms, len);
    HeaderValue::from_str(value.as_str()).unwrap_or_else(|_| HeaderValue::from_static("W/\"0-0\""))
}

#[inline]
fn is_etag_match(req: &HttpRequest, etag: &HeaderValue) -> bool {
    req.headers()
        .get(header::IF_NONE_MATCH)
        .is_some_and(|v| v == etag)
}
