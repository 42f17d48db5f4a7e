//! Browser pages.
//!
//! Both pages are thin shells: the server renders the panel and the overlay
//! and pushes the HTML over a websocket.
//!
//! # Routes
//! - GET `/` admin page
//! - GET `/overlay` viewer page (browser source)
//! - GET `/overlay/fragment` current viewer HTML

use crate::AppState;
use actix_web::{http::header, web, HttpResponse};
use overlay_error::WebResult;
use overlay_models::constants::LOADING_MESSAGE;
use overlay_view::{
    sync::LiveProjection,
    templates::{TemplateError, Templates},
    viewer::Viewer,
};
use serde::Serialize;
use std::sync::Arc;

const ADMIN_PAGE: &str = "page_admin";
const VIEWER_PAGE: &str = "page_viewer";

/// Add the page shells to the fragment templates.
pub fn register_page_templates(templates: &mut Templates) -> Result<(), TemplateError> {
    templates.register(ADMIN_PAGE, include_str!("../../../templates/admin.hbs"))?;
    templates.register(VIEWER_PAGE, include_str!("../../../templates/viewer.hbs"))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AdminPageView<'a> {
    router_prefix: &'a str,
    widgets: Vec<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ViewerPageView<'a> {
    router_prefix: &'a str,
    loading: &'a str,
}

/// Configure page routes.
pub fn configure_page_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(admin_page))
        .route("/overlay", web::get().to(viewer_page))
        .route("/overlay/fragment", web::get().to(viewer_fragment));
}

fn html(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/html; charset=utf-8"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .body(body)
}

async fn admin_page(state: web::Data<Arc<AppState>>) -> HttpResponse {
    let view = AdminPageView {
        router_prefix: &state.router_prefix,
        widgets: state.registry.names(),
    };
    html(state.templates.render(ADMIN_PAGE, &view))
}

async fn viewer_page(state: web::Data<Arc<AppState>>) -> HttpResponse {
    let view = ViewerPageView {
        router_prefix: &state.router_prefix,
        loading: LOADING_MESSAGE,
    };
    html(state.templates.render(VIEWER_PAGE, &view))
}

/// One-shot resolution for clients without a websocket.
async fn viewer_fragment(state: web::Data<Arc<AppState>>) -> WebResult<HttpResponse> {
    let mut viewer = Viewer::new(Arc::clone(&state.registry), Arc::clone(&state.templates));
    let snapshot = Viewer::fetch(state.store.as_ref()).await?;
    viewer.replace(snapshot);
    Ok(html(viewer.render()))
}
