use crate::AppState;
use actix_web::web::{self, ServiceConfig};
use overlay_error::WebResult;
use overlay_models::web::WebResponse;
use std::sync::Arc;

pub(super) const ROUTER_PREFIX: &str = "/widgets";

/// Configure widget routes
///
/// # Routes
/// - GET ``: names of every registered widget, sorted
pub(crate) fn configure_routes(cfg: &mut ServiceConfig) {
    cfg.route("", web::get().to(list));
}

async fn list(state: web::Data<Arc<AppState>>) -> WebResult<WebResponse<Vec<String>>> {
    let names = state
        .registry
        .names()
        .into_iter()
        .map(str::to_string)
        .collect();
    Ok(WebResponse::ok(names))
}
