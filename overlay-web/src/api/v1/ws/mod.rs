//! WebSocket endpoints.
//!
//! Every connection owns its tasks through a cancellation token that is
//! cancelled when the socket closes.

mod admin;
mod realtime;
mod viewer;

use actix_web::web;

pub(super) const ROUTER_PREFIX: &str = "/ws";

/// Configure all WebSocket routes under `{router_prefix}/ws`.
pub(crate) fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/realtime", web::get().to(realtime::realtime_ws))
        .route("/viewer", web::get().to(viewer::viewer_ws))
        .route("/admin", web::get().to(admin::admin_ws));
}
