//! V1 version API routes
mod overlay;
mod widget;
mod ws;

use actix_web::web;

/// Configure all v1 routes
pub fn configure_v1_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope(overlay::ROUTER_PREFIX).configure(overlay::configure_routes))
        .service(web::scope(widget::ROUTER_PREFIX).configure(widget::configure_routes))
        .service(web::scope(ws::ROUTER_PREFIX).configure(ws::configure_routes));
}
