//! Public root routes.
//!
//! The viewer page is embedded as a browser source, and asset URLs are built
//! by the store without the API prefix, so these live at the root.

mod files;
mod health;
mod pages;

pub use pages::register_page_templates;

use actix_web::web;

/// Configure all public root routes.
#[inline]
pub fn configure_public_routes(cfg: &mut web::ServiceConfig) {
    cfg.configure(health::configure_health_routes)
        .configure(pages::configure_page_routes)
        .configure(files::configure_file_routes);
}
