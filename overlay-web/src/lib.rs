//! Web server module for the overlay service
mod api;
mod middleware;

use actix_web::{
    dev::{Server, ServerHandle},
    middleware::{Compress, Logger, NormalizePath},
    web::{self, Data, ServiceConfig},
    App, HttpServer,
};
use async_trait::async_trait;
use middleware::cors::middleware;
use overlay_error::{init::InitContextError, OVError, OVResult};
use overlay_models::{settings::Settings, OverlayStore, WebServer};
use overlay_view::{templates::Templates, widgets::WidgetRegistry};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{error, info, instrument};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn OverlayStore>,
    registry: Arc<WidgetRegistry>,
    /// Page shells plus every fragment template, registered once.
    templates: Arc<Templates>,
    router_prefix: String,
    max_upload_bytes: usize,
    param_debounce: Duration,
}

impl AppState {
    pub fn new(settings: &Settings, store: Arc<dyn OverlayStore>) -> OVResult<Self> {
        let mut templates = Templates::builtin()
            .map_err(|e| OVError::from(format!("Failed to register templates: {e}")))?;
        api::public::register_page_templates(&mut templates)
            .map_err(|e| OVError::from(format!("Failed to register page templates: {e}")))?;
        Ok(Self {
            store,
            registry: Arc::new(WidgetRegistry::builtin()),
            templates: Arc::new(templates),
            router_prefix: settings.web.router_prefix.clone(),
            max_upload_bytes: settings.web.max_upload_bytes,
            param_debounce: settings.overlay.param_debounce(),
        })
    }
}

/// Register every route of the service against `state`.
fn configure_app(state: Arc<AppState>) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let router_prefix = state.router_prefix.clone();
        cfg.app_data(Data::new(state))
            // Public root routes (not under the router prefix).
            .configure(api::configure_public_routes)
            .service(web::scope(&router_prefix).configure(api::configure_routes));
    }
}

/// OVWebServer handles the web server initialization and management
#[derive(Clone)]
pub struct OVWebServer {
    /// Server handle for graceful shutdown
    server: Arc<Mutex<Option<ServerHandle>>>,
}

impl OVWebServer {
    /// Create and configure the HTTP server
    fn create_server(settings: &Settings, store: Arc<dyn OverlayStore>) -> OVResult<Server> {
        let addr = format!("{}:{}", settings.web.host, settings.web.port);
        let worker_count = settings.web.get_worker_count();
        let cors_config = settings.web.cors.clone();
        let state = Arc::new(AppState::new(settings, store)?);

        let server = HttpServer::new(move || {
            App::new()
                .wrap(middleware(&cors_config))
                .wrap(Logger::default())
                .wrap(Compress::default())
                .wrap(NormalizePath::trim())
                .configure(configure_app(Arc::clone(&state)))
        })
        .workers(worker_count)
        .bind(&addr)
        .map_err(|e| OVError::from(format!("Failed to bind HTTP server to {addr}: {e}")))?;

        info!(%addr, workers = worker_count, "HTTP server bound");
        Ok(server.run())
    }
}

#[async_trait]
impl WebServer for OVWebServer {
    #[inline]
    #[instrument(name = "init-web-server", skip_all)]
    /// Initialize and start the web server
    async fn init(
        settings: &Settings,
        store: Arc<dyn OverlayStore>,
    ) -> OVResult<Arc<Self>, InitContextError> {
        let server = Self::create_server(settings, store).map_err(|e| {
            InitContextError::Primitive(format!("Failed to create web server: {e}"))
        })?;
        let server_handle = server.handle();

        tokio::spawn(async move {
            if let Err(e) = server.await {
                error!(error=%e, "Web server failed to start");
            }
        });

        Ok(Arc::new(OVWebServer {
            server: Arc::new(Mutex::new(Some(server_handle))),
        }))
    }

    #[inline]
    #[instrument(name = "web-server-stop", skip_all)]
    /// Gracefully stop the web server
    async fn stop(&self) -> OVResult<()> {
        info!("🛑 Stopping web server...");
        let mut server_guard = self.server.lock().await;
        if let Some(handle) = server_guard.take() {
            handle.stop(true).await;
        }
        info!("✅ Web server stopped successfully");

        Ok(())
    }
}
