//! Overlay service application context
//!
//! Owns process-wide components (settings, logger, database, overlay store,
//! web server) and coordinates startup and graceful shutdown.
mod logger;

pub use overlay_error::{OVError, OVResult};

use logger::Logger;
use overlay_error::init::InitContextError;
use overlay_models::{
    constants::{DATA_DIR, LOG_DIR},
    settings::Settings,
    DbManager, OverlayStore, WebServer,
};
use overlay_repository::{OVChangeHub, OverlayRepository, SingleActiveHook};
use once_cell::sync::OnceCell;
use std::{
    future::Future,
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
#[cfg(windows)]
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{info, instrument, span, Level};

static APP_CONTEXT: OnceCell<RwLock<OVAppContext>> = OnceCell::new();

pub struct OVAppContext {
    /// Global settings
    settings: Settings,
    /// Global logger
    logger: Logger,
    /// Database manager
    db_manager: Option<Arc<dyn DbManager>>,
    /// Overlay store shared by the API and every live session
    store: Option<Arc<dyn OverlayStore>>,
    /// Web server
    web_server: Option<Arc<dyn WebServer>>,
    /// Flag to prevent duplicate shutdowns
    shutting_down: AtomicBool,
    /// Shutdown token
    shutdown_token: CancellationToken,
}

impl OVAppContext {
    #[inline]
    pub async fn instance() -> OVResult<RwLockReadGuard<'static, OVAppContext>> {
        Ok(Self::cell()?.read().await)
    }

    #[inline]
    pub async fn instance_mut() -> OVResult<RwLockWriteGuard<'static, OVAppContext>> {
        Ok(Self::cell()?.write().await)
    }

    fn cell() -> OVResult<&'static RwLock<OVAppContext>> {
        APP_CONTEXT
            .get()
            .ok_or_else(|| InitContextError::NotInitialized("OVAppContext".into()).into())
    }

    /// Initializes the global application context.
    ///
    /// Loads settings, applies the runtime directory, starts logging, then
    /// brings up the database, the overlay store and the web server in
    /// that order. Can only succeed once per process.
    ///
    /// # Arguments
    /// * `config` - Path of the TOML configuration file; a missing file means defaults.
    pub async fn init<D, W>(config: String) -> OVResult<()>
    where
        D: DbManager,
        W: WebServer,
    {
        // Settings come first so the runtime directory applies before anything
        // touches relative paths (logs, data).
        let settings = Settings::new(config)?;
        let mut logger = Logger::from_setting(settings.general.log_level.as_deref())?;
        apply_runtime_dir(&settings.general.runtime_dir)?;
        logger.initialize(LOG_DIR)?;

        let span = span!(Level::INFO, "init-app");
        let _guard = span.enter();
        info!(level = %logger.level(), "Logger initialized");

        ensure_runtime_directories()?;

        let mut ctx = OVAppContext {
            settings,
            logger,
            db_manager: None,
            store: None,
            web_server: None,
            shutting_down: AtomicBool::new(false),
            shutdown_token: CancellationToken::new(),
        };

        ctx.init_db_manager::<D>().await?;
        ctx.init_store()?;
        ctx.init_web_server::<W>().await?;

        APP_CONTEXT
            .set(RwLock::new(ctx))
            .map_err(|_| OVError::from("Failed to set OVAppContext"))?;
        Ok(())
    }

    async fn init_db_manager<D: DbManager>(&mut self) -> OVResult<()> {
        self.db_manager = Some(D::init(&self.settings).await?);
        info!("Database initialized successfully.");
        Ok(())
    }

    fn init_store(&mut self) -> OVResult<()> {
        let connection = self.db_manager()?.get_connection()?;
        let hub = Arc::new(OVChangeHub::new(self.settings.overlay.hub_capacity));
        let repository =
            OverlayRepository::new(connection, hub).with_hook(Arc::new(SingleActiveHook));
        self.store = Some(Arc::new(repository));
        info!("Overlay store initialized successfully.");
        Ok(())
    }

    async fn init_web_server<W: WebServer>(&mut self) -> OVResult<()> {
        self.web_server = Some(W::init(&self.settings, self.store()?).await?);
        info!("Web server initialized successfully.");
        Ok(())
    }

    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[inline]
    pub fn db_manager(&self) -> OVResult<Arc<dyn DbManager>> {
        self.db_manager
            .as_ref()
            .ok_or(OVError::from("Database manager not initialized"))
            .map(Arc::clone)
    }

    #[inline]
    pub fn store(&self) -> OVResult<Arc<dyn OverlayStore>> {
        self.store
            .as_ref()
            .ok_or(OVError::from("Overlay store not initialized"))
            .map(Arc::clone)
    }

    #[inline]
    pub fn web_server(&self) -> OVResult<Arc<dyn WebServer>> {
        self.web_server
            .as_ref()
            .ok_or(OVError::from("Web server not initialized"))
            .map(Arc::clone)
    }

    /// Token that ends [`OVAppContext::run`] without a signal.
    #[inline]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Waits for a shutdown signal, then shuts everything down.
    pub async fn run(&self) -> OVResult<()> {
        self.listen_for_shutdown(async { self.graceful_shutdown().await })
            .await
    }

    async fn listen_for_shutdown<F>(&self, shutdown_fn: F) -> OVResult<()>
    where
        F: Future<Output = OVResult<()>>,
    {
        let shutdown_token = self.shutdown_token.clone();

        #[cfg(unix)]
        {
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;
            let mut sighup = signal(SignalKind::hangup())?;
            let mut sigquit = signal(SignalKind::quit())?;

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT signal");
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP signal");
                }
                _ = sigquit.recv() => {
                    info!("Received SIGQUIT signal");
                }
                _ = shutdown_token.cancelled() => {}
            }
        }

        #[cfg(windows)]
        {
            tokio::select! {
                _ = ctrl_c() => {
                    info!("Received ctrl-c signal");
                }
                _ = shutdown_token.cancelled() => {}
            }
        }

        shutdown_fn.await
    }

    /// Stops the web server and closes the database. Runs at most once.
    #[instrument(name = "graceful-shutdown", skip_all)]
    pub async fn graceful_shutdown(&self) -> OVResult<()> {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("🛑 Starting graceful shutdown...");

        let tracker = TaskTracker::new();
        if let Some(web_server) = &self.web_server {
            let web_server = Arc::clone(web_server);
            tracker.spawn(async move {
                let _ = web_server.stop().await;
            });
        }
        if let Some(db_manager) = &self.db_manager {
            let db_manager = Arc::clone(db_manager);
            tracker.spawn(async move {
                let _ = db_manager.close().await;
            });
        }

        info!("⏳ Waiting for all components to shutdown gracefully...");
        tracker.close();
        tracker.wait().await;

        info!("✅ Graceful shutdown completed successfully");
        Ok(())
    }
}

/// Switch the process working directory to the configured runtime root.
///
/// Data and log paths are relative, so relocating the whole runtime tree
/// only needs this one setting.
fn apply_runtime_dir(runtime_dir: &str) -> OVResult<()> {
    let dir = runtime_dir.trim();
    if dir.is_empty() || dir == "." {
        return Ok(());
    }

    std::fs::create_dir_all(dir)
        .map_err(|e| OVError::from(format!("Failed to create runtime_dir {}: {}", dir, e)))?;

    std::env::set_current_dir(dir).map_err(|e| {
        OVError::from(format!(
            "Failed to set current_dir to runtime_dir {}: {}",
            dir, e
        ))
    })?;

    Ok(())
}

/// Create the data and log directories under the runtime root.
fn ensure_runtime_directories() -> OVResult<()> {
    for dir in [Path::new(DATA_DIR), Path::new(LOG_DIR)] {
        std::fs::create_dir_all(dir).map_err(|e| {
            OVError::from(format!("Failed to create directory {}: {}", dir.display(), e))
        })?;
    }
    Ok(())
}
