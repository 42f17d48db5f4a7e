//! Admin panel channel.
//!
//! Path: `GET {router_prefix}/ws/admin`
//!
//! Each connection owns an [`AdminSession`]. Text frames are decoded as
//! [`AdminCommand`]s; every [`AdminEvent`] the session produces is written
//! back as JSON.

use crate::AppState;
use actix_web::{web, Error as ActixError, HttpRequest, HttpResponse};
use actix_ws::{Message as WsMessage, Session};
use futures::StreamExt;
use overlay_view::admin::{AdminCommand, AdminEvent, AdminSession};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

/// Sent when a frame cannot be decoded as a command.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename = "error")]
struct CommandError<'a> {
    code: &'a str,
    message: String,
}

/// Handle WebSocket upgrades for `/ws/admin`.
#[instrument(skip_all)]
pub async fn admin_ws(
    req: HttpRequest,
    body: web::Payload,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse, ActixError> {
    let (res, session, msg_stream) = actix_ws::handle(&req, body)?;
    let state: Arc<AppState> = state.get_ref().clone();

    actix_rt::spawn(async move {
        admin_ws_loop(state, session, msg_stream).await;
    });

    Ok(res)
}

async fn admin_ws_loop(
    state: Arc<AppState>,
    mut session: Session,
    mut msg_stream: actix_ws::MessageStream,
) {
    let cancel = CancellationToken::new();
    let (mut admin, events) = AdminSession::start(
        Arc::clone(&state.store),
        Arc::clone(&state.templates),
        state.param_debounce,
        &cancel,
    );

    actix_rt::spawn(forward_events(events, session.clone(), cancel.clone()));

    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => break,
            item = msg_stream.next() => item,
        };
        let Some(item) = item else { break };
        match item {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<AdminCommand>(&text) {
                Ok(command) => admin.handle(command).await,
                Err(e) => {
                    warn!(error = %e, "Invalid admin command");
                    let reply = CommandError {
                        code: "bad_request",
                        message: e.to_string(),
                    };
                    match serde_json::to_string(&reply) {
                        Ok(text) => {
                            if session.text(text).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => error!("Failed to serialize admin error: {}", e),
                    }
                }
            },
            Ok(WsMessage::Ping(bytes)) => {
                if session.pong(&bytes).await.is_err() {
                    break;
                }
            }
            Ok(WsMessage::Close(reason)) => {
                let _ = session.clone().close(reason).await;
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("Admin WS stream error: {}", e);
                break;
            }
        }
    }

    cancel.cancel();
    drop(admin);
    debug!("Admin WS connection closed");
}

/// Write session events to the socket until the session goes away.
async fn forward_events(
    mut events: mpsc::UnboundedReceiver<AdminEvent>,
    mut session: Session,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        let Some(event) = event else { break };
        let text = match serde_json::to_string(&event) {
            Ok(t) => t,
            Err(e) => {
                error!("Failed to serialize admin event: {}", e);
                continue;
            }
        };
        if session.text(text).await.is_err() {
            debug!("Admin WS send error, stopping writer");
            cancel.cancel();
            break;
        }
    }
}
