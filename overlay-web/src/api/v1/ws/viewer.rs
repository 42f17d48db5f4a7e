//! Live viewer channel.
//!
//! Path: `GET {router_prefix}/ws/viewer`
//!
//! The server keeps a [`Viewer`] in sync with the store and pushes
//! `{"type":"render","html":...}` after every refresh. Clients only need
//! to swap the HTML in.

use crate::AppState;
use actix_web::{web, Error as ActixError, HttpRequest, HttpResponse};
use actix_ws::{Message as WsMessage, Session};
use futures::StreamExt;
use overlay_view::{sync::run_live, viewer::Viewer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ViewerClientMessage {
    Ping { ts: i64 },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ViewerServerMessage {
    Render { html: String },
    Pong { ts: i64 },
}

impl ViewerServerMessage {
    fn encode(&self) -> Option<String> {
        serde_json::to_string(self)
            .map_err(|e| error!("Failed to serialize viewer message: {}", e))
            .ok()
    }
}

/// Handle WebSocket upgrades for `/ws/viewer`.
#[instrument(skip_all)]
pub async fn viewer_ws(
    req: HttpRequest,
    body: web::Payload,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse, ActixError> {
    let (res, session, msg_stream) = actix_ws::handle(&req, body)?;
    let state: Arc<AppState> = state.get_ref().clone();

    actix_rt::spawn(async move {
        viewer_ws_loop(state, session, msg_stream).await;
    });

    Ok(res)
}

async fn viewer_ws_loop(
    state: Arc<AppState>,
    mut session: Session,
    mut msg_stream: actix_ws::MessageStream,
) {
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Writer: serializes renders onto the socket.
    let mut writer_session = session.clone();
    let writer_cancel = cancel.clone();
    actix_rt::spawn(async move {
        while let Some(text) = rx.recv().await {
            if writer_session.text(text).await.is_err() {
                debug!("Viewer WS send error, stopping writer");
                writer_cancel.cancel();
                break;
            }
        }
    });

    let viewer = Arc::new(Mutex::new(Viewer::new(
        Arc::clone(&state.registry),
        Arc::clone(&state.templates),
    )));
    let render_tx = tx.clone();
    tokio::spawn(run_live(
        Arc::clone(&state.store),
        viewer,
        cancel.child_token(),
        move |viewer: &Viewer| {
            let msg = ViewerServerMessage::Render {
                html: viewer.render(),
            };
            if let Some(text) = msg.encode() {
                let _ = render_tx.send(text);
            }
        },
    ));

    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => break,
            item = msg_stream.next() => item,
        };
        let Some(item) = item else { break };
        match item {
            Ok(WsMessage::Text(text)) => {
                if let Ok(ViewerClientMessage::Ping { ts }) = serde_json::from_str(&text) {
                    if let Some(text) = (ViewerServerMessage::Pong { ts }).encode() {
                        let _ = tx.send(text);
                    }
                }
            }
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
                error!("Viewer WS stream error: {}", e);
                break;
            }
        }
    }

    cancel.cancel();
    debug!("Viewer WS connection closed");
}
