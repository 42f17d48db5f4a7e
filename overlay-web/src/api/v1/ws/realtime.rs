//! Raw overlay change feed.
//!
//! Path: `GET {router_prefix}/ws/realtime`
//!
//! A client subscribes to `*` or a single record id and receives every
//! committed change on that topic. Sending `subscribe` again replaces the
//! current subscription.

use crate::AppState;
use actix_web::{web, Error as ActixError, HttpRequest, HttpResponse};
use actix_ws::{Message as WsMessage, Session};
use futures::StreamExt;
use overlay_models::{
    domain::prelude::{OverlayRecord, SubscriptionTopic},
    enums::overlay::ChangeAction,
    OverlayStore,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

/// Incoming WebSocket messages from client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum RealtimeClientMessage {
    /// Subscribe to `*` (default) or a record id.
    Subscribe {
        #[serde(default)]
        topic: Option<String>,
    },
    /// Drop the subscription but keep the connection open.
    Unsubscribe,
    Ping { ts: i64 },
}

/// Outgoing WebSocket messages to client.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum RealtimeServerMessage<'a> {
    Subscribed { topic: SubscriptionTopic },
    Unsubscribed,
    Change {
        action: ChangeAction,
        record: &'a OverlayRecord,
    },
    Error { code: &'a str, message: String },
    Pong { ts: i64 },
}

async fn send(session: &mut Session, msg: &RealtimeServerMessage<'_>) -> bool {
    let text = match serde_json::to_string(msg) {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to serialize realtime message: {}", e);
            return true;
        }
    };
    session.text(text).await.is_ok()
}

/// Per-connection subscription: one forwarding task at a time.
struct ConnectionSubscription {
    cancel: Option<CancellationToken>,
}

impl ConnectionSubscription {
    fn new() -> Self {
        Self { cancel: None }
    }

    fn clear(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }

    fn replace_with(&mut self, topic: SubscriptionTopic, store: &dyn OverlayStore, session: Session) {
        self.clear();

        let mut subscription = store.subscribe(topic);
        let mut session = session;
        let cancel = CancellationToken::new();
        let child_token = cancel.child_token();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = child_token.cancelled() => {
                        debug!(%topic, "Realtime subscription cancelled");
                        break;
                    }
                    result = subscription.recv() => match result {
                        Ok(change) => {
                            let msg = RealtimeServerMessage::Change {
                                action: change.action,
                                record: &change.record,
                            };
                            if !send(&mut session, &msg).await {
                                debug!("Realtime WS send error, stopping subscription task");
                                break;
                            }
                        }
                        Err(RecvError::Lagged(n)) => {
                            warn!(%topic, skipped = n, "Realtime subscription lagged");
                        }
                        Err(RecvError::Closed) => {
                            debug!(%topic, "Realtime change feed closed");
                            break;
                        }
                    }
                }
            }
        });

        self.cancel = Some(cancel);
    }
}

/// Handle WebSocket upgrades for `/ws/realtime`.
#[instrument(skip_all)]
pub async fn realtime_ws(
    req: HttpRequest,
    body: web::Payload,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse, ActixError> {
    let (res, session, msg_stream) = actix_ws::handle(&req, body)?;
    let state: Arc<AppState> = state.get_ref().clone();

    actix_rt::spawn(async move {
        realtime_ws_loop(state, session, msg_stream).await;
    });

    Ok(res)
}

async fn realtime_ws_loop(
    state: Arc<AppState>,
    mut session: Session,
    mut msg_stream: actix_ws::MessageStream,
) {
    let mut subscription = ConnectionSubscription::new();

    while let Some(item) = msg_stream.next().await {
        let msg = match item {
            Ok(m) => m,
            Err(e) => {
                error!("Realtime WS stream error: {}", e);
                break;
            }
        };
        let alive = match msg {
            WsMessage::Text(text) => match serde_json::from_str::<RealtimeClientMessage>(&text) {
                Ok(RealtimeClientMessage::Subscribe { topic }) => {
                    match topic.as_deref().unwrap_or("*").parse::<SubscriptionTopic>() {
                        Ok(topic) => {
                            subscription.replace_with(topic, state.store.as_ref(), session.clone());
                            send(&mut session, &RealtimeServerMessage::Subscribed { topic }).await
                        }
                        Err(message) => {
                            let msg = RealtimeServerMessage::Error {
                                code: "invalid_topic",
                                message,
                            };
                            send(&mut session, &msg).await
                        }
                    }
                }
                Ok(RealtimeClientMessage::Unsubscribe) => {
                    subscription.clear();
                    send(&mut session, &RealtimeServerMessage::Unsubscribed).await
                }
                Ok(RealtimeClientMessage::Ping { ts }) => {
                    send(&mut session, &RealtimeServerMessage::Pong { ts }).await
                }
                Err(e) => {
                    let msg = RealtimeServerMessage::Error {
                        code: "bad_request",
                        message: e.to_string(),
                    };
                    send(&mut session, &msg).await
                }
            },
            WsMessage::Ping(bytes) => session.pong(&bytes).await.is_ok(),
            WsMessage::Close(reason) => {
                let _ = session.clone().close(reason).await;
                false
            }
            _ => true,
        };
        if !alive {
            break;
        }
    }

    subscription.clear();
    debug!("Realtime WS connection closed");
}
