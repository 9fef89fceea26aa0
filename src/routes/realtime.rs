use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::WatchStream;
use uuid::Uuid;

use crate::services::realtime::{subscribe, MirrorSpec, MirrorTable};
use crate::utils::config::AppState;

#[derive(Debug, Deserialize)]
pub struct MirrorQuery {
    pub user_id: Uuid,
    pub column: Option<String>,
}

// Stream a live mirror of one table over a WebSocket
pub async fn realtime_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
    Path(table): Path<String>,
    Query(query): Query<MirrorQuery>,
) -> Result<Response, StatusCode> {
    let table: MirrorTable = table.parse().map_err(|e| {
        tracing::error!("Rejected mirror request: {}", e);
        StatusCode::BAD_REQUEST
    })?;
    let spec = MirrorSpec::new(table, query.user_id, query.column.as_deref()).map_err(|e| {
        tracing::error!("Rejected mirror request: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    tracing::info!("Opening {} mirror for {}", table.as_str(), query.user_id);
    Ok(ws.on_upgrade(move |socket| stream_mirror(socket, app_state, spec)))
}

async fn stream_mirror(socket: WebSocket, app_state: AppState, spec: MirrorSpec) {
    let table = spec.table.as_str();
    let handle = subscribe(&app_state.changes, (*app_state.db).clone(), spec);
    let mut states = WatchStream::new(handle.receiver());
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            state = states.next() => {
                let Some(state) = state else { break };
                let text = match serde_json::to_string(&state) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!("❌ Failed to encode mirror state: {}", e);
                        break;
                    }
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    // Dropping the handle tears the subscription down
    drop(handle);
    tracing::info!("Closed {} mirror", table);
}

pub fn create_realtime_router() -> Router<AppState> {
    Router::new().route("/realtime/{table}", get(realtime_handler))
}
