use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::adapters::http::error::ApiError;
use crate::adapters::http::session;
use crate::adapters::http::state::HttpState;
use crate::domain::errors::DomainError;
use crate::domain::stream::{summarize_detections, StreamEvent, WsMessage};

/// Frames anotados del stream de la sesión: un mensaje JSON con metadatos
/// seguido del JPEG en binario.
pub async fn ws_handler(ws: WebSocketUpgrade, State(st): State<HttpState>, jar: CookieJar) -> Response {
    let rx = {
        let s = match session::authenticated(&st, &jar).await {
            Ok(s) => s,
            Err(e) => return e.into_response(),
        };
        match s.stream.as_ref() {
            Some(handle) if !handle.is_stopped() => handle.subscribe(),
            _ => return ApiError(DomainError::NotFound("no stream is running".into())).into_response(),
        }
    };
    ws.on_upgrade(move |socket| handle_socket(socket, rx))
}

async fn send_json(socket: &mut WebSocket, msg: &WsMessage) -> bool {
    let json = serde_json::to_string(msg).unwrap_or_default();
    socket.send(Message::Text(json.into())).await.is_ok()
}

async fn handle_socket(mut socket: WebSocket, mut rx: broadcast::Receiver<StreamEvent>) {
    loop {
        match rx.recv().await {
            Ok(StreamEvent::Frame { meta, jpeg }) => {
                let summary = summarize_detections(&meta.detections);
                if !send_json(&mut socket, &WsMessage::Frame { meta, summary }).await {
                    break;
                }
                if socket.send(Message::Binary(jpeg.into())).await.is_err() {
                    break;
                }
            }
            Ok(StreamEvent::Error(message)) => {
                let _ = send_json(&mut socket, &WsMessage::Error { message }).await;
                break;
            }
            Ok(StreamEvent::Finished) => {
                let _ = send_json(&mut socket, &WsMessage::Finished).await;
                break;
            }
            // Cliente lento: se saltan frames, no se corta.
            Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "ws: frames descartados"),
            // El stream se detuvo (logout, stop o reemplazo).
            Err(RecvError::Closed) => {
                let _ = send_json(&mut socket, &WsMessage::Finished).await;
                break;
            }
        }
    }
    let _ = socket.close().await;
}
