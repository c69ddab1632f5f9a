use super::state::AppState;
use crate::session::{ClientFrame, RelaySession, ServerMessage, SessionId};
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{future, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info_span, warn, Instrument};

/// Bridge one accepted WebSocket to a new relay session
///
/// The socket is split: a writer task drains the session's outbound queue into
/// the socket, while the read half is fed to the session as `ClientFrame`s. When
/// the session finishes, the writer gets a bounded grace period to flush before
/// it is aborted.
pub async fn serve_client(socket: WebSocket, state: AppState) {
    let id = SessionId::new();
    let (sink, stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel(state.relay.outbound_buffer.max(1));

    let session = match RelaySession::register(
        id.clone(),
        state.registry.clone(),
        state.upstream.clone(),
        state.relay.clone(),
        outbound_tx,
    )
    .await
    {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to register session {}: {:#}", id, e);
            return;
        }
    };

    let mut writer = tokio::spawn(
        write_client(sink, outbound_rx).instrument(info_span!("client_writer", session_id = %id)),
    );

    let inbound = Box::pin(stream.filter_map(|result| future::ready(client_frame(result))));
    let stats = session.run(inbound).await;

    let grace = state.relay.close_timeout();
    if timeout(grace, &mut writer).await.is_err() {
        warn!(session_id = %id, "Client writer did not flush within {:?}, aborting", grace);
        writer.abort();
    }

    debug!(session_id = %id, state = %stats.state, "Client connection released");
}

fn client_frame(result: Result<Message, axum::Error>) -> Option<ClientFrame> {
    match result {
        Ok(Message::Text(text)) => Some(ClientFrame::Text(text)),
        Ok(Message::Binary(data)) => Some(ClientFrame::Binary(data)),
        Ok(Message::Close(_)) => Some(ClientFrame::Close),
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
        Err(e) => Some(ClientFrame::Error(e.to_string())),
    }
}

async fn write_client(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<ServerMessage>,
) {
    while let Some(message) = outbound.recv().await {
        let payload = match serde_json::to_string(&message) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize client message: {}", e);
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(payload)).await {
            debug!("Client socket closed while sending: {}", e);
            return;
        }
    }

    if let Err(e) = sink.close().await {
        debug!("Error closing client socket: {}", e);
    }
}
