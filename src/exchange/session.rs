use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;

use super::connector::Connector;

const RECONNECT_DELAY: Duration = Duration::from_secs(20);
const RECONNECT_JITTER_MS: u64 = 3000;

/// WebSocket session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Open,
    ClosedNormal,
    ClosedError,
}

/// Long-lived session loop for one venue
///
/// Runs as the venue's single WebSocket task for the connector's lifetime
/// and is the sole writer of the connected flag. On every open it re-sends
/// tracked subscriptions and ensures the default market-data subscription;
/// on close it sleeps a fixed interval (plus jitter) and reconnects, until
/// the connector's reconnect flag is cleared.
pub(crate) async fn run(connector: Arc<Connector>) {
    let api = connector.api();
    let venue = api.venue();
    let mut outbound = connector.lock_outbound().await;
    let mut shutdown = connector.shutdown_receiver();

    while connector.should_reconnect() {
        connector.set_session_state(SessionState::Connecting);

        match connect_async(api.ws_url()).await {
            Ok((stream, _response)) => {
                tracing::info!("{} websocket connection opened", venue);
                connector.set_connected(true);
                connector.set_session_state(SessionState::Open);

                let (mut write, mut read) = stream.split();

                // Idempotent from the session's perspective: re-sending a
                // tracked subscription is a no-op at the venue
                for frame in connector.resubscribe_frames() {
                    if let Err(e) = write.send(Message::Text(frame)).await {
                        tracing::error!("{} failed to resubscribe: {}", venue, e);
                    }
                }
                connector.ensure_default_subscriptions();

                let mut error_close = false;
                loop {
                    tokio::select! {
                        msg = read.next() => match msg {
                            Some(Ok(Message::Text(text))) => {
                                for event in api.parse_message(&text) {
                                    connector.dispatch(event).await;
                                }
                            }
                            Some(Ok(Message::Ping(payload))) => {
                                let _ = write.send(Message::Pong(payload)).await;
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::error!("{} websocket error: {}", venue, e);
                                error_close = true;
                                break;
                            }
                        },
                        frame = outbound.recv() => {
                            if let Some(frame) = frame {
                                if let Err(e) = write.send(Message::Text(frame)).await {
                                    tracing::error!("{} failed to send frame: {}", venue, e);
                                }
                            }
                        }
                        _ = shutdown.changed() => {
                            let _ = write.send(Message::Close(None)).await;
                        }
                    }
                }

                connector.set_connected(false);
                connector.set_session_state(if error_close {
                    SessionState::ClosedError
                } else {
                    SessionState::ClosedNormal
                });
                tracing::warn!("{} websocket disconnected", venue);
            }
            Err(e) => {
                tracing::error!("{} websocket connect failed: {}", venue, e);
                connector.set_session_state(SessionState::ClosedError);
            }
        }

        if !connector.should_reconnect() {
            break;
        }

        let jitter = rand::thread_rng().gen_range(0..RECONNECT_JITTER_MS);
        tokio::time::sleep(RECONNECT_DELAY + Duration::from_millis(jitter)).await;
    }

    connector.set_session_state(SessionState::Disconnected);
    tracing::info!("{} websocket task terminated", venue);
}
