//! `/ws`: the relay transport.
//!
//! Each socket gets a writer task fed by the connection's outbound queue, and a
//! read loop that hands text frames to the [`RelayServer`]. When the read loop
//! ends for any reason the connection is deregistered.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use parley_relay::{RelayServer, ServerEvent};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use utoipa::IntoParams;

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RelayQuery {
    /// Session token from login. Required unless the relay runs without tokens.
    pub token: Option<String>,
}

#[utoipa::path(
    get,
    path = "/ws",
    tag = "relay",
    params(RelayQuery),
    responses(
        (status = 101, description = "Switching to the relay protocol"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse)
    )
)]
pub async fn relay_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<RelayQuery>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let authenticated_user = match params.token.as_deref().filter(|token| !token.is_empty()) {
        Some(token) => {
            let (user, _session) = state.authenticate(token).await?;
            Some(user.public_id)
        }
        None if state.relay_config().require_token => {
            return Err(ApiError::unauthorized("missing token"));
        }
        None => None,
    };

    let relay = Arc::clone(state.relay());
    let timing = SocketTiming {
        identify_timeout: seconds(state.relay_config().identify_timeout_seconds),
        ping_interval: seconds(state.relay_config().ping_interval_seconds),
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, relay, authenticated_user, timing)))
}

#[derive(Debug, Clone, Copy)]
struct SocketTiming {
    identify_timeout: Option<Duration>,
    ping_interval: Option<Duration>,
}

fn seconds(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

async fn handle_socket(
    socket: WebSocket,
    relay: Arc<RelayServer>,
    authenticated_user: Option<String>,
    timing: SocketTiming,
) {
    let (mut connection, outbound) = relay.connect(authenticated_user).await;
    let connection_id = connection.id();
    let (ws_sender, mut receiver) = socket.split();

    let writer = tokio::spawn(write_loop(ws_sender, outbound, timing.ping_interval));

    let identify_deadline = timing.identify_timeout.map(|timeout| Instant::now() + timeout);

    loop {
        let next = match identify_deadline {
            Some(deadline) if !connection.is_identified() => {
                tokio::select! {
                    frame = receiver.next() => frame,
                    _ = sleep_until(deadline) => {
                        info!(connection = %connection_id, "closing connection that never identified");
                        break;
                    }
                }
            }
            _ => receiver.next().await,
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                relay.handle_frame(&mut connection, &text).await;
            }
            Some(Ok(Message::Binary(_))) => {
                warn!(connection = %connection_id, "ignoring binary frame");
            }
            Some(Ok(Message::Close(_))) | None => {
                debug!(connection = %connection_id, "client closed connection");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                debug!(connection = %connection_id, error = %err, "relay socket error");
                break;
            }
        }
    }

    relay.disconnect(&mut connection).await;
    // The writer drains and exits once the last sender for this connection is gone.
    drop(connection);
    if let Err(err) = writer.await {
        warn!(connection = %connection_id, error = %err, "relay writer task failed");
    }
    info!(connection = %connection_id, "relay connection closed");
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<ServerEvent>,
    ping_interval: Option<Duration>,
) {
    let mut ticker = interval(ping_interval.unwrap_or(Duration::from_secs(3600)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            event = outbound.recv() => {
                let Some(event) = event else { break };
                let frame = match event.encode() {
                    Ok(frame) => frame,
                    Err(err) => {
                        warn!(error = %err, "failed to encode relay event");
                        continue;
                    }
                };
                if let Err(err) = sink.send(Message::Text(frame)).await {
                    debug!(error = %err, "relay socket write failed");
                    break;
                }
            }
            _ = ticker.tick(), if ping_interval.is_some() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = sink.close().await;
}
