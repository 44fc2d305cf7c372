//! Long-lived relay connection with reconnect.
//!
//! The driver task owns the socket. On every successful connect it announces
//! the user with `addUser`, replays the [`Outbox`] in order, and only then
//! reports [`ConnectionStatus::Connected`]. A lost connection is retried after
//! `reconnect_delay`, doubling up to `max_reconnect_delay`; the delay resets
//! once a connection succeeds.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use parley_relay::{ClientEvent, ServerEvent};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio_tungstenite::{
    connect_async, tungstenite, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::outbox::Outbox;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    /// Capacity of the inbound event channel handed to the application.
    pub event_buffer: usize,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_delay: MAX_RECONNECT_DELAY,
            event_buffer: 256,
        }
    }
}

/// What [`RelayHandle::emit`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emitted {
    /// Handed to the live connection.
    Sent,
    /// Held in the outbox until the next connection.
    Queued,
}

/// Application side of a running [`RelayDriver`].
#[derive(Debug, Clone)]
pub struct RelayHandle {
    commands: mpsc::UnboundedSender<ClientEvent>,
    status: watch::Receiver<ConnectionStatus>,
    outbox: Arc<Mutex<Outbox>>,
    shutdown: Arc<Notify>,
}

impl RelayHandle {
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub async fn wait_until_connected(&self) -> ClientResult<()> {
        let mut status = self.status.clone();
        status
            .wait_for(|status| *status == ConnectionStatus::Connected)
            .await
            .map(|_| ())
            .map_err(|_| ClientError::NotConnected)
    }

    /// Send on the live connection, or queue for the next one.
    pub async fn emit(&self, event: ClientEvent) -> Emitted {
        // The driver flips the status while holding the outbox, so checking
        // under the same lock cannot strand an event in either place.
        let mut outbox = self.outbox.lock().await;
        if self.status() == ConnectionStatus::Connected {
            match self.commands.send(event) {
                Ok(()) => return Emitted::Sent,
                Err(mpsc::error::SendError(event)) => {
                    outbox.push(event);
                    return Emitted::Queued;
                }
            }
        }
        outbox.push(event);
        Emitted::Queued
    }

    /// Send only if connected. For events that are useless once stale, like typing.
    pub fn emit_if_connected(&self, event: ClientEvent) -> ClientResult<()> {
        if self.status() != ConnectionStatus::Connected {
            return Err(ClientError::NotConnected);
        }
        self.commands
            .send(event)
            .map_err(|_| ClientError::NotConnected)
    }

    pub async fn queued(&self) -> usize {
        self.outbox.lock().await.len()
    }

    /// Close the connection and stop reconnecting.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

enum SessionEnd {
    Lost,
    Shutdown,
}

pub struct RelayDriver {
    url: String,
    user_id: String,
    options: DriverOptions,
    commands: mpsc::UnboundedReceiver<ClientEvent>,
    status: watch::Sender<ConnectionStatus>,
    outbox: Arc<Mutex<Outbox>>,
    events: mpsc::Sender<ServerEvent>,
    shutdown: Arc<Notify>,
}

impl RelayDriver {
    /// Start the driver task for `user_id` against the relay at `url`.
    pub fn spawn(
        url: impl Into<String>,
        user_id: impl Into<String>,
        options: DriverOptions,
    ) -> (RelayHandle, mpsc::Receiver<ServerEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let (event_tx, event_rx) = mpsc::channel(options.event_buffer.max(1));
        let outbox = Arc::new(Mutex::new(Outbox::new()));
        let shutdown = Arc::new(Notify::new());

        let driver = RelayDriver {
            url: url.into(),
            user_id: user_id.into(),
            options,
            commands: command_rx,
            status: status_tx,
            outbox: Arc::clone(&outbox),
            events: event_tx,
            shutdown: Arc::clone(&shutdown),
        };
        tokio::spawn(driver.run());

        let handle = RelayHandle {
            commands: command_tx,
            status: status_rx,
            outbox,
            shutdown,
        };
        (handle, event_rx)
    }

    async fn run(mut self) {
        let mut delay = self.options.reconnect_delay;

        loop {
            self.status.send_replace(ConnectionStatus::Connecting);

            let attempt = tokio::select! {
                attempt = connect_async(self.url.as_str()) => attempt,
                _ = self.shutdown.notified() => break,
            };

            match attempt {
                Ok((socket, _response)) => {
                    delay = self.options.reconnect_delay;
                    info!(user_id = %self.user_id, "relay connected");
                    match self.session(socket).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Lost => {
                            info!(retry_in = ?delay, "relay connection lost, reconnecting")
                        }
                    }
                }
                Err(err) => warn!(error = %err, retry_in = ?delay, "relay connection failed"),
            }

            self.go_offline().await;

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.notified() => break,
            }
            delay = (delay * 2).min(self.options.max_reconnect_delay);
        }

        self.go_offline().await;
        debug!(user_id = %self.user_id, "relay driver stopped");
    }

    async fn session(&mut self, socket: Socket) -> SessionEnd {
        let (mut sink, mut stream) = socket.split();

        if let Some(frame) = encode(&ClientEvent::Identify(self.user_id.clone())) {
            if let Err(err) = sink.send(Message::Text(frame)).await {
                warn!(error = %err, "failed to announce identity");
                return SessionEnd::Lost;
            }
        }

        {
            let mut outbox = self.outbox.lock().await;
            let queued = outbox.len();
            while let Some(event) = outbox.pop() {
                if let Err(err) = send_event(&mut sink, &event).await {
                    warn!(error = %err, "failed to replay queued event");
                    outbox.requeue(event);
                    return SessionEnd::Lost;
                }
            }
            if queued > 0 {
                info!(queued, "replayed queued relay events");
            }
            self.status.send_replace(ConnectionStatus::Connected);
        }

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(event) = command else {
                        let _ = sink.close().await;
                        return SessionEnd::Shutdown;
                    };
                    if let Err(err) = send_event(&mut sink, &event).await {
                        warn!(error = %err, "relay write failed");
                        self.outbox.lock().await.requeue(event);
                        return SessionEnd::Lost;
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => match ServerEvent::decode(&text) {
                        Ok(event) => {
                            if self.events.send(event).await.is_err() {
                                debug!("relay event receiver dropped");
                            }
                        }
                        Err(err) => warn!(error = %err, "ignoring undecodable relay frame"),
                    },
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Lost,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "relay read failed");
                        return SessionEnd::Lost;
                    }
                },
                _ = self.shutdown.notified() => {
                    let _ = sink.close().await;
                    return SessionEnd::Shutdown;
                }
            }
        }
    }

    /// Mark the connection down and move anything still in flight to the outbox.
    async fn go_offline(&mut self) {
        let mut outbox = self.outbox.lock().await;
        self.status.send_replace(ConnectionStatus::Disconnected);
        while let Ok(event) = self.commands.try_recv() {
            outbox.push(event);
        }
    }
}

fn encode(event: &ClientEvent) -> Option<String> {
    match event.encode() {
        Ok(frame) => Some(frame),
        Err(err) => {
            warn!(event = event.name(), error = %err, "dropping unencodable event");
            None
        }
    }
}

async fn send_event<S>(sink: &mut S, event: &ClientEvent) -> Result<(), tungstenite::Error>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    match encode(event) {
        Some(frame) => sink.send(Message::Text(frame)).await,
        None => Ok(()),
    }
}
