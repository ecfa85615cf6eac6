//! WebSocket transport
//!
//! Responsibilities:
//! - Accept TCP connections and perform the WebSocket handshake
//! - Route `/ws/{topic}` requests to a [`Connection`] on that topic
//! - Cap the number of concurrent connections
//! - Bound the handshake by a timeout so silent peers cannot hold a slot
//! - Stop accepting and drain open connections on shutdown
//!
//! Payloads travel as text frames when they are valid UTF-8 and as binary
//! frames otherwise; inbound text and binary frames are both forwarded.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::accept_hdr_async;
use tracing::{Instrument, debug, info, info_span, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;
use tungstenite::Utf8Bytes;
use tungstenite::protocol::Message as WsMessage;

use crate::config::Settings;
use crate::hub::Hub;
use crate::transport::connection::shutdown_requested;
use crate::transport::{Connection, MessageSink, MessageSource};
use crate::utils::error::{Error, TransportError};

/// Path prefix of the subscription endpoint.
pub const WS_PATH_PREFIX: &str = "/ws/";

/// Longest topic accepted in a request path.
pub const MAX_TOPIC_LEN: usize = 128;

/// Binds `addr` and serves until `shutdown` flips to `true`.
pub async fn start_websocket_server(
    addr: &str,
    hub: Arc<dyn Hub>,
    settings: Settings,
    shutdown: watch::Receiver<bool>,
) -> Result<(), Error> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, hub, settings, shutdown).await
}

/// Accepts connections on `listener` until `shutdown` flips to `true`, then
/// waits for the open connections to finish.
pub async fn serve(
    listener: TcpListener,
    hub: Arc<dyn Hub>,
    settings: Settings,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Error> {
    let local_addr = listener.local_addr()?;
    info!("WebSocket server listening on ws://{local_addr}{WS_PATH_PREFIX}{{topic}}");

    let permits = Arc::new(Semaphore::new(settings.server.max_connections));
    let mailbox_capacity = settings.hub.mailbox_capacity;
    let handshake_timeout = settings.server.handshake_timeout();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "cannot accept connection");
                        continue;
                    }
                };
                let Ok(permit) = permits.clone().try_acquire_owned() else {
                    warn!(%peer, "connection limit reached, dropping connection");
                    continue;
                };
                let hub = hub.clone();
                let shutdown = shutdown.clone();
                connections.spawn(async move {
                    handle_connection(stream, peer, hub, mailbox_capacity, handshake_timeout, shutdown)
                        .await;
                    drop(permit);
                });
            }
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    warn!(error = %e, "connection task failed");
                }
            }
            _ = shutdown_requested(&mut shutdown) => break,
        }
    }

    info!(open = connections.len(), "shutting down, draining connections");
    while let Some(joined) = connections.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "connection task failed");
        }
    }
    info!("WebSocket server stopped");
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    hub: Arc<dyn Hub>,
    mailbox_capacity: usize,
    handshake_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut topic = None;
    let handshake = accept_hdr_async(stream, |req: &Request, resp: Response| {
        match topic_from_path(req.uri().path()) {
            Some(t) => {
                topic = Some(t.to_string());
                Ok(resp)
            }
            None => Err(reject(StatusCode::BAD_REQUEST, "invalid board id")),
        }
    });
    let ws_stream = tokio::select! {
        result = timeout(handshake_timeout, handshake) => match result {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                warn!(%peer, error = %e, "WebSocket handshake error");
                return;
            }
            Err(_) => {
                warn!(%peer, timeout = ?handshake_timeout, "WebSocket handshake timed out");
                return;
            }
        },
        _ = shutdown_requested(&mut shutdown) => {
            debug!(%peer, "shutdown during handshake");
            return;
        }
    };
    let Some(topic) = topic else {
        return;
    };

    let (ws_sender, ws_receiver) = ws_stream.split();
    let mut connection = Connection::new(hub, topic).with_mailbox_capacity(mailbox_capacity);
    let span = info_span!("connection", id = %connection.id(), %peer, topic = %connection.topic());
    let reason = connection
        .run(ws_receiver, ws_sender, shutdown)
        .instrument(span)
        .await;
    debug!(%peer, ?reason, "disconnected");
}

/// Extracts the topic from a `/ws/{topic}` request path.
pub fn topic_from_path(path: &str) -> Option<&str> {
    let topic = path.strip_prefix(WS_PATH_PREFIX)?;
    let valid = !topic.is_empty()
        && topic.len() <= MAX_TOPIC_LEN
        && topic
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some(topic)
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

/// Converts an outbound payload into a frame without copying it.
pub(crate) fn to_frame(payload: Bytes) -> WsMessage {
    match Utf8Bytes::try_from(payload.clone()) {
        Ok(text) => WsMessage::Text(text),
        Err(_) => WsMessage::Binary(payload),
    }
}

impl<S> MessageSource for SplitStream<WebSocketStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn receive(&mut self) -> Result<Option<Bytes>, TransportError> {
        while let Some(msg) = self.next().await {
            match msg? {
                msg @ (WsMessage::Text(_) | WsMessage::Binary(_)) => {
                    return Ok(Some(msg.into_data()));
                }
                WsMessage::Close(_) => return Ok(None),
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
            }
        }
        Ok(None)
    }
}

impl<S> MessageSink for SplitSink<WebSocketStream<S>, WsMessage>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, payload: Bytes) -> Result<(), TransportError> {
        SinkExt::send(self, to_frame(payload)).await?;
        Ok(())
    }
}
