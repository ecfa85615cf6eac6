use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tungstenite::protocol::Message as WsMessage;

use crate::transport::websocket::to_frame;
use crate::utils::error::TransportError;

/// A client subscribed to one board, e.g. `ws://127.0.0.1:8080/ws/b1`.
pub struct BoardClient {
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl BoardClient {
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (ws_stream, _response) = connect_async(url).await?;
        Ok(Self { ws_stream })
    }

    /// Broadcasts `payload` to the other subscribers of the board.
    pub async fn publish(&mut self, payload: impl Into<Bytes>) -> Result<(), TransportError> {
        self.ws_stream.send(to_frame(payload.into())).await?;
        Ok(())
    }

    /// Waits for the next payload. `Ok(None)` once the server closed the
    /// connection.
    pub async fn next_message(&mut self) -> Result<Option<Bytes>, TransportError> {
        while let Some(msg) = self.ws_stream.next().await {
            match msg? {
                msg @ (WsMessage::Text(_) | WsMessage::Binary(_)) => {
                    return Ok(Some(msg.into_data()));
                }
                WsMessage::Close(_) => return Ok(None),
                _ => {}
            }
        }
        Ok(None)
    }

    pub async fn close(mut self) -> Result<(), TransportError> {
        self.ws_stream.close(None).await?;
        Ok(())
    }
}
