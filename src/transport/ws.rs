//! WebSocket transport
//!
//! `Transport` implementation over tokio-tungstenite. The handshake and all
//! RFC 6455 framing happen here; the rest of the crate never names
//! tungstenite types.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

use super::{Inbound, Transport, TransportError};

/// Lower bound for the protocol-layer frame cap
const HARD_CAP_FLOOR: usize = 1024 * 1024;

/// WebSocket session over a TCP stream
pub struct WsTransport {
    inner: WebSocketStream<TcpStream>,
}

impl WsTransport {
    /// Perform the server-side upgrade handshake
    ///
    /// The protocol layer gets headroom above `max_frame_bytes` so that an
    /// oversize frame still reaches the decoder, which rejects it with a
    /// recoverable error reply instead of a closed connection. The hard cap
    /// here only bounds per-frame memory.
    pub async fn accept(stream: TcpStream, max_frame_bytes: usize) -> Result<Self, TransportError> {
        let hard_cap = max_frame_bytes.saturating_mul(4).max(HARD_CAP_FLOOR);
        let config = WebSocketConfig::default()
            .max_message_size(Some(hard_cap))
            .max_frame_size(Some(hard_cap));

        let inner = tokio_tungstenite::accept_async_with_config(stream, Some(config))
            .await
            .map_err(map_err)?;

        Ok(Self { inner })
    }
}

impl Transport for WsTransport {
    async fn send(&mut self, data: Bytes) -> Result<(), TransportError> {
        // Envelopes are JSON; deliver them as text frames
        let text = String::from_utf8(data.to_vec())
            .map_err(|e| TransportError::Protocol(format!("non-UTF-8 payload: {}", e)))?;

        self.inner.send(Message::text(text)).await.map_err(map_err)
    }

    async fn receive(&mut self) -> Result<Inbound, TransportError> {
        loop {
            match self.inner.next().await {
                None => return Ok(Inbound::Closed),
                Some(Err(WsError::ConnectionClosed)) | Some(Err(WsError::AlreadyClosed)) => {
                    return Ok(Inbound::Closed)
                }
                Some(Err(e)) => return Err(map_err(e)),
                Some(Ok(msg)) => match msg {
                    Message::Text(text) => {
                        return Ok(Inbound::Frame(Bytes::copy_from_slice(text.as_bytes())))
                    }
                    Message::Binary(data) => return Ok(Inbound::Frame(data)),
                    Message::Pong(_) => return Ok(Inbound::Pong),
                    // tungstenite queues the pong reply itself
                    Message::Ping(_) => continue,
                    Message::Close(_) => return Ok(Inbound::Closed),
                    Message::Frame(_) => continue,
                },
            }
        }
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.inner
            .send(Message::Ping(Bytes::new()))
            .await
            .map_err(map_err)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.inner.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(map_err(e)),
        }
    }
}

fn map_err(e: WsError) -> TransportError {
    match e {
        WsError::Io(io) => TransportError::Io(io.to_string()),
        other => TransportError::Protocol(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_frame_above_app_limit_reaches_decoder() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut transport = WsTransport::accept(stream, 64).await.unwrap();
            transport.receive().await
        });

        let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
            .await
            .unwrap();

        // Well beyond the 64-byte application limit but under the hard cap:
        // the transport must surface it as a frame, not an error
        let big = format!(r#"{{"type":"chat","content":"{}"}}"#, "x".repeat(200));
        client.send(Message::text(big.clone())).await.unwrap();

        let inbound = server.await.unwrap().unwrap();
        assert_eq!(inbound, Inbound::Frame(Bytes::from(big)));
    }
}
