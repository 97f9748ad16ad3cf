// nasvm/src/rpc/transport.rs
//
// Copyright (c) 2025 Arcella Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Frame transport underneath a [`Session`](super::Session).

use std::future::Future;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{NasvmError, Result as NasvmResult};

/// A bidirectional channel of JSON text frames.
///
/// The session never has more than one request in flight, so `recv`
/// always returns the answer to the last `send`.
pub trait Transport {
    /// Sends one text frame.
    fn send(&mut self, text: String) -> impl Future<Output = NasvmResult<()>> + Send;

    /// Waits for the next text frame.
    ///
    /// Returns [`NasvmError::ConnectionClosed`] if the peer goes away first.
    fn recv(&mut self) -> impl Future<Output = NasvmResult<String>> + Send;

    /// Closes the channel. Closing an already closed channel is not an error.
    fn close(&mut self) -> impl Future<Output = NasvmResult<()>> + Send;
}

/// Builds the API endpoint for a server name or `host:port`.
pub fn websocket_url(server: &str) -> String {
    format!("ws://{}/websocket", server)
}

/// [`Transport`] over a websocket connection.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTransport {
    /// Opens `ws://<server>/websocket`.
    pub async fn connect(server: &str) -> NasvmResult<Self> {
        let url = websocket_url(server);
        tracing::debug!(%url, "Opening websocket");
        let (stream, _response) = connect_async(url.as_str()).await?;
        Ok(Self { stream })
    }
}

impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> NasvmResult<()> {
        self.stream.send(Message::text(text)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> NasvmResult<String> {
        while let Some(frame) = self.stream.next().await {
            match frame? {
                Message::Text(text) => return Ok(text.as_str().to_owned()),
                Message::Binary(bytes) => {
                    return String::from_utf8(bytes.to_vec()).map_err(|e| {
                        NasvmError::Internal(format!("non UTF-8 binary frame: {}", e))
                    });
                }
                Message::Close(frame) => {
                    tracing::debug!(?frame, "Server closed the websocket");
                    return Err(NasvmError::ConnectionClosed);
                }
                // Ping/pong are answered by tungstenite itself.
                _ => continue,
            }
        }
        Err(NasvmError::ConnectionClosed)
    }

    async fn close(&mut self) -> NasvmResult<()> {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url() {
        assert_eq!(websocket_url("urca"), "ws://urca/websocket");
        assert_eq!(websocket_url("10.0.0.5:8080"), "ws://10.0.0.5:8080/websocket");
    }
}
