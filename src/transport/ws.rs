//! WebSocket channel for the reliable path
//!
//! Each packet is one binary message. Text, ping and pong frames are skipped.

use crate::error::TransportError;
use crate::transport::{PacketSink, PacketSource};
use async_trait::async_trait;
use async_tungstenite::WebSocketStream;
use async_tungstenite::tokio::{ConnectStream, connect_async};
use async_tungstenite::tungstenite::{Error as WsError, Message};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use log::debug;

pub struct WsSink<T> {
    inner: SplitSink<T, Message>,
}

pub struct WsSource<T> {
    inner: SplitStream<T>,
}

/// Split a connected WebSocket into packet halves
pub fn from_stream<T>(ws: T) -> (WsSink<T>, WsSource<T>)
where
    T: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Send + Unpin,
{
    let (sink, stream) = ws.split();
    (WsSink { inner: sink }, WsSource { inner: stream })
}

/// Connect to `url` (e.g. `ws://host:port/media`) and split the stream
pub async fn connect(
    url: &str,
) -> Result<
    (
        WsSink<WebSocketStream<ConnectStream>>,
        WsSource<WebSocketStream<ConnectStream>>,
    ),
    TransportError,
> {
    let (ws, _) = connect_async(url)
        .await
        .map_err(|e| TransportError::WebSocket(e.to_string()))?;
    Ok(from_stream(ws))
}

fn map_ws_error(err: WsError) -> TransportError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
        other => TransportError::WebSocket(other.to_string()),
    }
}

#[async_trait]
impl<T> PacketSink for WsSink<T>
where
    T: Sink<Message, Error = WsError> + Send + Unpin,
{
    async fn send(&mut self, data: Bytes) -> Result<(), TransportError> {
        self.inner
            .send(Message::Binary(data))
            .await
            .map_err(map_ws_error)
    }
}

#[async_trait]
impl<T> PacketSource for WsSource<T>
where
    T: Stream<Item = Result<Message, WsError>> + Send + Unpin,
{
    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(data),
                Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
                Some(Ok(other)) => debug!("skipping non-binary websocket frame: {:?}", other),
                Some(Err(e)) => return Err(map_ws_error(e)),
            }
        }
    }
}
