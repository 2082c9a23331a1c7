use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::{classify_ws, StreamError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of an open message stream.
#[async_trait::async_trait]
pub trait MessageSink: Send {
    async fn send(&mut self, text: String) -> Result<(), StreamError>;
    async fn close(&mut self) -> Result<(), StreamError>;
}

/// Read half of an open message stream. `None` means the peer closed.
#[async_trait::async_trait]
pub trait MessageStream: Send {
    async fn next(&mut self) -> Option<Result<String, StreamError>>;
}

/// Opens message streams to the backend endpoint.
///
/// Behind a trait so tests can script an in-memory endpoint.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn MessageSink>, Box<dyn MessageStream>), StreamError>;
}

/// WebSocket transport over tokio-tungstenite.
pub struct WsTransport;

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn MessageSink>, Box<dyn MessageStream>), StreamError> {
        let (ws, _) = connect_async(url).await.map_err(|e| classify_ws(&e))?;
        let (sink, stream) = ws.split();

        Ok((
            Box::new(WsSink { inner: sink }),
            Box::new(WsMessageStream { inner: stream }),
        ))
    }
}

struct WsSink {
    inner: SplitSink<WsStream, tungstenite::Message>,
}

#[async_trait::async_trait]
impl MessageSink for WsSink {
    async fn send(&mut self, text: String) -> Result<(), StreamError> {
        self.inner
            .send(tungstenite::Message::Text(text.into()))
            .await
            .map_err(|e| classify_ws(&e))
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        self.inner.close().await.map_err(|e| classify_ws(&e))
    }
}

struct WsMessageStream {
    inner: SplitStream<WsStream>,
}

#[async_trait::async_trait]
impl MessageStream for WsMessageStream {
    async fn next(&mut self) -> Option<Result<String, StreamError>> {
        loop {
            match self.inner.next().await? {
                Ok(tungstenite::Message::Text(text)) => return Some(Ok(text.into())),
                Ok(tungstenite::Message::Close(frame)) => {
                    debug!("websocket closed by peer: {:?}", frame);
                    return None;
                }
                // Control frames are handled by the library; skip the rest.
                Ok(_) => continue,
                Err(e) => return Some(Err(classify_ws(&e))),
            }
        }
    }
}
