//! Transport socket wrapper: one physical socket to one URL.
//!
//! A [`Socket`] is the registry's view of an open connection: it can send
//! text, request a close, and yields [`SocketEvent`]s. How the bytes move is
//! up to the [`Connector`] that produced it. [`TungsteniteConnector`] is the
//! real one; tests plug in an in-memory connector built on [`Socket::pair`].

use futures_util::future::BoxFuture;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{WsError, WsResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// What the socket reports upward.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// A text frame from the server.
    Message(String),
    /// A transport error. A `Closed` event follows.
    Error(String),
    /// The connection is gone. Always the last event.
    Closed { code: Option<u16>, reason: String },
}

/// What the owner asks the socket to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Close,
}

/// Owner's end of an open connection.
#[derive(Debug)]
pub struct Socket {
    outbound: mpsc::UnboundedSender<Outbound>,
    events: mpsc::UnboundedReceiver<SocketEvent>,
}

/// Transport's end of an open connection, returned by [`Socket::pair`].
#[derive(Debug)]
pub struct SocketPeer {
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<SocketEvent>,
}

impl Socket {
    /// An in-memory socket plus the peer that drives it.
    pub fn pair() -> (Socket, SocketPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Socket {
                outbound: outbound_tx,
                events: events_rx,
            },
            SocketPeer {
                outbound: outbound_rx,
                events: events_tx,
            },
        )
    }

    pub fn send(&self, text: String) -> WsResult<()> {
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| WsError::SendFailed("socket already closed".into()))
    }

    /// Ask the transport to close. No further events are read after this.
    pub fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }

    /// Next event; `None` once the transport is gone without saying goodbye.
    pub async fn next_event(&mut self) -> Option<SocketEvent> {
        self.events.recv().await
    }
}

impl SocketPeer {
    /// Push an event to the owner. Returns `false` if the socket was dropped.
    pub fn emit(&self, event: SocketEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

/// Opens sockets. One call per physical connection attempt.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, url: &str) -> BoxFuture<'static, WsResult<Socket>>;
}

// ─── tokio-tungstenite ───────────────────────────────────────────────────────

/// Native connector using `tokio-tungstenite`.
///
/// Each open socket is driven by a pump task that forwards text frames,
/// answers pings and reports the close.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn open(&self, url: &str) -> BoxFuture<'static, WsResult<Socket>> {
        let url = url.to_string();
        Box::pin(async move {
            let (stream, _) = connect_async(url.as_str()).await?;
            let (sink, source) = stream.split();
            let (socket, peer) = Socket::pair();
            tokio::spawn(pump(sink, source, peer));
            Ok(socket)
        })
    }
}

async fn pump(mut sink: WsSink, mut source: WsSource, mut peer: SocketPeer) {
    loop {
        tokio::select! {
            msg = source.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let text: &str = text.as_ref();
                        if !peer.emit(SocketEvent::Message(text.to_owned())) {
                            let _ = sink.close().await;
                            return;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = extract_close(frame.as_ref());
                        // Push out the close reply tungstenite queued for us.
                        let _ = sink.flush().await;
                        peer.emit(SocketEvent::Closed { code: Some(code), reason });
                        return;
                    }
                    Some(Ok(_)) => {} // Binary, Pong, Frame
                    Some(Err(e)) => {
                        let reason = e.to_string();
                        tracing::error!("WebSocket error: {}", reason);
                        peer.emit(SocketEvent::Error(reason.clone()));
                        peer.emit(SocketEvent::Closed { code: None, reason });
                        return;
                    }
                    None => {
                        peer.emit(SocketEvent::Closed {
                            code: None,
                            reason: "Stream ended".into(),
                        });
                        return;
                    }
                }
            }

            cmd = peer.outbound.recv() => {
                match cmd {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            tracing::warn!("Send failed: {}", e);
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = sink
                            .send(Message::Close(Some(CloseFrame {
                                code: CloseCode::Normal,
                                reason: "Client disconnect".into(),
                            })))
                            .await;
                        return;
                    }
                }
            }
        }
    }
}

/// Extract close code and reason from an optional CloseFrame.
fn extract_close(frame: Option<&CloseFrame>) -> (u16, String) {
    match frame {
        Some(f) => (f.code.into(), f.reason.to_string()),
        None => (1005, "No close frame".into()),
    }
}
