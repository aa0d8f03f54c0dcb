//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Open the backend WebSocket before answering the client upgrade
//! - Complete upgrade handshake with client, echoing the backend subprotocol
//!   (none when the backend declined every offered one)
//! - Bidirectional message forwarding
//! - Close both sides exactly once
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Proxy ←──── WebSocket frames ────→ Backend
//!          pump(client → backend)         pump(backend → client)
//! ```
//!
//! # Design Decisions
//! - A backend that cannot be reached fails the handshake with 500 instead
//!   of accepting the client and closing right away
//! - Whole messages are forwarded; ping/pong stay on their own hop
//! - Each pump owns one sink and hands it back when it ends, so teardown
//!   happens in one place after both pumps stopped
//! - The first pump to end stops the other through a watch channel

use std::fmt::Display;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::http::{header, HeaderMap, HeaderName};
use axum::response::Response;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use thiserror::Error;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::{ProtocolError, SubProtocolError};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as BackendCloseFrame;
use tokio_tungstenite::tungstenite::Message as BackendMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::ProxyConfig;
use crate::error::GatewayError;
use crate::http::relay::Destination;
use crate::http::request::RequestContext;
use crate::observability::metrics;
use crate::routing::RouteTarget;

type BackendSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type BackendResponse = tokio_tungstenite::tungstenite::handshake::client::Response;

#[derive(Debug, Error)]
enum HandshakeError {
    #[error(transparent)]
    Failed(WsError),
    #[error("handshake timed out")]
    TimedOut,
}

/// Close code for failures inside the relay.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;
/// Close code sent to the backend when the client vanished without a close.
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Longest close reason that fits a control frame.
pub const MAX_CLOSE_REASON: usize = 123;

/// Client handshake headers that are not forwarded: the backend handshake
/// generates its own.
const SKIPPED_HANDSHAKE_HEADERS: [HeaderName; 6] = [
    header::HOST,
    header::CONNECTION,
    header::UPGRADE,
    header::SEC_WEBSOCKET_KEY,
    header::SEC_WEBSOCKET_VERSION,
    header::SEC_WEBSOCKET_EXTENSIONS,
];

/// Close code and reason, independent of either WebSocket library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub fn new(code: u16, reason: impl AsRef<str>) -> Self {
        Self {
            code,
            reason: truncate_reason(reason.as_ref()),
        }
    }
}

/// Cut a close reason to the frame limit without splitting a character.
pub fn truncate_reason(reason: &str) -> String {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason.to_string();
    }
    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_string()
}

/// What a pump does with one received message.
#[derive(Debug, PartialEq)]
pub enum Forward<T> {
    Message(T),
    Close(Option<CloseInfo>),
    Skip,
}

/// Why a pump stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpEnd {
    /// Source sent a close frame.
    Closed(Option<CloseInfo>),
    /// Source ended without a close frame.
    Exhausted,
    SourceFailed(String),
    SinkFailed(String),
    /// The other pump ended first.
    Stopped,
}

/// Final action on one side's sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Teardown {
    /// Relay the peer's close frame (or a bare close).
    Forward(Option<CloseInfo>),
    /// Close with 1011 and this reason.
    Error(String),
    /// Close without a frame of our own.
    Finish,
}

/// Decide how to close the client, given how both pumps ended.
pub fn client_teardown(upstream: &PumpEnd, downstream: &PumpEnd) -> Teardown {
    match (downstream, upstream) {
        (PumpEnd::Closed(info), _) => Teardown::Forward(info.clone()),
        (PumpEnd::SourceFailed(e), _) => Teardown::Error(format!("backend error: {e}")),
        (PumpEnd::Exhausted, _) => Teardown::Error("backend disconnected".to_string()),
        (_, PumpEnd::SinkFailed(e)) => Teardown::Error(format!("backend send failed: {e}")),
        _ => Teardown::Finish,
    }
}

/// Decide how to close the backend, given how both pumps ended.
pub fn backend_teardown(upstream: &PumpEnd, downstream: &PumpEnd) -> Teardown {
    match (upstream, downstream) {
        (PumpEnd::Closed(info), _) => Teardown::Forward(info.clone()),
        (PumpEnd::SourceFailed(e), _) => Teardown::Error(format!("client error: {e}")),
        (PumpEnd::Exhausted, _) => {
            Teardown::Forward(Some(CloseInfo::new(CLOSE_GOING_AWAY, "client disconnected")))
        }
        (_, PumpEnd::SinkFailed(e)) => Teardown::Error(format!("client send failed: {e}")),
        _ => Teardown::Finish,
    }
}

fn client_to_backend(message: Message) -> Forward<BackendMessage> {
    match message {
        Message::Text(text) => Forward::Message(BackendMessage::Text(text.as_str().to_owned().into())),
        Message::Binary(data) => Forward::Message(BackendMessage::Binary(data)),
        Message::Close(frame) => {
            Forward::Close(frame.map(|f| CloseInfo::new(f.code, f.reason.as_str())))
        }
        Message::Ping(_) | Message::Pong(_) => Forward::Skip,
    }
}

fn backend_to_client(message: BackendMessage) -> Forward<Message> {
    match message {
        BackendMessage::Text(text) => Forward::Message(Message::Text(text.as_str().to_owned().into())),
        BackendMessage::Binary(data) => Forward::Message(Message::Binary(data)),
        BackendMessage::Close(frame) => {
            Forward::Close(frame.map(|f| CloseInfo::new(u16::from(f.code), f.reason.as_str())))
        }
        BackendMessage::Ping(_) | BackendMessage::Pong(_) | BackendMessage::Frame(_) => Forward::Skip,
    }
}

fn client_close(info: CloseInfo) -> Message {
    Message::Close(Some(CloseFrame {
        code: info.code,
        reason: info.reason.into(),
    }))
}

fn backend_close(info: CloseInfo) -> BackendMessage {
    BackendMessage::Close(Some(BackendCloseFrame {
        code: CloseCode::from(info.code),
        reason: info.reason.into(),
    }))
}

/// Copy messages from `source` to `sink` until either side ends or `stop`
/// fires. Returns the sink so the caller can close it.
pub async fn pump<In, Out, Src, Snk, SrcErr, SnkErr>(
    mut source: Src,
    mut sink: Snk,
    mut stop: watch::Receiver<bool>,
    convert: fn(In) -> Forward<Out>,
) -> (Snk, PumpEnd)
where
    Src: Stream<Item = Result<In, SrcErr>> + Unpin,
    Snk: Sink<Out, Error = SnkErr> + Unpin,
    SrcErr: Display,
    SnkErr: Display,
{
    loop {
        let next = tokio::select! {
            _ = stop.changed() => return (sink, PumpEnd::Stopped),
            next = source.next() => next,
        };

        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(e)) => return (sink, PumpEnd::SourceFailed(e.to_string())),
            None => return (sink, PumpEnd::Exhausted),
        };

        match convert(message) {
            Forward::Skip => continue,
            Forward::Close(info) => return (sink, PumpEnd::Closed(info)),
            Forward::Message(out) => {
                let sent = tokio::select! {
                    _ = stop.changed() => return (sink, PumpEnd::Stopped),
                    sent = sink.send(out) => sent,
                };
                if let Err(e) = sent {
                    return (sink, PumpEnd::SinkFailed(e.to_string()));
                }
            }
        }
    }
}

async fn finish<S, M, E>(sink: Option<S>, teardown: Teardown, close: fn(CloseInfo) -> M)
where
    S: Sink<M, Error = E> + Unpin,
    E: Display,
{
    let Some(mut sink) = sink else {
        return;
    };
    let frame = match teardown {
        Teardown::Forward(info) => info.map(close),
        Teardown::Error(reason) => Some(close(CloseInfo::new(CLOSE_INTERNAL_ERROR, reason))),
        Teardown::Finish => None,
    };
    if let Some(frame) = frame {
        if let Err(e) = sink.send(frame).await {
            tracing::debug!(error = %e, "Close frame not delivered");
        }
    }
    if let Err(e) = sink.close().await {
        tracing::debug!(error = %e, "Socket close failed");
    }
}

/// Relay messages between an accepted client socket and an open backend
/// socket until one side ends, then close both.
pub async fn relay(client: WebSocket, backend: BackendSocket, request_id: String) {
    metrics::websocket_opened();
    tracing::debug!(request_id = %request_id, "WebSocket relay started");

    let (client_sink, client_stream) = client.split();
    let (backend_sink, backend_stream) = backend.split();
    let (stop_tx, stop_rx) = watch::channel(false);

    let mut upstream = tokio::spawn(pump(client_stream, backend_sink, stop_rx.clone(), client_to_backend));
    let mut downstream = tokio::spawn(pump(backend_stream, client_sink, stop_rx, backend_to_client));

    let (up, down) = tokio::select! {
        up = &mut upstream => {
            let _ = stop_tx.send(true);
            (up, downstream.await)
        }
        down = &mut downstream => {
            let _ = stop_tx.send(true);
            (upstream.await, down)
        }
    };

    let (backend_sink, up_end) = match up {
        Ok((sink, end)) => (Some(sink), end),
        Err(e) => (None, PumpEnd::SourceFailed(format!("pump task failed: {e}"))),
    };
    let (client_sink, down_end) = match down {
        Ok((sink, end)) => (Some(sink), end),
        Err(e) => (None, PumpEnd::SourceFailed(format!("pump task failed: {e}"))),
    };

    tracing::debug!(
        request_id = %request_id,
        client_to_backend = ?up_end,
        backend_to_client = ?down_end,
        "WebSocket relay ended"
    );

    let to_client = client_teardown(&up_end, &down_end);
    let to_backend = backend_teardown(&up_end, &down_end);
    tokio::join!(
        finish(client_sink, to_client, client_close),
        finish(backend_sink, to_backend, backend_close),
    );

    metrics::websocket_closed();
}

/// Handshake side of the WebSocket relay.
#[derive(Debug, Clone)]
pub struct WebSocketRelay {
    connect_timeout: Duration,
}

impl WebSocketRelay {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.timeouts.connect_secs),
        }
    }

    /// Open the backend socket. Returns it together with the subprotocol the
    /// backend selected, if any.
    ///
    /// The client's subprotocol offer is forwarded. A backend that answers
    /// without choosing one is legal, but the handshake library rejects that
    /// reply, so the handshake is repeated once without the offer.
    pub async fn connect_backend(
        &self,
        ctx: &RequestContext,
        target: &RouteTarget,
    ) -> Result<(BackendSocket, Option<String>), GatewayError> {
        let destination = Destination::parse(&target.destination)?;
        let url = destination.websocket_url(&target.target_path, ctx.query.as_deref());

        let offered = ctx.headers.contains_key(header::SEC_WEBSOCKET_PROTOCOL);
        let (socket, response) = match self.handshake(&url, &ctx.headers, true).await {
            Err(HandshakeError::Failed(WsError::Protocol(ProtocolError::SecWebSocketSubProtocolError(
                SubProtocolError::NoSubProtocol,
            )))) if offered => {
                tracing::debug!(url = %url, "Backend chose no subprotocol, reconnecting without the offer");
                self.handshake(&url, &ctx.headers, false).await
            }
            other => other,
        }
        .map_err(|e| GatewayError::BackendUnreachable(format!("{url}: {e}")))?;

        let protocol = response
            .headers()
            .get(header::SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok((socket, protocol))
    }

    async fn handshake(
        &self,
        url: &str,
        headers: &HeaderMap,
        offer_protocols: bool,
    ) -> Result<(BackendSocket, BackendResponse), HandshakeError> {
        let mut request = url.into_client_request().map_err(HandshakeError::Failed)?;
        for (name, value) in headers.iter() {
            if SKIPPED_HANDSHAKE_HEADERS.contains(name) {
                continue;
            }
            if !offer_protocols && *name == header::SEC_WEBSOCKET_PROTOCOL {
                continue;
            }
            request.headers_mut().append(name.clone(), value.clone());
        }

        match tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(request)).await {
            Ok(Ok(pair)) => Ok(pair),
            Ok(Err(e)) => Err(HandshakeError::Failed(e)),
            Err(_) => Err(HandshakeError::TimedOut),
        }
    }

    /// Connect the backend, then accept the client upgrade and start relaying.
    pub async fn upgrade(
        &self,
        upgrade: WebSocketUpgrade,
        ctx: &RequestContext,
        target: &RouteTarget,
    ) -> Result<Response, GatewayError> {
        let (backend, protocol) = self.connect_backend(ctx, target).await?;

        let upgrade = match protocol {
            Some(protocol) => upgrade.protocols([protocol]),
            None => upgrade,
        };

        let request_id = ctx.request_id.clone();
        let failed_id = request_id.clone();
        Ok(upgrade
            .on_failed_upgrade(move |e| {
                tracing::warn!(request_id = %failed_id, error = %e, "Client upgrade failed");
            })
            .on_upgrade(move |client| relay(client, backend, request_id)))
    }
}
