//! Response handling and transformation.
//!
//! # Responsibilities
//! - Strip framing and encoding headers the relay invalidates
//! - Stream the backend body to the client in bounded chunks
//! - Enforce the relay deadline while the body is still flowing
//!
//! # Design Decisions
//! - Streaming responses avoid buffering entire body
//! - The body is decoded before it reaches this module, so length and
//!   encoding headers from the backend no longer describe it; the server
//!   re-frames the response
//! - A failure after headers were sent surfaces as a body error, which makes
//!   hyper abort the client connection instead of faking a clean end

use std::fmt::Display;

use axum::body::{Body, Bytes, HttpBody};
use axum::http::{header, HeaderMap, HeaderName, Response};
use axum::BoxError;
use futures_util::stream::{self, Stream, StreamExt};
use tokio::time::Instant;

use crate::error::GatewayError;

/// Backend response headers that are dropped before relaying.
pub const DROPPED_RESPONSE_HEADERS: [HeaderName; 5] = [
    header::CONTENT_ENCODING,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
];

/// Remove headers that describe the backend's framing rather than the body.
pub fn strip_response_headers(headers: &mut HeaderMap) {
    for name in DROPPED_RESPONSE_HEADERS.iter() {
        headers.remove(name);
    }
}

/// Turn a backend response into the client response: same status and
/// remaining headers, body re-chunked and bounded by `deadline`.
pub fn relay_response<B>(response: Response<B>, chunk_size: usize, deadline: Instant) -> Response<Body>
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let (mut parts, body) = response.into_parts();
    strip_response_headers(&mut parts.headers);

    let upstream = Body::new(body).into_data_stream();
    let body = Body::from_stream(rechunk(upstream, chunk_size, deadline));
    Response::from_parts(parts, body)
}

struct Rechunk<S> {
    upstream: S,
    pending: Bytes,
    chunk_size: usize,
    deadline: Instant,
    finished: bool,
}

/// Split upstream frames into chunks of at most `chunk_size` bytes, in order.
///
/// Yields one error and then ends if the upstream fails or `deadline` passes
/// while waiting for the next frame.
pub fn rechunk<S, E>(
    upstream: S,
    chunk_size: usize,
    deadline: Instant,
) -> impl Stream<Item = Result<Bytes, GatewayError>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Display + Send,
{
    let state = Rechunk {
        upstream,
        pending: Bytes::new(),
        chunk_size: chunk_size.max(1),
        deadline,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        loop {
            if !state.pending.is_empty() {
                let take = state.pending.len().min(state.chunk_size);
                let chunk = state.pending.split_to(take);
                return Some((Ok(chunk), state));
            }

            match tokio::time::timeout_at(state.deadline, state.upstream.next()).await {
                Ok(Some(Ok(frame))) => state.pending = frame,
                Ok(None) => return None,
                Ok(Some(Err(e))) => {
                    tracing::warn!(error = %e, "Backend body failed mid-stream");
                    state.finished = true;
                    return Some((Err(GatewayError::UpstreamDisconnected(e.to_string())), state));
                }
                Err(_) => {
                    tracing::warn!("Relay deadline passed while streaming body");
                    state.finished = true;
                    return Some((Err(GatewayError::RelayTimeout), state));
                }
            }
        }
    })
}
