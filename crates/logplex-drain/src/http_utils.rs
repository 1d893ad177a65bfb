// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{
    header,
    http::{self, HeaderMap},
    Method, Response, StatusCode,
};
use tracing::{debug, error, warn};

use crate::errors::DrainError;

pub type HttpResponse = Response<Full<Bytes>>;

/// Request details attached to every log line the drain writes about a frame.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub remote_addr: SocketAddr,
    pub method: Method,
    pub path: String,
    pub drain_token: String,
    pub frame_id: String,
}

/// Does two things:
/// 1. Logs the given message with the request context. A success status code
///    is logged at debug, a client error at warn and a server error at error.
/// 2. Returns an empty response with the given status code.
pub fn log_and_create_http_response(
    context: &RequestContext,
    message: &str,
    status: StatusCode,
) -> http::Result<HttpResponse> {
    let RequestContext {
        remote_addr,
        method,
        path,
        drain_token,
        frame_id,
    } = context;
    let status_code = status.as_u16();
    if status.is_success() {
        debug!(%remote_addr, %method, path, drain_token, frame_id, status = status_code, "{message}");
    } else if status.is_server_error() {
        error!(%remote_addr, %method, path, drain_token, frame_id, status = status_code, "{message}");
    } else {
        warn!(%remote_addr, %method, path, drain_token, frame_id, status = status_code, "{message}");
    }
    create_empty_http_response(status)
}

/// Builds a response with the given status and an empty body. Logplex ignores
/// response bodies, so the failure detail only ever goes to the drain's logs.
pub fn create_empty_http_response(status: StatusCode) -> http::Result<HttpResponse> {
    Response::builder().status(status).body(Full::new(Bytes::new()))
}

/// Takes a request's header map and checks that a "content-length" header, if
/// present, is valid and no larger than `max_content_length`. Chunked bodies
/// without a content length pass and are checked again once read.
pub fn verify_request_content_length(
    header_map: &HeaderMap,
    max_content_length: usize,
) -> Result<(), DrainError> {
    let Some(content_length_header) = header_map.get(header::CONTENT_LENGTH) else {
        debug!(
            "No Content-Length header, Transfer-Encoding: {:?}",
            header_map.get(header::TRANSFER_ENCODING)
        );
        return Ok(());
    };
    let content_length = content_length_header
        .to_str()
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .ok_or_else(|| {
            DrainError::InvalidContentLength(
                String::from_utf8_lossy(content_length_header.as_bytes()).into_owned(),
            )
        })?;
    if content_length > max_content_length {
        return Err(DrainError::BodyTooLarge {
            limit: max_content_length,
        });
    }
    Ok(())
}
