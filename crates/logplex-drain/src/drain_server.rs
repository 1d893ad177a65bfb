// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::service::service_fn;
use hyper::{http, Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::auth::authenticate;
use crate::config::Config;
use crate::decoder::decode_batch;
use crate::errors::DrainError;
use crate::headers::FrameHeaders;
use crate::http_utils::{
    log_and_create_http_response, verify_request_content_length, HttpResponse, RequestContext,
};
use crate::log_writer::LogWriter;
use crate::reconcile::reconcile_count;
use crate::tls::load_tls_acceptor;

pub const LOG_ENDPOINT_PATH: &str = "/log";

pub type ServerError = Box<dyn Error + Send + Sync>;

pub struct DrainServer {
    pub config: Arc<Config>,
    pub log_writer: Arc<dyn LogWriter + Send + Sync>,
}

impl DrainServer {
    /// Binds the configured address and serves Logplex frames until the
    /// listener fails.
    pub async fn start_drain_server(&self) -> Result<(), ServerError> {
        let tls_acceptor = match &self.config.tls {
            Some(tls) => Some(load_tls_acceptor(tls)?),
            None => None,
        };

        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(
            "Log drain listening on {} ({}), writing to {}",
            listener.local_addr()?,
            if tls_acceptor.is_some() { "https" } else { "http" },
            self.config.log_directory.display()
        );

        self.serve(listener, tls_acceptor).await
    }

    /// Accepts connections on `listener` and handles each one on its own task.
    /// When `tls_acceptor` is set the TLS handshake also runs on that task, so
    /// a slow client never holds up the accept loop.
    pub async fn serve(
        &self,
        listener: TcpListener,
        tls_acceptor: Option<TlsAcceptor>,
    ) -> Result<(), ServerError> {
        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();

        loop {
            let (conn, remote_addr) = tokio::select! {
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        return Err(e.into());
                    }
                    Ok(accepted) => accepted,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("Connection handler panicked: {:?}", e);
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
            };

            let config = self.config.clone();
            let log_writer = self.log_writer.clone();
            let service = service_fn(move |req: Request<Incoming>| {
                DrainServer::log_endpoint_handler(
                    config.clone(),
                    log_writer.clone(),
                    remote_addr,
                    req,
                )
            });

            let server = server.clone();
            let tls_acceptor = tls_acceptor.clone();
            joinset.spawn(async move {
                let result = match tls_acceptor {
                    Some(acceptor) => match acceptor.accept(conn).await {
                        Ok(stream) => server.serve_connection(TokioIo::new(stream), service).await,
                        Err(e) => {
                            warn!("TLS handshake with {remote_addr} failed: {e}");
                            return;
                        }
                    },
                    None => server.serve_connection(TokioIo::new(conn), service).await,
                };
                if let Err(e) = result {
                    error!("Connection error from {remote_addr}: {e}");
                }
            });
        }
    }

    /// Handles one request. Every outcome is logged with the request's drain
    /// token and frame id, and answered with an empty body.
    pub async fn log_endpoint_handler<B>(
        config: Arc<Config>,
        log_writer: Arc<dyn LogWriter + Send + Sync>,
        remote_addr: SocketAddr,
        req: Request<B>,
    ) -> http::Result<HttpResponse>
    where
        B: Body,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();
        let frame = FrameHeaders::read(&parts.headers);
        let context = RequestContext {
            remote_addr,
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            drain_token: frame.drain_token.clone(),
            frame_id: frame.frame_id.clone(),
        };

        if parts.uri.path() != LOG_ENDPOINT_PATH {
            return log_and_create_http_response(&context, "Unknown endpoint", StatusCode::NOT_FOUND);
        }
        if parts.method != Method::POST {
            return log_and_create_http_response(
                &context,
                "Unsupported method",
                StatusCode::METHOD_NOT_ALLOWED,
            );
        }

        let frame = match frame.validate() {
            Ok(frame) => frame,
            Err(e) => return reject(&context, e),
        };
        if let Err(e) = authenticate(&frame, config.drain_token.as_deref()) {
            return reject(&context, e);
        }

        if let Err(e) =
            verify_request_content_length(&parts.headers, config.max_request_content_length)
        {
            return reject(&context, e);
        }
        let body = match Limited::new(body, config.max_request_content_length)
            .collect()
            .await
        {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                return reject(
                    &context,
                    DrainError::BodyTooLarge {
                        limit: config.max_request_content_length,
                    },
                );
            }
            Err(e) => return reject(&context, DrainError::BodyRead(e.to_string())),
        };

        match process_frame(&frame, &body, log_writer.as_ref()).await {
            Ok(written) => log_and_create_http_response(
                &context,
                &format!("Accepted frame with {written} messages"),
                StatusCode::OK,
            ),
            Err(e) => reject(&context, e),
        }
    }
}

/// Decodes a frame body, checks it against the declared count and appends it.
/// Nothing is written unless the whole batch decodes and the count matches.
async fn process_frame(
    frame: &FrameHeaders,
    body: &[u8],
    log_writer: &(dyn LogWriter + Send + Sync),
) -> Result<usize, DrainError> {
    let messages = decode_batch(body)?;
    reconcile_count(frame.msg_count, messages.len())?;
    debug!(
        "Decoded {} messages from frame {}",
        messages.len(),
        frame.frame_id
    );
    Ok(log_writer.write_batch(frame, &messages).await?)
}

fn reject(context: &RequestContext, err: DrainError) -> http::Result<HttpResponse> {
    log_and_create_http_response(context, &format!("Rejected frame: {err}"), err.status_code())
}
