// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use logplex_drain::config::Config;
use logplex_drain::drain_server::{DrainServer, ServerError, LOG_ENDPOINT_PATH};
use logplex_drain::headers::{
    LOGPLEX_CONTENT_TYPE, LOGPLEX_DRAIN_TOKEN, LOGPLEX_FRAME_ID, LOGPLEX_MSG_COUNT,
};
use logplex_drain::log_writer::{FileLogWriter, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE};
use logplex_drain::router::{Router, RoutingPolicy};

pub fn create_test_config(root: &Path, drain_token: Option<&str>) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        log_directory: root.to_path_buf(),
        log_dir_mode: DEFAULT_DIR_MODE,
        log_file_mode: DEFAULT_FILE_MODE,
        routing: RoutingPolicy::Source,
        drain_token: drain_token.map(str::to_string),
        tls: None,
        max_request_content_length: 1024 * 1024,
    }
}

/// Starts a plain HTTP drain on an ephemeral local port and returns its
/// address with the server task.
pub async fn start_drain(config: Config) -> (SocketAddr, JoinHandle<Result<(), ServerError>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log_writer = Arc::new(FileLogWriter::new(
        Router::new(config.log_directory.clone(), config.routing),
        config.log_dir_mode,
        config.log_file_mode,
    ));
    let server = DrainServer {
        config: Arc::new(config),
        log_writer,
    };
    let handle = tokio::spawn(async move { server.serve(listener, None).await });
    (addr, handle)
}

/// Wraps each record in an octet-counted frame.
pub fn frame_body(records: &[&str]) -> Vec<u8> {
    records
        .iter()
        .map(|record| format!("{} {}", record.len(), record))
        .collect::<String>()
        .into_bytes()
}

/// Sends a Logplex frame to the drain and returns the response.
pub async fn send_frame(
    addr: SocketAddr,
    msg_count: &str,
    drain_token: &str,
    frame_id: &str,
    body: Vec<u8>,
) -> Result<Response<hyper::body::Incoming>, Box<dyn std::error::Error + Send + Sync>> {
    let request = Request::builder()
        .uri(LOG_ENDPOINT_PATH)
        .method("POST")
        .header("Host", addr.to_string())
        .header("Content-Type", LOGPLEX_CONTENT_TYPE)
        .header(LOGPLEX_MSG_COUNT, msg_count)
        .header(LOGPLEX_FRAME_ID, frame_id)
        .header(LOGPLEX_DRAIN_TOKEN, drain_token)
        .header("Content-Length", body.len().to_string())
        .body(Full::new(Bytes::from(body)))?;
    send_request(addr, request).await
}

/// Send an HTTP request over TCP and return the response
pub async fn send_request(
    addr: SocketAddr,
    request: Request<Full<Bytes>>,
) -> Result<Response<hyper::body::Incoming>, Box<dyn std::error::Error + Send + Sync>> {
    let stream = timeout(
        Duration::from_secs(2),
        tokio::net::TcpStream::connect(addr),
    )
    .await??;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let response = timeout(Duration::from_secs(5), sender.send_request(request)).await??;
    Ok(response)
}
