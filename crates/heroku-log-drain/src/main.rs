// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, process::ExitCode, sync::Arc};
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

use logplex_drain::{config, drain_server::DrainServer, log_writer::FileLogWriter, router::Router};

#[tokio::main]
pub async fn main() -> ExitCode {
    // before anything reads the environment, LOG_LEVEL included
    let env_file = config::load_env_file();

    let log_level = env::var("LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    match env_file {
        Ok(Some(path)) => debug!("Loaded environment from {}", path.display()),
        Ok(None) => debug!("No .env file found, using the process environment only"),
        Err(e) => {
            error!("Error loading environment on log drain startup: {e}");
            return ExitCode::FAILURE;
        }
    }

    let config = match config::Config::new() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Error creating config on log drain startup: {e}");
            return ExitCode::FAILURE;
        }
    };

    if config.drain_token.is_none() {
        warn!("DRAIN_TOKEN is not set, frames from any drain will be accepted");
    }
    if config.tls.is_none() {
        warn!("SSL_CERT_FILE and SSL_KEY_FILE are not set, serving plain HTTP");
    }
    debug!(
        "Routing log lines by {} under {}",
        config.routing,
        config.log_directory.display()
    );

    let log_writer = Arc::new(FileLogWriter::new(
        Router::new(config.log_directory.clone(), config.routing),
        config.log_dir_mode,
        config.log_file_mode,
    ));

    let drain_server = DrainServer {
        config: Arc::clone(&config),
        log_writer,
    };

    if let Err(e) = drain_server.start_drain_server().await {
        error!("Error when starting the log drain: {e:?}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
