// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::path::PathBuf;

use hyper::StatusCode;

/// Reasons a Logplex frame is rejected by the drain.
#[derive(Debug, thiserror::Error)]
pub enum DrainError {
    #[error("invalid content-type: {0:?}")]
    InvalidContentType(String),

    #[error("drain token does not match the configured token")]
    AuthenticationFailed,

    #[error("invalid content-length: {0:?}")]
    InvalidContentLength(String),

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("error reading request body: {0}")]
    BodyRead(String),

    #[error("error decoding request body: {0}")]
    BodyDecode(#[from] DecodeError),

    #[error("message count mismatch: header declared {declared}, body contained {decoded}")]
    CountMismatch { declared: usize, decoded: usize },

    #[error("error writing log lines: {0}")]
    Write(#[from] WriteError),
}

impl DrainError {
    /// HTTP status returned to Logplex for this failure. Only write failures
    /// are reported as a server error, every other kind is the sender's fault.
    pub fn status_code(&self) -> StatusCode {
        match self {
            DrainError::Write(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Failures while splitting or parsing the octet-counted syslog body.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid frame length prefix at byte {offset}")]
    InvalidLength { offset: usize },

    #[error("missing space after frame length at byte {offset}")]
    MissingSeparator { offset: usize },

    #[error("frame at byte {offset} declares {declared} bytes but only {available} remain")]
    Truncated {
        offset: usize,
        declared: usize,
        available: usize,
    },

    #[error("frame at byte {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },

    #[error("frame at byte {offset} is not an RFC5424 syslog message")]
    NotRfc5424 { offset: usize },

    #[error("frame at byte {offset} has no priority")]
    MissingPriority { offset: usize },

    #[error("frame at byte {offset} has no timestamp")]
    MissingTimestamp { offset: usize },
}

/// Failures while appending decoded messages to their destination files.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to open {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to write to {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("short write to {path}: wrote {written} of {expected} bytes")]
    ShortWrite {
        path: PathBuf,
        written: usize,
        expected: usize,
    },

    #[error("log writer task failed: {0}")]
    Join(String),
}

/// Errors raised while reading the drain configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("SSL_CERT_FILE and SSL_KEY_FILE must be set together")]
    IncompleteTls,

    #[error("failed to load .env file: {0}")]
    EnvFile(String),
}
