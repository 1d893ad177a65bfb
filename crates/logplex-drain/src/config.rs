// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::{Path, PathBuf};

use crate::errors::ConfigError;
use crate::log_writer::{DEFAULT_DIR_MODE, DEFAULT_FILE_MODE};
use crate::router::RoutingPolicy;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 443;
const DEFAULT_MAX_REQUEST_CONTENT_LENGTH: usize = 10 * 1024 * 1024; // 10MB in Bytes

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Root directory the drain writes its log files under.
    pub log_directory: PathBuf,
    /// Unix mode for directories created under `log_directory`
    pub log_dir_mode: u32,
    /// Unix mode for log files created under `log_directory`
    pub log_file_mode: u32,
    pub routing: RoutingPolicy,
    /// Expected `Logplex-Drain-Token`. None disables authentication.
    pub drain_token: Option<String>,
    pub tls: Option<TlsConfig>,
    pub max_request_content_length: usize,
}

impl Config {
    pub fn new() -> Result<Config, ConfigError> {
        let log_directory = env::var("LOG_DIRECTORY")
            .ok()
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("LOG_DIRECTORY"))?;

        let log_dir_mode = parse_mode("LOG_DIR_MODE")?.unwrap_or(DEFAULT_DIR_MODE);
        let log_file_mode = parse_mode("LOG_FILE_MODE")?.unwrap_or(DEFAULT_FILE_MODE);

        let routing = match env::var("LOG_ROUTING") {
            Ok(value) => value.parse::<RoutingPolicy>().map_err(|_| ConfigError::Invalid {
                name: "LOG_ROUTING",
                value,
            })?,
            Err(_) => RoutingPolicy::default(),
        };

        let host = env::var("HOST")
            .ok()
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match env::var("PORT") {
            Ok(value) => value.parse::<u16>().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value,
            })?,
            Err(_) => DEFAULT_PORT,
        };

        let tls = match (non_empty_var("SSL_CERT_FILE"), non_empty_var("SSL_KEY_FILE")) {
            (Some(cert_file), Some(key_file)) => Some(TlsConfig {
                cert_file: PathBuf::from(cert_file),
                key_file: PathBuf::from(key_file),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteTls),
        };

        let max_request_content_length = match env::var("MAX_REQUEST_CONTENT_LENGTH") {
            Ok(value) => value.parse::<usize>().map_err(|_| ConfigError::Invalid {
                name: "MAX_REQUEST_CONTENT_LENGTH",
                value,
            })?,
            Err(_) => DEFAULT_MAX_REQUEST_CONTENT_LENGTH,
        };

        Ok(Config {
            host,
            port,
            log_directory,
            log_dir_mode,
            log_file_mode,
            routing,
            drain_token: non_empty_var("DRAIN_TOKEN"),
            tls,
            max_request_content_length,
        })
    }
}

/// Loads a `.env` file from the working directory or one of its parents
/// into the process environment. Variables that are already set keep their
/// value. Returns the loaded path, or None when there is no such file.
pub fn load_env_file() -> Result<Option<PathBuf>, ConfigError> {
    env_file_result(dotenvy::dotenv())
}

/// Same as [`load_env_file`] for an explicit path.
pub fn load_env_file_from(path: &Path) -> Result<Option<PathBuf>, ConfigError> {
    env_file_result(dotenvy::from_path(path).map(|()| path.to_path_buf()))
}

fn env_file_result(result: dotenvy::Result<PathBuf>) -> Result<Option<PathBuf>, ConfigError> {
    match result {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(ConfigError::EnvFile(e.to_string())),
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

/// Reads an octal permission mode such as `0750` or `750`.
fn parse_mode(name: &'static str) -> Result<Option<u32>, ConfigError> {
    let Some(value) = non_empty_var(name) else {
        return Ok(None);
    };
    let digits = value.trim().trim_start_matches("0o");
    match u32::from_str_radix(digits, 8) {
        Ok(mode) if mode <= 0o7777 => Ok(Some(mode)),
        _ => Err(ConfigError::Invalid { name, value }),
    }
}
