// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::message::{LogplexMessage, NIL_VALUE};

const SINGLE_FILE_NAME: &str = "drain.log";
const LOG_FILE_EXTENSION: &str = "log";

/// How decoded messages are spread across files under the log directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoutingPolicy {
    /// `<root>/<drain token>/<hostname>.<app>.<procid>.log`
    #[default]
    Source,
    /// `<root>/<drain token>.log`
    Drain,
    /// `<root>/drain.log`, shared by every drain.
    Single,
}

impl FromStr for RoutingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "source" => Ok(RoutingPolicy::Source),
            "drain" => Ok(RoutingPolicy::Drain),
            "single" => Ok(RoutingPolicy::Single),
            other => Err(format!("unknown routing policy: {other}")),
        }
    }
}

impl fmt::Display for RoutingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoutingPolicy::Source => "source",
            RoutingPolicy::Drain => "drain",
            RoutingPolicy::Single => "single",
        };
        write!(f, "{name}")
    }
}

/// Maps a message to the file it is appended to.
#[derive(Debug, Clone)]
pub struct Router {
    root: PathBuf,
    policy: RoutingPolicy,
}

impl Router {
    pub fn new(root: impl Into<PathBuf>, policy: RoutingPolicy) -> Self {
        Router {
            root: root.into(),
            policy,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> RoutingPolicy {
        self.policy
    }

    /// Destination file for `message` received on the drain `drain_token`.
    /// The returned path is always inside the root directory.
    pub fn route(&self, drain_token: &str, message: &LogplexMessage) -> PathBuf {
        match self.policy {
            RoutingPolicy::Source => {
                let file_name = format!(
                    "{}.{}.{}.{LOG_FILE_EXTENSION}",
                    sanitize_component(message.hostname_or_nil()),
                    sanitize_component(message.app_name_or_nil()),
                    sanitize_component(message.proc_id_or_nil()),
                );
                self.root
                    .join(sanitize_component(drain_token))
                    .join(file_name)
            }
            RoutingPolicy::Drain => self.root.join(format!(
                "{}.{LOG_FILE_EXTENSION}",
                sanitize_component(drain_token)
            )),
            RoutingPolicy::Single => self.root.join(SINGLE_FILE_NAME),
        }
    }
}

/// Makes an untrusted value safe to use as a single path component.
///
/// Anything outside `[A-Za-z0-9._-]` becomes `_`, an empty value becomes the
/// syslog nil value, and a value made only of dots has them replaced so it
/// can never mean the current or parent directory.
pub fn sanitize_component(value: &str) -> String {
    if value.is_empty() {
        return NIL_VALUE.to_string();
    }
    if value.chars().all(|c| c == '.') {
        return "_".repeat(value.chars().count());
    }
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
