// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use hyper::header::{self, HeaderMap, HeaderName};

use crate::errors::DrainError;

pub const LOGPLEX_CONTENT_TYPE: &str = "application/logplex-1";
pub const LOGPLEX_MSG_COUNT: &str = "logplex-msg-count";
pub const LOGPLEX_FRAME_ID: &str = "logplex-frame-id";
pub const LOGPLEX_DRAIN_TOKEN: &str = "logplex-drain-token";

/// Transport metadata Logplex sends alongside every frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameHeaders {
    pub content_type: String,
    /// Number of messages Logplex claims are in the body. Zero when the header
    /// is absent or not a number.
    pub msg_count: usize,
    /// Unique per request, only used to correlate log lines.
    pub frame_id: String,
    pub drain_token: String,
}

impl FrameHeaders {
    /// Reads the Logplex headers out of a request header map and checks the
    /// content type.
    ///
    /// Every value of a repeated header is looked at and the last usable one
    /// wins. Only the content type is enforced here; a bad message count
    /// becomes 0 and is caught later when the decoded batch is counted.
    pub fn parse(headers: &HeaderMap) -> Result<FrameHeaders, DrainError> {
        FrameHeaders::read(headers).validate()
    }

    /// Reads the headers without validating anything, for use in log lines
    /// about requests that may be rejected.
    pub fn read(headers: &HeaderMap) -> FrameHeaders {
        let msg_count = headers
            .get_all(LOGPLEX_MSG_COUNT)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.trim().parse::<usize>().ok())
            .last()
            .unwrap_or(0);
        FrameHeaders {
            content_type: last_value(headers, &header::CONTENT_TYPE).unwrap_or_default(),
            msg_count,
            frame_id: last_value(headers, &HeaderName::from_static(LOGPLEX_FRAME_ID))
                .unwrap_or_default(),
            drain_token: last_value(headers, &HeaderName::from_static(LOGPLEX_DRAIN_TOKEN))
                .unwrap_or_default(),
        }
    }

    pub fn validate(self) -> Result<FrameHeaders, DrainError> {
        if self.content_type != LOGPLEX_CONTENT_TYPE {
            return Err(DrainError::InvalidContentType(self.content_type));
        }
        Ok(self)
    }
}

fn last_value(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .last()
        .map(str::to_string)
}
