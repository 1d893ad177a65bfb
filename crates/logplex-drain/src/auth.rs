// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use subtle::ConstantTimeEq;

use crate::errors::DrainError;
use crate::headers::FrameHeaders;

/// Checks the frame's drain token against the configured one. With no token
/// configured every frame is accepted.
pub fn authenticate(headers: &FrameHeaders, expected_token: Option<&str>) -> Result<(), DrainError> {
    let Some(expected) = expected_token else {
        return Ok(());
    };
    if bool::from(expected.as_bytes().ct_eq(headers.drain_token.as_bytes())) {
        Ok(())
    } else {
        Err(DrainError::AuthenticationFailed)
    }
}
