// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::DrainError;

/// Rejects a batch whose decoded length differs from the `Logplex-Msg-Count`
/// header, which catches truncated or duplicated frames. There is no
/// tolerance: the numbers must be equal.
pub fn reconcile_count(declared: usize, decoded: usize) -> Result<(), DrainError> {
    if declared == decoded {
        Ok(())
    } else {
        Err(DrainError::CountMismatch { declared, decoded })
    }
}
