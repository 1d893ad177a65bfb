// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod auth;
pub mod config;
pub mod decoder;
pub mod drain_server;
pub mod errors;
pub mod headers;
pub mod http_utils;
pub mod log_writer;
pub mod message;
pub mod reconcile;
pub mod router;
pub mod tls;
