// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::registry::Registry;

/// Shared relay state.
pub struct RelayState {
    pub registry: Registry,
    pub config: RelayConfig,
    pub shutdown: CancellationToken,
}

impl RelayState {
    pub fn new(config: RelayConfig, shutdown: CancellationToken) -> Self {
        Self { registry: Registry::new(), config, shutdown }
    }
}

/// Current UTC time as ISO 8601 with millisecond precision
/// (e.g. `2026-01-02T03:04:05.678Z`).
pub fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
