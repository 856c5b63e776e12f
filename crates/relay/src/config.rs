// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What the relay does with a payload received from a connected client.
///
/// - `Log`: record it and do nothing else.
/// - `Echo`: send `Echo: <payload>` back to the sender only.
/// - `EchoBroadcast`: echo to the sender and fan the payload out to every
///   other open connection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EchoPolicy {
    Log,
    Echo,
    #[default]
    EchoBroadcast,
}

impl std::fmt::Display for EchoPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Log => f.write_str("log"),
            Self::Echo => f.write_str("echo"),
            Self::EchoBroadcast => f.write_str("echo-broadcast"),
        }
    }
}

/// Configuration for the relay server.
#[derive(Debug, Clone, clap::Args)]
pub struct RelayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "RELAY_HOST")]
    pub host: String,

    /// Port serving `/trigger`, `/health` and WebSocket upgrades.
    #[arg(long, default_value_t = 3000, env = "PORT")]
    pub port: u16,

    /// Optional dedicated WebSocket port. When set, WebSocket clients are
    /// also accepted on this port, which serves nothing else.
    #[arg(long, env = "WS_PORT")]
    pub ws_port: Option<u16>,

    /// PEM certificate chain. Enables TLS together with `--tls-key`.
    #[arg(long, env = "RELAY_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key for `--tls-cert`.
    #[arg(long, env = "RELAY_TLS_KEY")]
    pub tls_key: Option<PathBuf>,

    /// Cipher suite allowlist, `:` or `,` separated. OpenSSL or IANA names.
    #[arg(long, env = "RELAY_TLS_CIPHERS")]
    pub tls_ciphers: Option<String>,

    /// Let the server's cipher order win over the client's preference.
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        env = "RELAY_TLS_HONOR_CIPHER_ORDER"
    )]
    pub tls_honor_cipher_order: bool,

    /// Handling of payloads sent by connected clients.
    #[arg(long, value_enum, default_value_t = EchoPolicy::EchoBroadcast, env = "RELAY_ECHO_POLICY")]
    pub echo_policy: EchoPolicy,

    /// Send a JSON welcome frame when a client connects.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set, env = "RELAY_WELCOME")]
    pub welcome: bool,

    /// Text carried in the welcome frame.
    #[arg(
        long,
        default_value = "Connected to secure WebSocket server",
        env = "RELAY_WELCOME_MESSAGE"
    )]
    pub welcome_message: String,

    /// Service identifier reported by `/health`.
    #[arg(long, default_value = "secure-websocket-server", env = "RELAY_SERVICE_NAME")]
    pub service_name: String,

    /// How clients are named in `/trigger` responses.
    #[arg(long, default_value = "Roku clients", env = "RELAY_CLIENT_LABEL")]
    pub client_label: String,

    /// How long shutdown waits for clients to acknowledge the close.
    #[arg(long, default_value_t = 2000, env = "RELAY_SHUTDOWN_GRACE_MS")]
    pub shutdown_grace_ms: u64,
}

/// WebSocket relay: broadcasts HTTP-triggered messages to connected clients.
#[derive(Debug, clap::Parser)]
#[command(name = "relay", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub relay: RelayConfig,

    /// Log output format (text or json).
    #[arg(long, default_value = "text", env = "RELAY_LOG_FORMAT")]
    pub log_format: String,

    /// Log filter directive (e.g. `info`, `relay=debug`).
    #[arg(long, default_value = "info", env = "RELAY_LOG_LEVEL")]
    pub log_level: String,
}

impl Cli {
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.log_format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        self.relay.validate()
    }
}

impl RelayConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        match (&self.tls_cert, &self.tls_key) {
            (Some(_), None) => anyhow::bail!("--tls-cert requires --tls-key"),
            (None, Some(_)) => anyhow::bail!("--tls-key requires --tls-cert"),
            _ => {}
        }
        if self.tls_ciphers.is_some() && !self.tls_enabled() {
            anyhow::bail!("--tls-ciphers requires --tls-cert and --tls-key");
        }
        if self.ws_port == Some(self.port) && self.port != 0 {
            anyhow::bail!("--ws-port must differ from --port");
        }
        Ok(())
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls_cert.is_some() && self.tls_key.is_some()
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Scheme prefixes used in startup logs.
    pub fn schemes(&self) -> (&'static str, &'static str) {
        if self.tls_enabled() {
            ("https", "wss")
        } else {
            ("http", "ws")
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
