// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relay: broadcasts HTTP-triggered messages to connected WebSocket clients.

pub mod config;
pub mod error;
pub mod registry;
pub mod state;
pub mod tls;
pub mod transport;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::RelayConfig;
use crate::state::RelayState;
use crate::transport::{build_router, build_ws_router};

/// Run the relay until SIGINT/SIGTERM.
pub async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let server = RelayServer::bind(config, shutdown.clone()).await?;
    spawn_signal_handler(shutdown);
    server.serve().await
}

/// A relay with its listeners bound but not yet serving.
pub struct RelayServer {
    state: Arc<RelayState>,
    listener: TcpListener,
    ws_listener: Option<TcpListener>,
    tls: Option<TlsAcceptor>,
}

impl RelayServer {
    /// Load TLS material and bind every listener. Any failure here is fatal:
    /// the relay never starts serving half-configured.
    pub async fn bind(config: RelayConfig, shutdown: CancellationToken) -> anyhow::Result<Self> {
        let tls = if config.tls_enabled() {
            Some(TlsAcceptor::from(tls::build_server_config(&config)?))
        } else {
            None
        };

        let addr = format!("{}:{}", config.host, config.port);
        let listener =
            TcpListener::bind(&addr).await.with_context(|| format!("failed to bind {addr}"))?;

        let ws_listener = match config.ws_port {
            Some(port) => {
                let ws_addr = format!("{}:{}", config.host, port);
                let l = TcpListener::bind(&ws_addr)
                    .await
                    .with_context(|| format!("failed to bind {ws_addr}"))?;
                Some(l)
            }
            None => None,
        };

        let state = Arc::new(RelayState::new(config, shutdown));
        Ok(Self { state, listener, ws_listener, tls })
    }

    pub fn state(&self) -> &Arc<RelayState> {
        &self.state
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn ws_local_addr(&self) -> anyhow::Result<Option<SocketAddr>> {
        match self.ws_listener {
            Some(ref l) => Ok(Some(l.local_addr()?)),
            None => Ok(None),
        }
    }

    /// Serve until the shutdown token is cancelled, then close every client
    /// connection and stop the listeners.
    pub async fn serve(self) -> anyhow::Result<()> {
        let addr = self.local_addr()?;
        let ws_addr = self.ws_local_addr()?;
        let config = &self.state.config;
        let (http_scheme, ws_scheme) = config.schemes();
        let shutdown = self.state.shutdown.clone();

        info!("relay listening on {http_scheme}://{addr}");
        info!("  trigger: POST {http_scheme}://{addr}/trigger");
        info!("  health:  GET {http_scheme}://{addr}/health");
        match ws_addr {
            Some(ws_addr) => info!("  websocket: {ws_scheme}://{ws_addr} (also {ws_scheme}://{addr})"),
            None => info!("  websocket: {ws_scheme}://{addr}"),
        }
        info!(echo_policy = %config.echo_policy, welcome = config.welcome, "relay ready");

        // Listeners outlive the client sweep; they stop once it is done.
        let stop = CancellationToken::new();
        let mut tasks = vec![spawn_listener(
            "http",
            self.listener,
            build_router(Arc::clone(&self.state)),
            self.tls.clone(),
            stop.clone(),
            shutdown.clone(),
        )];
        if let Some(ws_listener) = self.ws_listener {
            tasks.push(spawn_listener(
                "websocket",
                ws_listener,
                build_ws_router(Arc::clone(&self.state)),
                self.tls.clone(),
                stop.clone(),
                shutdown.clone(),
            ));
        }

        shutdown.cancelled().await;
        close_connections(&self.state).await;
        stop.cancel();

        for task in tasks {
            let _ = task.await;
        }
        info!("relay stopped");
        Ok(())
    }
}

/// Close every client with a WebSocket close frame and wait for the
/// connection tasks to unregister.
async fn close_connections(state: &RelayState) {
    let asked = state.registry.close_all().await;
    info!(clients = asked, "shutting down, closing client connections");
    if !state.registry.wait_empty(state.config.shutdown_grace()).await {
        tracing::warn!(
            remaining = state.registry.size(),
            "clients did not close within the grace period"
        );
    }
}

/// Serve `router` on `listener` until `stop`, over TLS when an acceptor is
/// given. A serve failure cancels `shutdown` so the process exits.
fn spawn_listener(
    name: &'static str,
    listener: TcpListener,
    router: Router,
    tls: Option<TlsAcceptor>,
    stop: CancellationToken,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match tls {
            Some(acceptor) => serve_tls(listener, router, acceptor, stop).await,
            None => {
                let result = axum::serve(listener, router)
                    .with_graceful_shutdown(stop.cancelled_owned())
                    .await;
                if let Err(e) = result {
                    error!("{name} server error: {e}");
                    shutdown.cancel();
                }
            }
        }
    })
}

/// Accept loop for TLS connections.
async fn serve_tls(
    listener: TcpListener,
    router: Router,
    acceptor: TlsAcceptor,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            accept = listener.accept() => {
                match accept {
                    Ok((stream, peer)) => {
                        let acceptor = acceptor.clone();
                        let router = router.clone();
                        tokio::spawn(async move {
                            let stream = match acceptor.accept(stream).await {
                                Ok(s) => s,
                                Err(e) => {
                                    tracing::debug!(%peer, err = %e, "TLS handshake failed");
                                    return;
                                }
                            };
                            let io = TokioIo::new(stream);
                            let svc = TowerToHyperService::new(router);
                            let result = auto::Builder::new(TokioExecutor::new())
                                .serve_connection_with_upgrades(io, svc)
                                .await;
                            if let Err(e) = result {
                                tracing::debug!(%peer, err = %e, "TLS connection error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::debug!("tls accept error: {e}");
                    }
                }
            }
        }
    }
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM");
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT");
            }
        }
        shutdown.cancel();
    });
}
