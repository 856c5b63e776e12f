// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `relay` binary.

use std::io::Write;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use relay_specs::{free_port, RelayProcess};

const TIMEOUT: Duration = Duration::from_secs(10);

async fn next_text<S>(rx: &mut S) -> anyhow::Result<String>
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(TIMEOUT, rx.next())
            .await
            .map_err(|_| anyhow::anyhow!("ws recv timeout"))?
            .ok_or_else(|| anyhow::anyhow!("ws stream closed"))??;
        match msg {
            Message::Text(text) => return Ok(text.as_str().to_owned()),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => anyhow::bail!("expected Text message, got {other:?}"),
        }
    }
}

// -- HTTP ---------------------------------------------------------------------

#[tokio::test]
async fn http_health() -> anyhow::Result<()> {
    let relay = RelayProcess::start()?;
    relay.wait_healthy(TIMEOUT).await?;

    let resp: serde_json::Value =
        reqwest::get(format!("{}/health", relay.base_url())).await?.json().await?;

    assert_eq!(resp["status"], "ok");
    assert_eq!(resp["service"], "secure-websocket-server");
    assert_eq!(resp["clients"], 0);
    assert!(resp["timestamp"].is_string());
    Ok(())
}

#[tokio::test]
async fn http_trigger_requires_message() -> anyhow::Result<()> {
    let relay = RelayProcess::start()?;
    relay.wait_healthy(TIMEOUT).await?;

    let resp = reqwest::Client::new()
        .post(format!("{}/trigger", relay.base_url()))
        .json(&serde_json::json!({}))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 400);
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["status"], "error");
    Ok(())
}

// -- WebSocket ----------------------------------------------------------------

#[tokio::test]
async fn trigger_fans_out_to_websocket_clients() -> anyhow::Result<()> {
    let relay = RelayProcess::build().arg("--welcome", "false").spawn()?;
    relay.wait_healthy(TIMEOUT).await?;

    let (a, _) = tokio_tungstenite::connect_async(relay.ws_url()).await?;
    let (b, _) = tokio_tungstenite::connect_async(relay.ws_url()).await?;
    let (_a_tx, mut a_rx) = a.split();
    let (_b_tx, mut b_rx) = b.split();
    relay.wait_clients(2, TIMEOUT).await?;

    let body: serde_json::Value = reqwest::Client::new()
        .post(format!("{}/trigger", relay.base_url()))
        .json(&serde_json::json!({ "message": "smoke" }))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["status"], "success");
    assert_eq!(body["clientsCount"], 2);

    assert_eq!(next_text(&mut a_rx).await?, "smoke");
    assert_eq!(next_text(&mut b_rx).await?, "smoke");
    Ok(())
}

#[tokio::test]
async fn websocket_welcome_then_echo() -> anyhow::Result<()> {
    let relay = RelayProcess::build().arg("--echo-policy", "echo").spawn()?;
    relay.wait_healthy(TIMEOUT).await?;

    let (ws, _) = tokio_tungstenite::connect_async(relay.ws_url()).await?;
    let (mut tx, mut rx) = ws.split();

    let welcome: serde_json::Value = serde_json::from_str(&next_text(&mut rx).await?)?;
    assert_eq!(welcome["type"], "welcome");

    tx.send(Message::Text("ping-me".into())).await?;
    assert_eq!(next_text(&mut rx).await?, "Echo: ping-me");
    Ok(())
}

// -- Lifecycle ----------------------------------------------------------------

#[tokio::test]
async fn sigint_closes_clients_and_exits_cleanly() -> anyhow::Result<()> {
    let mut relay = RelayProcess::build().arg("--welcome", "false").spawn()?;
    relay.wait_healthy(TIMEOUT).await?;

    let (ws, _) = tokio_tungstenite::connect_async(relay.ws_url()).await?;
    let (_tx, mut rx) = ws.split();
    relay.wait_clients(1, TIMEOUT).await?;

    relay.interrupt()?;

    let msg = tokio::time::timeout(TIMEOUT, rx.next())
        .await
        .map_err(|_| anyhow::anyhow!("no close frame"))?
        .ok_or_else(|| anyhow::anyhow!("stream ended without close frame"))??;
    assert!(matches!(msg, Message::Close(_)), "expected Close frame, got {msg:?}");

    let status = relay.wait_exit(TIMEOUT).await?;
    assert!(status.success(), "exit status: {status:?}");
    Ok(())
}

#[tokio::test]
async fn missing_tls_certificate_fails_startup() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let key = dir.path().join("key.pem");
    std::fs::File::create(&key)?.write_all(b"not a key")?;

    let mut relay = RelayProcess::build()
        .arg("--tls-cert", &dir.path().join("missing.pem").to_string_lossy())
        .arg("--tls-key", &key.to_string_lossy())
        .spawn()?;

    let status = relay.wait_exit(TIMEOUT).await?;
    assert_eq!(status.code(), Some(1));
    Ok(())
}

#[tokio::test]
async fn port_in_use_fails_startup() -> anyhow::Result<()> {
    let port = free_port()?;
    let _holder = std::net::TcpListener::bind(("127.0.0.1", port))?;

    let mut relay = RelayProcess::build().port(port).spawn()?;
    let status = relay.wait_exit(TIMEOUT).await?;
    assert_eq!(status.code(), Some(1));
    Ok(())
}
