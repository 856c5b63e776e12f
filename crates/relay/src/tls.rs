// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TLS termination settings: certificate loading, cipher allowlist and
//! server cipher preference.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use rustls::crypto::ring;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ServerConfig, SupportedCipherSuite, SupportedProtocolVersion};

use crate::config::RelayConfig;

/// OpenSSL spellings of the suites rustls implements, mapped to the IANA
/// names rustls uses.
const OPENSSL_ALIASES: &[(&str, &str)] = &[
    ("ECDHE-ECDSA-AES128-GCM-SHA256", "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256"),
    ("ECDHE-RSA-AES128-GCM-SHA256", "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256"),
    ("ECDHE-ECDSA-AES256-GCM-SHA384", "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384"),
    ("ECDHE-RSA-AES256-GCM-SHA384", "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384"),
    ("ECDHE-ECDSA-CHACHA20-POLY1305", "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256"),
    ("ECDHE-RSA-CHACHA20-POLY1305", "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256"),
    ("TLS_AES_128_GCM_SHA256", "TLS13_AES_128_GCM_SHA256"),
    ("TLS_AES_256_GCM_SHA384", "TLS13_AES_256_GCM_SHA384"),
    ("TLS_CHACHA20_POLY1305_SHA256", "TLS13_CHACHA20_POLY1305_SHA256"),
];

/// Name rustls reports for a suite, e.g. `TLS13_AES_128_GCM_SHA256`.
fn suite_name(suite: &SupportedCipherSuite) -> String {
    format!("{:?}", suite.suite())
}

/// Resolve a `:`/`,` separated allowlist against `available`, keeping the
/// allowlist's order. Names rustls does not implement (RSA key exchange,
/// CBC modes) are skipped with a warning; an allowlist that resolves to
/// nothing is an error.
pub fn resolve_cipher_suites(
    allowlist: &str,
    available: &[SupportedCipherSuite],
) -> anyhow::Result<Vec<SupportedCipherSuite>> {
    let mut selected: Vec<SupportedCipherSuite> = Vec::new();

    for raw in allowlist.split([':', ',']).map(str::trim).filter(|s| !s.is_empty()) {
        let upper = raw.to_ascii_uppercase();
        let wanted = OPENSSL_ALIASES
            .iter()
            .find(|(alias, _)| *alias == upper)
            .map(|(_, iana)| (*iana).to_owned())
            .unwrap_or(upper);

        match available.iter().find(|s| suite_name(s) == wanted) {
            Some(suite) => {
                if !selected.iter().any(|s| s.suite() == suite.suite()) {
                    selected.push(*suite);
                }
            }
            None => tracing::warn!(cipher = raw, "cipher suite not supported, skipping"),
        }
    }

    anyhow::ensure!(!selected.is_empty(), "no supported cipher suites in allowlist: {allowlist}");
    Ok(selected)
}

/// Protocol versions that have at least one selected suite.
fn protocol_versions(suites: &[SupportedCipherSuite]) -> Vec<&'static SupportedProtocolVersion> {
    let mut versions = Vec::new();
    for candidate in [&rustls::version::TLS13, &rustls::version::TLS12] {
        if suites.iter().any(|s| s.version().version == candidate.version) {
            versions.push(candidate);
        }
    }
    versions
}

pub fn load_certs(path: &Path) -> anyhow::Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_file_iter(path)
        .with_context(|| format!("failed to open certificate {}", path.display()))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("failed to parse certificate {}", path.display()))?;
    anyhow::ensure!(!certs.is_empty(), "no certificates found in {}", path.display());
    Ok(certs)
}

pub fn load_key(path: &Path) -> anyhow::Result<PrivateKeyDer<'static>> {
    PrivateKeyDer::from_pem_file(path)
        .with_context(|| format!("failed to load private key {}", path.display()))
}

/// Build the rustls server configuration for `config`.
pub fn build_server_config(config: &RelayConfig) -> anyhow::Result<Arc<ServerConfig>> {
    let (Some(cert_path), Some(key_path)) = (&config.tls_cert, &config.tls_key) else {
        anyhow::bail!("TLS requires both a certificate and a key");
    };
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let mut provider = ring::default_provider();
    if let Some(ref allowlist) = config.tls_ciphers {
        provider.cipher_suites = resolve_cipher_suites(allowlist, &provider.cipher_suites)?;
    }
    let versions = protocol_versions(&provider.cipher_suites);
    let names: Vec<String> = provider.cipher_suites.iter().map(suite_name).collect();

    let mut server = ServerConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(&versions)
        .context("invalid TLS protocol configuration")?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("certificate and key do not form a usable pair")?;
    server.ignore_client_order = config.tls_honor_cipher_order;
    server.alpn_protocols = vec![b"http/1.1".to_vec()];

    tracing::info!(
        ciphers = %names.join(":"),
        honor_cipher_order = config.tls_honor_cipher_order,
        "TLS enabled"
    );
    Ok(Arc::new(server))
}

#[cfg(test)]
#[path = "tls_tests.rs"]
mod tests;
