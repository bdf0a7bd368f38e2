//! Client-side TLS over circuit streams.

use std::sync::{Arc, OnceLock};

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::circuit::CircuitStream;
use crate::error::{Error, Result};

static CLIENT_CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();

fn client_config() -> Result<Arc<ClientConfig>> {
    if let Some(config) = CLIENT_CONFIG.get() {
        return Ok(Arc::clone(config));
    }

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(Arc::clone(CLIENT_CONFIG.get_or_init(|| Arc::new(config))))
}

/// Wraps `stream` in TLS, verifying the server as `host`.
pub async fn connect(host: &str, stream: CircuitStream) -> Result<CircuitStream> {
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| Error::Tls(format!("invalid server name '{host}': {e}")))?;

    let connector = TlsConnector::from(client_config()?);
    let tls = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| Error::Tls(format!("handshake with {host} failed: {e}")))?;

    Ok(Box::new(tls))
}
