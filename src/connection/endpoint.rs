//! Backend URL parsing.

use url::Url;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// One HTTP POST per call.
    Http,
    /// Persistent duplex socket.
    WebSocket,
}

/// Parsed backend URL.
#[derive(Debug, Clone)]
pub struct Endpoint {
    url: Url,
    pub transport: Transport,
    pub secure: bool,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parses a backend URL. Schemes other than `http(s)` and `ws(s)` yield
    /// [`Error::UnknownProtocol`].
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).map_err(|e| Error::connection(format!("invalid backend URL '{raw}': {e}")))?;

        let (transport, secure) = match url.scheme() {
            "http" => (Transport::Http, false),
            "https" => (Transport::Http, true),
            "ws" => (Transport::WebSocket, false),
            "wss" => (Transport::WebSocket, true),
            _ => return Err(Error::UnknownProtocol(raw.to_string())),
        };

        let host = url
            .host_str()
            .ok_or_else(|| Error::connection(format!("backend URL '{raw}' has no host")))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::connection(format!("backend URL '{raw}' has no port")))?;

        Ok(Self {
            url,
            transport,
            secure,
            host,
            port,
        })
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Value for the `Host` header.
    pub fn authority(&self) -> String {
        match self.url.port() {
            Some(port) => format!("{}:{}", self.url.host_str().unwrap_or(&self.host), port),
            None => self.url.host_str().unwrap_or(&self.host).to_string(),
        }
    }

    /// Origin-form request target: path plus query.
    pub fn target(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variants() {
        let https = Endpoint::parse("https://rpc.example.org/v1/key?x=1").unwrap();
        assert_eq!(https.transport, Transport::Http);
        assert!(https.secure);
        assert_eq!(https.port, 443);
        assert_eq!(https.authority(), "rpc.example.org");
        assert_eq!(https.target(), "/v1/key?x=1");

        let ws = Endpoint::parse("ws://127.0.0.1:8546").unwrap();
        assert_eq!(ws.transport, Transport::WebSocket);
        assert!(!ws.secure);
        assert_eq!(ws.authority(), "127.0.0.1:8546");
        assert_eq!(ws.target(), "/");

        let v6 = Endpoint::parse("http://[::1]:8545").unwrap();
        assert_eq!(v6.host, "::1");
    }

    #[test]
    fn test_unknown_protocol() {
        assert!(matches!(
            Endpoint::parse("ftp://example.com/rpc"),
            Err(Error::UnknownProtocol(url)) if url == "ftp://example.com/rpc"
        ));
    }
}
