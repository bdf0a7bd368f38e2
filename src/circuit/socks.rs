//! SOCKS5 circuit with per-circuit stream isolation.
//!
//! Each circuit authenticates with its own username/password pair. Proxies
//! that isolate streams by SOCKS credentials (Tor's `IsolateSOCKSAuth`, on
//! by default) route every circuit over a distinct path.
//!
//! # Protocol
//!
//! ```text
//! client                         proxy
//!   │── 05 01 02 ──────────────────►│  greeting, username/password only
//!   │◄───────────────────── 05 02 ──│
//!   │── 01 ulen user plen pass ────►│  RFC 1929 subnegotiation
//!   │◄───────────────────── 01 00 ──│
//!   │── 05 01 00 atyp addr port ───►│  CONNECT
//!   │◄──────── 05 00 00 atyp bnd ───│
//! ```

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::circuit::{Circuit, CircuitId, CircuitStream};
use crate::error::{Error, Result};

const SOCKS5_VERSION: u8 = 0x05;
const AUTH_VERSION: u8 = 0x01;

const AUTH_NO_AUTH: u8 = 0x00;
const AUTH_USERNAME_PASSWORD: u8 = 0x02;
const AUTH_NO_ACCEPTABLE: u8 = 0xFF;

const CMD_CONNECT: u8 = 0x01;

const ADDR_IPV4: u8 = 0x01;
const ADDR_DOMAIN: u8 = 0x03;
const ADDR_IPV6: u8 = 0x04;

const REPLY_SUCCESS: u8 = 0x00;

/// Circuit routed through a SOCKS5 proxy under its own credentials.
#[derive(Debug)]
pub struct Socks5Circuit {
    id: CircuitId,
    proxy: SocketAddr,
    username: String,
    password: String,
    timeout: Duration,
    closed: CancellationToken,
}

impl Socks5Circuit {
    /// Creates a circuit after checking that the proxy accepts our
    /// authentication method.
    pub async fn connect(proxy: SocketAddr, isolation: impl Into<String>, timeout: Duration) -> Result<Self> {
        let isolation = isolation.into();
        let circuit = Self {
            id: CircuitId::new(),
            proxy,
            password: isolation.clone(),
            username: isolation,
            timeout,
            closed: CancellationToken::new(),
        };

        let probe = async {
            let mut stream = circuit.dial().await?;
            circuit.greet(&mut stream).await
        };
        tokio::time::timeout(timeout, probe)
            .await
            .map_err(|_| Error::timeout(timeout))??;
        debug!(circuit = %circuit.id, proxy = %proxy, "SOCKS5 circuit ready");

        Ok(circuit)
    }

    /// Credentials presented to the proxy.
    pub fn isolation(&self) -> &str {
        &self.username
    }

    pub fn close(&self) {
        self.closed.cancel();
    }

    async fn dial(&self) -> Result<TcpStream> {
        let connect = TcpStream::connect(self.proxy);
        match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                Ok(stream)
            }
            Ok(Err(e)) => {
                // Proxy gone: nothing opened through this circuit will work.
                self.fail(&format!("proxy {} unreachable: {e}", self.proxy));
                Err(Error::Socks(format!("proxy {} unreachable: {e}", self.proxy)))
            }
            Err(_) => Err(Error::timeout(self.timeout)),
        }
    }

    async fn greet(&self, stream: &mut TcpStream) -> Result<()> {
        stream
            .write_all(&[SOCKS5_VERSION, 0x01, AUTH_USERNAME_PASSWORD])
            .await?;

        let mut reply = [0u8; 2];
        stream.read_exact(&mut reply).await?;
        if reply[0] != SOCKS5_VERSION {
            self.fail("proxy does not speak SOCKS5");
            return Err(Error::Socks(format!("unexpected version {:#04x}", reply[0])));
        }

        match reply[1] {
            AUTH_USERNAME_PASSWORD => self.authenticate(stream).await,
            AUTH_NO_AUTH => Ok(()),
            AUTH_NO_ACCEPTABLE => {
                self.fail("proxy rejected username/password authentication");
                Err(Error::Socks("no acceptable authentication method".into()))
            }
            other => Err(Error::Socks(format!("unsupported method {other:#04x}"))),
        }
    }

    async fn authenticate(&self, stream: &mut TcpStream) -> Result<()> {
        let user = self.username.as_bytes();
        let pass = self.password.as_bytes();
        if user.len() > 255 || pass.len() > 255 {
            return Err(Error::Socks("credentials longer than 255 bytes".into()));
        }

        let mut request = Vec::with_capacity(3 + user.len() + pass.len());
        request.push(AUTH_VERSION);
        request.push(user.len() as u8);
        request.extend_from_slice(user);
        request.push(pass.len() as u8);
        request.extend_from_slice(pass);
        stream.write_all(&request).await?;

        let mut reply = [0u8; 2];
        stream.read_exact(&mut reply).await?;
        if reply[1] != REPLY_SUCCESS {
            return Err(Error::Socks(format!("authentication failed ({:#04x})", reply[1])));
        }
        Ok(())
    }

    async fn request_connect(&self, stream: &mut TcpStream, host: &str, port: u16) -> Result<()> {
        let mut request = vec![SOCKS5_VERSION, CMD_CONNECT, 0x00];
        match host.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) => {
                request.push(ADDR_IPV4);
                request.extend_from_slice(&ip.octets());
            }
            Ok(IpAddr::V6(ip)) => {
                request.push(ADDR_IPV6);
                request.extend_from_slice(&ip.octets());
            }
            Err(_) => {
                if host.len() > 255 {
                    return Err(Error::Socks(format!("hostname too long: {host}")));
                }
                request.push(ADDR_DOMAIN);
                request.push(host.len() as u8);
                request.extend_from_slice(host.as_bytes());
            }
        }
        request.extend_from_slice(&port.to_be_bytes());
        stream.write_all(&request).await?;

        let mut header = [0u8; 4];
        stream.read_exact(&mut header).await?;
        if header[0] != SOCKS5_VERSION {
            self.fail("malformed CONNECT reply");
            return Err(Error::Socks(format!("unexpected version {:#04x}", header[0])));
        }
        if header[1] != REPLY_SUCCESS {
            return Err(Error::Socks(format!(
                "CONNECT {host}:{port} failed: {}",
                reply_message(header[1])
            )));
        }

        // Skip the bound address.
        let remaining = match header[3] {
            ADDR_IPV4 => 4 + 2,
            ADDR_IPV6 => 16 + 2,
            ADDR_DOMAIN => {
                let mut len = [0u8; 1];
                stream.read_exact(&mut len).await?;
                len[0] as usize + 2
            }
            other => {
                self.fail("malformed CONNECT reply");
                return Err(Error::Socks(format!("unknown address type {other:#04x}")));
            }
        };
        let mut bound = vec![0u8; remaining];
        stream.read_exact(&mut bound).await?;
        Ok(())
    }

    fn fail(&self, reason: &str) {
        if !self.closed.is_cancelled() {
            warn!(circuit = %self.id, proxy = %self.proxy, reason, "Circuit closed");
            self.closed.cancel();
        }
    }
}

#[async_trait]
impl Circuit for Socks5Circuit {
    fn id(&self) -> CircuitId {
        self.id
    }

    async fn open(&self, host: &str, port: u16) -> Result<CircuitStream> {
        if self.closed.is_cancelled() {
            return Err(Error::connection(format!("{} is closed", self.id)));
        }

        let handshake = async {
            let mut stream = self.dial().await?;
            self.greet(&mut stream).await?;
            self.request_connect(&mut stream, host, port).await?;
            Ok::<_, Error>(stream)
        };
        let stream = tokio::time::timeout(self.timeout, handshake)
            .await
            .map_err(|_| Error::timeout(self.timeout))??;

        debug!(circuit = %self.id, host, port, "Stream opened");
        Ok(Box::new(stream))
    }

    fn closed(&self) -> BoxFuture<'static, ()> {
        self.closed.clone().cancelled_owned().boxed()
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

fn reply_message(code: u8) -> &'static str {
    match code {
        0x01 => "general failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown error",
    }
}
