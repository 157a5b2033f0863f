use anyhow::{Context, bail};
use prefpane_core::proxy::{ProxyFactory, ProxyHandle};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const SOCKS5: u8 = 0x05;
const SOCKS4: u8 = 0x04;
const NO_AUTH: u8 = 0x00;
const USER_PASS: u8 = 0x02;
const NO_ACCEPTABLE: u8 = 0xFF;

#[derive(Clone, Debug)]
pub struct SocksProxyFactory {
    timeout: Duration,
}

impl Default for SocksProxyFactory {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SocksProxyFactory {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ProxyFactory for SocksProxyFactory {
    fn create_proxy(
        &self,
        host: &str,
        port: u16,
        user: &str,
        password: &str,
    ) -> anyhow::Result<Arc<dyn ProxyHandle>> {
        if host.trim().is_empty() {
            bail!("proxy host is empty");
        }
        if port == 0 {
            bail!("proxy port must be between 1 and 65535");
        }
        if user.len() > 255 || password.len() > 255 {
            bail!("proxy credentials longer than 255 bytes are not supported");
        }
        Ok(Arc::new(SocksProxy {
            host: host.trim().to_string(),
            port,
            user: user.to_string(),
            password: password.to_string(),
            timeout: self.timeout,
        }))
    }
}

/// A SOCKS server to probe. Nothing connects until
/// [`versions_supported`](ProxyHandle::versions_supported) is called.
pub struct SocksProxy {
    host: String,
    port: u16,
    user: String,
    password: String,
    timeout: Duration,
}

impl SocksProxy {
    fn connect(&self) -> anyhow::Result<TcpStream> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .with_context(|| format!("resolve {}:{}", self.host, self.port))?
            .collect();
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.timeout))?;
                    stream.set_write_timeout(Some(self.timeout))?;
                    return Ok(stream);
                }
                Err(err) => last_err = Some(err),
            }
        }
        match last_err {
            Some(err) => {
                Err(err).with_context(|| format!("connect to {}:{}", self.host, self.port))
            }
            None => bail!("{} did not resolve to any address", self.host),
        }
    }

    fn probe_v5(&self) -> anyhow::Result<()> {
        let mut stream = self.connect()?;
        let greeting: &[u8] = if self.user.is_empty() {
            &[SOCKS5, 1, NO_AUTH]
        } else {
            &[SOCKS5, 2, NO_AUTH, USER_PASS]
        };
        stream.write_all(greeting).context("send SOCKS5 greeting")?;
        let mut reply = [0u8; 2];
        stream.read_exact(&mut reply).context("read SOCKS5 method")?;
        if reply[0] != SOCKS5 {
            bail!("not a SOCKS5 server (version byte {})", reply[0]);
        }
        match reply[1] {
            NO_AUTH => Ok(()),
            USER_PASS => self.authenticate(&mut stream),
            NO_ACCEPTABLE => {
                bail!("SOCKS5 server accepts none of the offered authentication methods")
            }
            other => bail!("SOCKS5 server chose unsupported method {other}"),
        }
    }

    fn authenticate(&self, stream: &mut TcpStream) -> anyhow::Result<()> {
        let mut request = Vec::with_capacity(3 + self.user.len() + self.password.len());
        request.push(0x01);
        request.push(self.user.len() as u8);
        request.extend_from_slice(self.user.as_bytes());
        request.push(self.password.len() as u8);
        request.extend_from_slice(self.password.as_bytes());
        stream.write_all(&request).context("send SOCKS5 credentials")?;
        let mut reply = [0u8; 2];
        stream.read_exact(&mut reply).context("read SOCKS5 auth status")?;
        if reply[1] != 0 {
            bail!("SOCKS5 authentication failed");
        }
        Ok(())
    }

    fn probe_v4(&self) -> anyhow::Result<()> {
        let mut stream = self.connect()?;
        let mut request = vec![SOCKS4, 0x01, 0x00, 0x50, 127, 0, 0, 1];
        request.extend_from_slice(self.user.as_bytes());
        request.push(0);
        stream.write_all(&request).context("send SOCKS4 request")?;
        let mut reply = [0u8; 8];
        stream.read_exact(&mut reply).context("read SOCKS4 reply")?;
        if reply[0] != 0 || !(0x5A..=0x5D).contains(&reply[1]) {
            bail!("not a SOCKS4 server");
        }
        Ok(())
    }
}

impl ProxyHandle for SocksProxy {
    fn host(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn versions_supported(&self) -> anyhow::Result<Vec<String>> {
        let mut versions = Vec::new();
        let v4 = self.probe_v4();
        if v4.is_ok() {
            versions.push("V4".to_string());
        }
        let v5 = self.probe_v5();
        if v5.is_ok() {
            versions.push("V5".to_string());
        }
        debug!(host = %self.host, port = self.port, versions = ?versions, "SOCKS probe finished");
        match (versions.is_empty(), v5) {
            (false, _) => Ok(versions),
            (true, Err(err)) => Err(err),
            (true, Ok(())) => bail!("no SOCKS version answered"),
        }
    }
}
