use crate::operation::{WorkContext, WorkError};
use crate::slot::SharedSlot;
use anyhow::anyhow;
use std::sync::Arc;
use tracing::{debug, info};

pub trait ProxyHandle: Send + Sync {
    fn host(&self) -> &str;
    fn port(&self) -> u16;
    /// Protocol versions the proxy answered to, e.g. `["V4", "V5"]`.
    fn versions_supported(&self) -> anyhow::Result<Vec<String>>;
}

pub trait ProxyFactory: Send + Sync {
    fn create_proxy(
        &self,
        host: &str,
        port: u16,
        user: &str,
        password: &str,
    ) -> anyhow::Result<Arc<dyn ProxyHandle>>;
}

pub type ProxySlot = SharedSlot<Arc<dyn ProxyHandle>>;

/// Why there is nothing to test. Turns the test action off; never raised at
/// invocation time.
#[derive(Debug, thiserror::Error)]
pub enum TestTargetUnavailable {
    #[error("proxy is not enabled")]
    Disabled,
    #[error("proxy host is empty")]
    MissingHost,
    #[error("proxy port '{0}' is invalid")]
    InvalidPort(String),
    #[error("proxy rejected: {0:#}")]
    Rejected(anyhow::Error),
}

pub fn resolve_test_target(
    factory: &dyn ProxyFactory,
    host: &str,
    port: &str,
    user: &str,
    password: &str,
) -> Result<Arc<dyn ProxyHandle>, TestTargetUnavailable> {
    let host = host.trim();
    if host.is_empty() {
        return Err(TestTargetUnavailable::MissingHost);
    }
    let port_text = port.trim();
    let port = port_text
        .parse::<u16>()
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| TestTargetUnavailable::InvalidPort(port_text.to_string()))?;
    factory
        .create_proxy(host, port, user.trim(), password.trim())
        .map_err(TestTargetUnavailable::Rejected)
}

pub fn format_versions(versions: &[String]) -> String {
    format!("Connection OK - supported version(s): {}", versions.join(", "))
}

/// Work for the connectivity test: reads the proxy currently in `slot` and
/// asks it which versions it speaks.
pub fn proxy_test_work(
    slot: ProxySlot,
) -> impl FnOnce(&WorkContext) -> Result<(), WorkError> + Send + 'static {
    move |ctx| {
        let proxy = slot
            .get()
            .ok_or_else(|| anyhow!("no proxy configured to test"))?;
        ctx.report(&format!(
            "Testing SOCKS connection to {}:{}",
            proxy.host(),
            proxy.port()
        ))?;
        let versions = match proxy.versions_supported() {
            Ok(versions) => versions,
            Err(err) => {
                debug!(host = proxy.host(), error = %err, "Proxy probe failed");
                let _ = ctx.sink().append_fragment("\n");
                return Err(err.into());
            }
        };
        ctx.checkpoint()?;
        info!(
            host = proxy.host(),
            port = proxy.port(),
            versions = ?versions,
            "Proxy test succeeded"
        );
        ctx.report(&format!("\n{}", format_versions(&versions)))?;
        Ok(())
    }
}
