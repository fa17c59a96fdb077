//! Forwards requested on the command line

use std::fmt;

use et_core::{ForwardSpec, ForwardSpecError, TunnelError};
use et_orchestrator::EcsTunnel;

/// One `-L` or `-H` argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardRequest {
    /// `-L LOCAL_PORT[:REMOTE_ADDR]:REMOTE_PORT`
    Local(ForwardSpec),
    /// `-H PORT`
    HttpProxy(u16),
}

impl fmt::Display for ForwardRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardRequest::Local(spec) => match &spec.remote_host {
                Some(host) => write!(f, "-L {}:{}:{}", spec.local_port, host, spec.remote_port),
                None => write!(f, "-L {}:{}", spec.local_port, spec.remote_port),
            },
            ForwardRequest::HttpProxy(port) => write!(f, "-H {}", port),
        }
    }
}

/// Parse every forward up front, so a typo fails before any API call.
///
/// Local forwards come first, in the order given, then proxies.
pub fn parse_forwards(
    locals: &[String],
    http_proxies: &[u16],
) -> Result<Vec<ForwardRequest>, ForwardSpecError> {
    let mut requests = Vec::with_capacity(locals.len() + http_proxies.len());
    for local in locals {
        requests.push(ForwardRequest::Local(local.parse()?));
    }
    requests.extend(http_proxies.iter().copied().map(ForwardRequest::HttpProxy));
    Ok(requests)
}

/// Open the tunnel for `request` and return the line announcing it
pub async fn establish(tunnel: &EcsTunnel, request: &ForwardRequest) -> Result<String, TunnelError> {
    match request {
        ForwardRequest::Local(spec) => {
            let local_port = match &spec.remote_host {
                Some(host) => {
                    tunnel
                        .remote_port_tunnel(spec.remote_port, host, Some(spec.local_port))
                        .await?
                }
                None => {
                    tunnel
                        .local_port_tunnel(spec.remote_port, Some(spec.local_port))
                        .await?
                }
            };
            Ok(tunnel_line(local_port, spec.remote_host.as_deref(), spec.remote_port))
        }
        ForwardRequest::HttpProxy(port) => {
            let local_port = tunnel.http_proxy_port_tunnel(None, Some(*port)).await?;
            Ok(proxy_line(local_port))
        }
    }
}

/// `Setup tunnel: ...` line for a direct or relayed forward
pub fn tunnel_line(local_port: u16, remote_host: Option<&str>, remote_port: u16) -> String {
    let remote = match remote_host {
        Some(host) => format!("{}:{}", host, remote_port),
        None => remote_port.to_string(),
    };
    format!(
        "Setup tunnel: 127.0.0.1:{0} (Possibly http://127.0.0.1:{0}) -> {1}",
        local_port, remote
    )
}

/// `Setup HTTP Proxy: ...` line
pub fn proxy_line(local_port: u16) -> String {
    format!("Setup HTTP Proxy: 127.0.0.1:{}", local_port)
}
