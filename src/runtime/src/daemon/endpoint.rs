//! Daemon endpoint addressing and HTTP transport.
//!
//! The daemon speaks HTTP/1.1 over a Unix socket, a TCP socket or a Windows
//! named pipe. Each request gets its own connection.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use hyper::client::conn;
use hyper::{Body, Request, Response};
use kpm_core::error::{KpmError, Result};
use tokio::io::{AsyncRead, AsyncWrite};

/// Where the image daemon listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonEndpoint {
    /// `unix:///var/run/docker.sock`
    Unix(PathBuf),
    /// `tcp://host:port`
    Tcp(String),
    /// `npipe:////./pipe/docker_engine`
    NamedPipe(String),
}

impl FromStr for DaemonEndpoint {
    type Err = KpmError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(unsupported(s));
            }
            return Ok(DaemonEndpoint::Unix(PathBuf::from(path)));
        }
        if let Some(addr) = s
            .strip_prefix("tcp://")
            .or_else(|| s.strip_prefix("http://"))
        {
            let addr = addr.trim_end_matches('/');
            if addr.is_empty() {
                return Err(unsupported(s));
            }
            let addr = if addr.contains(':') {
                addr.to_string()
            } else {
                format!("{}:2375", addr)
            };
            return Ok(DaemonEndpoint::Tcp(addr));
        }
        if let Some(pipe) = s.strip_prefix("npipe://") {
            if pipe.is_empty() {
                return Err(unsupported(s));
            }
            return Ok(DaemonEndpoint::NamedPipe(pipe.replace('/', "\\")));
        }
        Err(unsupported(s))
    }
}

impl fmt::Display for DaemonEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonEndpoint::Unix(path) => write!(f, "unix://{}", path.display()),
            DaemonEndpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
            DaemonEndpoint::NamedPipe(pipe) => write!(f, "npipe://{}", pipe.replace('\\', "/")),
        }
    }
}

fn unsupported(s: &str) -> KpmError {
    KpmError::DaemonError(format!("unsupported daemon host '{}'", s))
}

/// Map a transport-level failure to a daemon error.
pub(crate) fn transport_error(e: impl fmt::Display) -> KpmError {
    KpmError::DaemonError(format!("daemon transport failed: {}", e))
}

impl DaemonEndpoint {
    /// Open a connection and send one request.
    pub async fn send(&self, request: Request<Body>) -> Result<Response<Body>> {
        match self {
            #[cfg(unix)]
            DaemonEndpoint::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path).await.map_err(|e| {
                    KpmError::DaemonError(format!(
                        "cannot connect to daemon at {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                send_over(stream, request).await
            }
            #[cfg(not(unix))]
            DaemonEndpoint::Unix(path) => Err(KpmError::DaemonError(format!(
                "unix sockets are not available on this platform: {}",
                path.display()
            ))),
            DaemonEndpoint::Tcp(addr) => {
                let stream = tokio::net::TcpStream::connect(addr.as_str())
                    .await
                    .map_err(|e| {
                        KpmError::DaemonError(format!(
                            "cannot connect to daemon at {}: {}",
                            addr, e
                        ))
                    })?;
                send_over(stream, request).await
            }
            #[cfg(windows)]
            DaemonEndpoint::NamedPipe(pipe) => {
                let client = tokio::net::windows::named_pipe::ClientOptions::new()
                    .open(pipe)
                    .map_err(|e| {
                        KpmError::DaemonError(format!(
                            "cannot connect to daemon at {}: {}",
                            pipe, e
                        ))
                    })?;
                send_over(client, request).await
            }
            #[cfg(not(windows))]
            DaemonEndpoint::NamedPipe(pipe) => Err(KpmError::DaemonError(format!(
                "named pipes are not available on this platform: {}",
                pipe
            ))),
        }
    }
}

async fn send_over<T>(io: T, request: Request<Body>) -> Result<Response<Body>>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, connection) = conn::handshake(io).await.map_err(transport_error)?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!(error = %e, "Daemon connection ended with error");
        }
    });
    sender.send_request(request).await.map_err(transport_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unix() {
        let ep: DaemonEndpoint = "unix:///var/run/docker.sock".parse().unwrap();
        assert_eq!(ep, DaemonEndpoint::Unix(PathBuf::from("/var/run/docker.sock")));
        assert_eq!(ep.to_string(), "unix:///var/run/docker.sock");
    }

    #[test]
    fn test_parse_tcp() {
        let ep: DaemonEndpoint = "tcp://127.0.0.1:2376".parse().unwrap();
        assert_eq!(ep, DaemonEndpoint::Tcp("127.0.0.1:2376".to_string()));

        let ep: DaemonEndpoint = "tcp://docker.local".parse().unwrap();
        assert_eq!(ep, DaemonEndpoint::Tcp("docker.local:2375".to_string()));
    }

    #[test]
    fn test_parse_npipe() {
        let ep: DaemonEndpoint = "npipe:////./pipe/docker_engine".parse().unwrap();
        assert_eq!(
            ep,
            DaemonEndpoint::NamedPipe(r"\\.\pipe\docker_engine".to_string())
        );
        assert_eq!(ep.to_string(), "npipe:////./pipe/docker_engine");
    }

    #[test]
    fn test_parse_unsupported() {
        for s in ["ssh://host", "unix://", "tcp://", "/var/run/docker.sock"] {
            assert!(
                matches!(s.parse::<DaemonEndpoint>(), Err(KpmError::DaemonError(_))),
                "{s} should be rejected"
            );
        }
    }

    #[test]
    fn test_default_host_parses() {
        assert!(kpm_core::DEFAULT_DOCKER_HOST.parse::<DaemonEndpoint>().is_ok());
    }

    #[tokio::test]
    async fn test_connect_refused_is_daemon_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let ep = DaemonEndpoint::Tcp(addr.to_string());
        let req = Request::builder()
            .uri("/_ping")
            .body(Body::empty())
            .unwrap();
        let err = ep.send(req).await.unwrap_err();
        assert!(matches!(err, KpmError::DaemonError(_)));
    }
}
