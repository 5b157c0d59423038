//! Image daemon client.
//!
//! Every call runs inside the client's cancellation scope and walks an
//! [`Operation`] through its states while progress frames are rendered to the
//! caller's [`ProgressSink`].

use std::future::Future;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hyper::body::HttpBody;
use hyper::header::{CONTENT_TYPE, HOST};
use hyper::{Body, Method, Request, Response, StatusCode};
use kpm_core::error::{KpmError, Result};
use kpm_core::KpmConfig;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::endpoint::{transport_error, DaemonEndpoint};
use super::progress::{FrameDecoder, JsonMessage, ProgressSink};
use super::state::{Operation, OperationKind};
use super::version::{negotiate, ApiVersion, DaemonVersion};
use crate::oci::credentials::EncodedAuth;
use crate::oci::reference::ImageTag;

const REGISTRY_AUTH_HEADER: &str = "X-Registry-Auth";

/// Upper bound on removing the extract container.
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of removing a local image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Untagged(String),
    Deleted(String),
}

impl std::fmt::Display for DeleteOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeleteOutcome::Untagged(r) => write!(f, "Untagged: {}", r),
            DeleteOutcome::Deleted(r) => write!(f, "Deleted: {}", r),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeleteItem {
    #[serde(rename = "Untagged", default)]
    untagged: Option<String>,
    #[serde(rename = "Deleted", default)]
    deleted: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedContainer {
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorReply {
    message: String,
}

/// Client bound to one daemon and one negotiated API version.
///
/// Dropping the client cancels its scope.
#[derive(Debug)]
pub struct DaemonClient {
    endpoint: DaemonEndpoint,
    api_version: ApiVersion,
    registry: String,
    scope: CancellationToken,
    cleanup_timeout: Duration,
}

/// Open a client for the configured daemon and registry.
///
/// The returned token is the parent scope: cancelling it aborts whatever the
/// client is doing.
pub async fn open_client(config: &KpmConfig) -> Result<(CancellationToken, DaemonClient)> {
    let endpoint: DaemonEndpoint = config.docker_host.parse()?;
    let ctx = CancellationToken::new();
    let client = DaemonClient::connect(endpoint, config.registry.clone(), ctx.child_token()).await?;
    Ok((ctx, client))
}

impl DaemonClient {
    /// Negotiate the API version with the daemon at `endpoint`.
    pub async fn connect(
        endpoint: DaemonEndpoint,
        registry: impl Into<String>,
        scope: CancellationToken,
    ) -> Result<Self> {
        let request = Request::builder()
            .method(Method::GET)
            .uri("/version")
            .header(HOST, host_header(&endpoint))
            .body(Body::empty())
            .map_err(transport_error)?;

        let exchange = async {
            let response = check_status(endpoint.send(request).await?).await?;
            let body = hyper::body::to_bytes(response.into_body())
                .await
                .map_err(transport_error)?;
            let version: DaemonVersion = serde_json::from_slice(&body)
                .map_err(|e| KpmError::DaemonError(format!("invalid version reply: {}", e)))?;
            Ok::<_, KpmError>(version)
        };
        let version = tokio::select! {
            biased;
            _ = scope.cancelled() => return Err(KpmError::Cancelled),
            r = exchange => r?,
        };

        let api_version = negotiate(&version)?;
        tracing::info!(
            endpoint = %endpoint,
            daemon = version.version.as_deref().unwrap_or("unknown"),
            api = %api_version,
            "Connected to image daemon"
        );

        Ok(Self {
            endpoint,
            api_version,
            registry: registry.into(),
            scope,
            cleanup_timeout: DEFAULT_CLEANUP_TIMEOUT,
        })
    }

    /// Limit how long extract waits for its container to be removed.
    pub fn with_cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = timeout;
        self
    }

    pub fn api_version(&self) -> ApiVersion {
        self.api_version
    }

    /// Registry URL credentials are resolved for.
    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn endpoint(&self) -> &DaemonEndpoint {
        &self.endpoint
    }

    /// Token that cancels this client's in-flight calls.
    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }

    /// Build and tag an image from a tar build context.
    pub async fn build(
        &self,
        tag: &ImageTag,
        context: Cursor<Vec<u8>>,
        sink: &mut ProgressSink,
    ) -> Result<()> {
        let tag_str = tag.to_string();
        tracing::info!(tag = %tag_str, bytes = context.get_ref().len(), "Building image");

        let uri = self.uri(
            "/build",
            &[
                ("t", tag_str.as_str()),
                ("forcerm", "1"),
                ("rm", "1"),
                ("pull", "1"),
                ("q", "0"),
            ],
        );
        let request = self
            .request(Method::POST, &uri)
            .header(CONTENT_TYPE, "application/x-tar")
            .body(Body::from(context.into_inner()))
            .map_err(transport_error)?;

        self.run_streaming(OperationKind::Build, request, sink).await
    }

    /// Push `tag` to its registry.
    pub async fn push(
        &self,
        tag: &ImageTag,
        auth: &EncodedAuth,
        sink: &mut ProgressSink,
    ) -> Result<()> {
        tracing::info!(tag = %tag, "Pushing image");
        let uri = self.uri(
            &format!("/images/{}/push", tag.image_name()),
            &[("tag", tag.version())],
        );
        let request = self
            .request(Method::POST, &uri)
            .header(REGISTRY_AUTH_HEADER, auth.as_str())
            .body(Body::empty())
            .map_err(transport_error)?;

        self.run_streaming(OperationKind::Push, request, sink).await
    }

    /// Pull `tag` from its registry, anonymously when `auth` is None.
    pub async fn pull(
        &self,
        tag: &ImageTag,
        auth: Option<&EncodedAuth>,
        sink: &mut ProgressSink,
    ) -> Result<()> {
        tracing::info!(tag = %tag, authenticated = auth.is_some(), "Pulling image");
        let image_name = tag.image_name();
        let uri = self.uri(
            "/images/create",
            &[("fromImage", image_name.as_str()), ("tag", tag.version())],
        );
        let mut builder = self.request(Method::POST, &uri);
        if let Some(auth) = auth {
            builder = builder.header(REGISTRY_AUTH_HEADER, auth.as_str());
        }
        let request = builder.body(Body::empty()).map_err(transport_error)?;

        self.run_streaming(OperationKind::Pull, request, sink).await
    }

    /// Remove the local image `tag`, reporting every untag and delete.
    pub async fn delete(
        &self,
        tag: &ImageTag,
        sink: &mut ProgressSink,
    ) -> Result<Vec<DeleteOutcome>> {
        tracing::info!(tag = %tag, "Removing image");
        let uri = self.uri(
            &format!("/images/{}", tag),
            &[("force", "1"), ("noprune", "0")],
        );
        let request = self
            .request(Method::DELETE, &uri)
            .body(Body::empty())
            .map_err(transport_error)?;

        let mut op = Operation::new(OperationKind::Delete);
        let result = self
            .cancellable(async {
                op.begin()?;
                let response = check_status(self.endpoint.send(request).await?).await?;
                op.acknowledged()?;

                let body = hyper::body::to_bytes(response.into_body())
                    .await
                    .map_err(transport_error)?;
                let items: Vec<DeleteItem> = serde_json::from_slice(&body)
                    .map_err(|e| KpmError::DaemonError(format!("invalid delete reply: {}", e)))?;

                let mut outcomes = Vec::with_capacity(items.len());
                for item in items {
                    let outcome = match (item.untagged, item.deleted) {
                        (Some(r), _) => DeleteOutcome::Untagged(r),
                        (None, Some(r)) => DeleteOutcome::Deleted(r),
                        (None, None) => continue,
                    };
                    op.frame_received()?;
                    sink.line(&outcome.to_string())?;
                    outcomes.push(outcome);
                }
                op.finish()?;
                Ok(outcomes)
            })
            .await;
        result.map_err(|e| op.fail(e))
    }

    /// Copy `path_in_image` out of `tag` into `dest`.
    ///
    /// A stopped container is created from the image, the path is downloaded
    /// through the archive endpoint and unpacked, and the container is removed
    /// whether or not the copy succeeded.
    pub async fn extract(
        &self,
        tag: &ImageTag,
        path_in_image: &str,
        dest: &Path,
        sink: &mut ProgressSink,
    ) -> Result<PathBuf> {
        tracing::info!(tag = %tag, path = %path_in_image, dest = %dest.display(), "Extracting from image");

        let mut op = Operation::new(OperationKind::Extract);
        let created = self
            .cancellable(async {
                op.begin()?;
                self.create_container(tag).await
            })
            .await;
        let id = created.map_err(|e| op.fail(e))?;

        let copied = self
            .cancellable(self.copy_out(&mut op, &id, path_in_image, dest, sink))
            .await;

        // Removal runs outside the scope so a cancelled copy still cleans up,
        // but a hung daemon cannot hold extract forever.
        let removed = match tokio::time::timeout(self.cleanup_timeout, self.remove_container(&id))
            .await
        {
            Ok(removed) => removed,
            Err(_) => Err(KpmError::DaemonError(format!(
                "timed out removing container {} after {:?}",
                id, self.cleanup_timeout
            ))),
        };

        match (copied, removed) {
            (Ok(path), Ok(())) => {
                op.finish()?;
                Ok(path)
            }
            (Ok(_), Err(e)) => Err(op.fail(e)),
            (Err(e), removed) => {
                if let Err(cleanup) = removed {
                    tracing::warn!(container = %id, error = %cleanup, "Failed to remove container");
                }
                Err(op.fail(e))
            }
        }
    }

    async fn create_container(&self, tag: &ImageTag) -> Result<String> {
        // The container is never started; Cmd only satisfies images without one.
        let spec = serde_json::json!({
            "Image": tag.to_string(),
            "Cmd": ["/"],
        });
        let request = self
            .request(Method::POST, &self.uri("/containers/create", &[]))
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&spec)?))
            .map_err(transport_error)?;

        let response = check_status(self.endpoint.send(request).await?).await?;
        let body = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(transport_error)?;
        let created: CreatedContainer = serde_json::from_slice(&body)
            .map_err(|e| KpmError::DaemonError(format!("invalid create reply: {}", e)))?;
        tracing::debug!(container = %created.id, "Created container");
        Ok(created.id)
    }

    async fn copy_out(
        &self,
        op: &mut Operation,
        id: &str,
        path_in_image: &str,
        dest: &Path,
        sink: &mut ProgressSink,
    ) -> Result<PathBuf> {
        let uri = self.uri(
            &format!("/containers/{}/archive", id),
            &[("path", path_in_image)],
        );
        let request = self
            .request(Method::GET, &uri)
            .body(Body::empty())
            .map_err(transport_error)?;

        let response = check_status(self.endpoint.send(request).await?).await?;
        op.acknowledged()?;
        let body = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(transport_error)?;
        op.frame_received()?;

        let dest = dest.to_path_buf();
        let target = dest.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            std::fs::create_dir_all(&target)?;
            tar::Archive::new(Cursor::new(body)).unpack(&target)?;
            Ok(())
        })
        .await
        .map_err(|e| KpmError::DaemonError(format!("extract task failed: {}", e)))??;

        let name = path_in_image.trim_start_matches('/');
        let extracted = dest.join(name);
        sink.line(&format!("Extracted {} to {}", path_in_image, extracted.display()))?;
        Ok(extracted)
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let uri = self.uri(&format!("/containers/{}", id), &[("force", "1")]);
        let request = self
            .request(Method::DELETE, &uri)
            .body(Body::empty())
            .map_err(transport_error)?;
        check_status(self.endpoint.send(request).await?).await?;
        tracing::debug!(container = %id, "Removed container");
        Ok(())
    }

    /// Send a request whose reply is a progress frame stream.
    async fn run_streaming(
        &self,
        kind: OperationKind,
        request: Request<Body>,
        sink: &mut ProgressSink,
    ) -> Result<()> {
        let mut op = Operation::new(kind);
        let result = self
            .cancellable(async {
                op.begin()?;
                let response = check_status(self.endpoint.send(request).await?).await?;
                op.acknowledged()?;
                stream_frames(&mut op, response.into_body(), sink).await?;
                op.finish()
            })
            .await;
        result.map_err(|e| op.fail(e))
    }

    async fn cancellable<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.scope.cancelled() => Err(KpmError::Cancelled),
            r = fut => r,
        }
    }

    fn request(&self, method: Method, uri: &str) -> hyper::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(HOST, host_header(&self.endpoint))
    }

    fn uri(&self, path: &str, query: &[(&str, &str)]) -> String {
        let mut uri = format!("{}{}", self.api_version.path_prefix(), path);
        if !query.is_empty() {
            uri.push('?');
            uri.push_str(&encode_query(query));
        }
        uri
    }
}

impl Drop for DaemonClient {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}

/// Render frames in arrival order; an error frame ends the operation.
async fn stream_frames(op: &mut Operation, mut body: Body, sink: &mut ProgressSink) -> Result<()> {
    let mut decoder = FrameDecoder::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(transport_error)?;
        for frame in decoder.push(&chunk)? {
            report(op, &frame, sink)?;
        }
    }
    if let Some(frame) = decoder.finish()? {
        report(op, &frame, sink)?;
    }
    Ok(())
}

fn report(op: &mut Operation, frame: &JsonMessage, sink: &mut ProgressSink) -> Result<()> {
    op.frame_received()?;
    sink.render(frame)?;
    match frame.error_message() {
        Some(message) => Err(KpmError::DaemonError(message)),
        None => Ok(()),
    }
}

/// Turn a non-success reply into a daemon error carrying its message.
async fn check_status(response: Response<Body>) -> Result<Response<Body>> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = hyper::body::to_bytes(response.into_body())
        .await
        .map_err(transport_error)?;
    Err(KpmError::DaemonError(status_message(status, &body)))
}

fn status_message(status: StatusCode, body: &[u8]) -> String {
    let message = match serde_json::from_slice::<ErrorReply>(body) {
        Ok(reply) => reply.message,
        Err(_) => String::from_utf8_lossy(body).trim().to_string(),
    };
    if message.is_empty() {
        format!("daemon returned {}", status)
    } else {
        format!("{} ({})", message, status)
    }
}

fn host_header(endpoint: &DaemonEndpoint) -> String {
    match endpoint {
        DaemonEndpoint::Tcp(addr) => addr.clone(),
        _ => "localhost".to_string(),
    }
}

fn encode_query(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_encode() {
        assert_eq!(percent_encode("a.b-1.2.3"), "a.b-1.2.3");
        assert_eq!(percent_encode("myrepo/a.b:1.2.3"), "myrepo%2Fa.b%3A1.2.3");
        assert_eq!(percent_encode("/a b"), "%2Fa%20b");
    }

    #[test]
    fn test_encode_query_keeps_order() {
        assert_eq!(
            encode_query(&[("t", "r/a:1.0.0"), ("forcerm", "1"), ("q", "0")]),
            "t=r%2Fa%3A1.0.0&forcerm=1&q=0"
        );
    }

    #[test]
    fn test_status_message_from_json() {
        let msg = status_message(
            StatusCode::NOT_FOUND,
            br#"{"message":"No such image: a.b:1.2.3"}"#,
        );
        assert_eq!(msg, "No such image: a.b:1.2.3 (404 Not Found)");
    }

    #[test]
    fn test_status_message_plain_and_empty() {
        assert_eq!(
            status_message(StatusCode::INTERNAL_SERVER_ERROR, b"oops\n"),
            "oops (500 Internal Server Error)"
        );
        assert_eq!(
            status_message(StatusCode::BAD_GATEWAY, b""),
            "daemon returned 502 Bad Gateway"
        );
    }

    #[test]
    fn test_delete_outcome_display() {
        assert_eq!(
            DeleteOutcome::Untagged("a.b:1.2.3".into()).to_string(),
            "Untagged: a.b:1.2.3"
        );
        assert_eq!(
            DeleteOutcome::Deleted("sha256:ff".into()).to_string(),
            "Deleted: sha256:ff"
        );
    }

    #[test]
    fn test_host_header() {
        assert_eq!(
            host_header(&DaemonEndpoint::Tcp("10.0.0.2:2375".into())),
            "10.0.0.2:2375"
        );
        assert_eq!(
            host_header(&DaemonEndpoint::Unix(PathBuf::from("/run/docker.sock"))),
            "localhost"
        );
    }
}
