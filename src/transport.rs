//! Transports for communicating with the container engine daemon.

use std::{env, fmt, path::PathBuf};

use futures_util::{
    io::{AsyncRead, AsyncWrite},
    stream::Stream,
    TryFutureExt, TryStreamExt,
};
use hyper::{
    body::Bytes,
    client::{Client, HttpConnector},
    header::CONTENT_TYPE,
    Body, Method, Request, StatusCode,
};
use mime::Mime;

#[cfg(feature = "tls")]
use hyper_openssl::HttpsConnector;

#[cfg(feature = "unix-socket")]
use hyperlocal::{UnixConnector, Uri as UnixUri};

use crate::errors::{status_to_error, Error, Result};

/// Paths that look like containers, used to decide how a non-2xx status maps onto the error
/// taxonomy (see `status_to_error`).
fn container_id_in(endpoint: &str) -> Option<String> {
    let endpoint = endpoint.trim_start_matches('/');
    if let Some(rest) = endpoint.strip_prefix("containers/") {
        return rest.split(['/', '?']).next().map(str::to_owned);
    }
    if let Some(rest) = endpoint.strip_prefix("exec/") {
        return rest.split(['/', '?']).next().map(str::to_owned);
    }
    None
}

fn image_name_in(endpoint: &str) -> Option<String> {
    let endpoint = endpoint.trim_start_matches('/');
    endpoint
        .strip_prefix("images/")
        .and_then(|rest| rest.split(['/', '?']).next())
        .map(str::to_owned)
}

/// A request body and its content type, or no body at all.
pub(crate) enum Payload {
    None,
    Data(Body, Mime),
}

impl From<Option<(Body, Mime)>> for Payload {
    fn from(opt: Option<(Body, Mime)>) -> Self {
        match opt {
            Some((body, mime)) => Payload::Data(body, mime),
            None => Payload::None,
        }
    }
}

/// Shorthand for "no extra headers" at a call site, while still letting callers that do have
/// headers pass an arbitrary iterator through the same parameter.
pub(crate) type Headers = Option<std::iter::Empty<(&'static str, String)>>;

/// Transports are types which define the means of communication with the container engine.
#[derive(Clone)]
pub enum Transport {
    /// A Unix domain socket, the default and preferred path to a rootless Podman or Docker
    /// daemon.
    Unix {
        client: Client<UnixConnector>,
        path: String,
    },
    /// A plaintext TCP connection.
    Tcp {
        client: Client<HttpConnector>,
        host: String,
    },
    /// A TLS-wrapped TCP connection.
    EncryptedTcp {
        #[cfg(feature = "tls")]
        client: Client<HttpsConnector<HttpConnector>>,
        host: String,
    },
}

impl fmt::Debug for Transport {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        match self {
            Transport::Unix { path, .. } => write!(f, "Unix({})", path),
            Transport::Tcp { host, .. } => write!(f, "Tcp({})", host),
            Transport::EncryptedTcp { host, .. } => write!(f, "EncryptedTcp({})", host),
        }
    }
}

impl Transport {
    fn build_uri(
        &self,
        endpoint: &str,
    ) -> hyper::Uri {
        match self {
            #[cfg(feature = "unix-socket")]
            Transport::Unix { path, .. } => UnixUri::new(path, endpoint).into(),
            #[cfg(not(feature = "unix-socket"))]
            Transport::Unix { .. } => unreachable!("unix-socket feature disabled"),
            Transport::Tcp { host, .. } => format!("{}{}", host, endpoint).parse().unwrap(),
            Transport::EncryptedTcp { host, .. } => format!("{}{}", host, endpoint).parse().unwrap(),
        }
    }

    fn build_request<H>(
        &self,
        method: Method,
        endpoint: &str,
        payload: Payload,
        headers: Option<H>,
    ) -> Result<Request<Body>>
    where
        H: IntoIterator<Item = (&'static str, String)>,
    {
        let uri = self.build_uri(endpoint);
        let mut builder = Request::builder().method(method).uri(uri);
        for (k, v) in headers.into_iter().flatten() {
            builder = builder.header(k, v);
        }

        let body = match payload {
            Payload::None => Body::empty(),
            Payload::Data(body, mime) => {
                builder = builder.header(CONTENT_TYPE, mime.as_ref());
                body
            }
        };

        Ok(builder.body(body)?)
    }

    async fn send(
        &self,
        req: Request<Body>,
    ) -> Result<hyper::Response<Body>> {
        match self {
            Transport::Unix { client, .. } => Ok(client.request(req).await?),
            Transport::Tcp { client, .. } => Ok(client.request(req).await?),
            #[cfg(feature = "tls")]
            Transport::EncryptedTcp { client, .. } => Ok(client.request(req).await?),
            #[cfg(not(feature = "tls"))]
            Transport::EncryptedTcp { .. } => unreachable!("tls feature disabled"),
        }
    }

    /// Sends a request and buffers the entire response body into a `String`.
    pub(crate) async fn request<H>(
        &self,
        method: Method,
        endpoint: impl AsRef<str>,
        payload: impl Into<Payload>,
        headers: Option<H>,
    ) -> Result<String>
    where
        H: IntoIterator<Item = (&'static str, String)>,
    {
        let endpoint = endpoint.as_ref();
        let req = self.build_request(method, endpoint, payload.into(), headers)?;

        log::trace!("{:?} {}", req.method(), req.uri());
        let res = self.send(req).await?;
        let status = res.status();
        let body = hyper::body::to_bytes(res.into_body()).await?;
        let body = String::from_utf8_lossy(&body).into_owned();
        log::debug!("{} raw response: {}", endpoint, body);

        match status {
            StatusCode::OK
            | StatusCode::CREATED
            | StatusCode::NO_CONTENT
            | StatusCode::SWITCHING_PROTOCOLS => Ok(body),
            _ => Err(status_to_error(
                status,
                endpoint,
                body,
                container_id_in(endpoint).as_deref(),
                image_name_in(endpoint).as_deref(),
            )),
        }
    }

    /// Sends a request and returns the response body as a stream of chunks, without buffering it
    /// into memory first. Used for logs, stats, and exec output.
    pub(crate) fn stream_chunks<'a, H>(
        &'a self,
        method: Method,
        endpoint: impl AsRef<str> + 'a,
        payload: impl Into<Payload> + 'a,
        headers: Option<H>,
    ) -> impl Stream<Item = Result<Bytes>> + 'a
    where
        H: IntoIterator<Item = (&'static str, String)> + 'a,
    {
        let endpoint = endpoint.as_ref().to_owned();
        let payload = payload.into();
        let headers: Option<Vec<_>> = headers.map(|h| h.into_iter().collect());

        async move {
            let req = self.build_request(method, &endpoint, payload, headers)?;
            let res = self.send(req).await?;
            let status = res.status();
            if !matches!(
                status,
                StatusCode::OK | StatusCode::SWITCHING_PROTOCOLS
            ) {
                let body = hyper::body::to_bytes(res.into_body()).await?;
                let body = String::from_utf8_lossy(&body).into_owned();
                return Err(status_to_error(
                    status,
                    &endpoint,
                    body,
                    container_id_in(&endpoint).as_deref(),
                    image_name_in(&endpoint).as_deref(),
                ));
            }
            Ok(res.into_body().map_err(Error::from))
        }
        .try_flatten_stream()
    }

    /// Sends a request that asks the engine to upgrade the connection (used for exec/attach
    /// streams), returning the raw duplex byte stream on success.
    ///
    /// Takes `self` by value (a cheap clone of the underlying `hyper::Client`) so the returned
    /// stream is `'static` rather than borrowing from the caller — sessions keep this stream
    /// alive independently of whatever produced the `Transport`.
    pub(crate) async fn stream_upgrade(
        self,
        method: Method,
        endpoint: impl AsRef<str>,
        payload: impl Into<Payload>,
    ) -> Result<impl AsyncRead + AsyncWrite> {
        let endpoint = endpoint.as_ref();
        let mut req = self.build_request::<std::iter::Empty<(&'static str, String)>>(
            method,
            endpoint,
            payload.into(),
            None,
        )?;
        req.headers_mut()
            .insert(hyper::header::CONNECTION, "Upgrade".parse().unwrap());

        let res = self.send(req).await?;
        match res.status() {
            StatusCode::SWITCHING_PROTOCOLS => {}
            status => {
                let body = hyper::body::to_bytes(res.into_body()).await?;
                let body = String::from_utf8_lossy(&body).into_owned();
                return Err(status_to_error(
                    status,
                    endpoint,
                    body,
                    container_id_in(endpoint).as_deref(),
                    None,
                ));
            }
        }

        let upgraded = hyper::upgrade::on(res).await?;
        Ok(tokio_util_compat(upgraded))
    }
}

/// hyper's `Upgraded` only implements tokio's `AsyncRead`/`AsyncWrite`; the rest of this crate
/// is built on `futures_util`'s traits, so the exec/session plumbing uses this thin adapter.
fn tokio_util_compat(
    io: hyper::upgrade::Upgraded
) -> impl AsyncRead + AsyncWrite {
    use pin_project::pin_project;
    use std::{
        pin::Pin,
        task::{Context, Poll},
    };
    use tokio::io::{AsyncRead as TokioAsyncRead, AsyncWrite as TokioAsyncWrite, ReadBuf};

    #[pin_project]
    struct Compat<T> {
        #[pin]
        inner: T,
    }

    impl<T: TokioAsyncRead> AsyncRead for Compat<T> {
        fn poll_read(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut [u8],
        ) -> Poll<std::io::Result<usize>> {
            let mut read_buf = ReadBuf::new(buf);
            let this = self.project();
            match this.inner.poll_read(cx, &mut read_buf) {
                Poll::Ready(Ok(())) => Poll::Ready(Ok(read_buf.filled().len())),
                Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
                Poll::Pending => Poll::Pending,
            }
        }
    }

    impl<T: TokioAsyncWrite> AsyncWrite for Compat<T> {
        fn poll_write(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            self.project().inner.poll_write(cx, buf)
        }

        fn poll_flush(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            self.project().inner.poll_flush(cx)
        }

        fn poll_close(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            self.project().inner.poll_shutdown(cx)
        }
    }

    Compat { inner: io }
}

/// Every path auto-detection would consider, in priority order, regardless of whether anything
/// exists there yet. Used both to build the existence-filtered candidate list and to report every
/// path probed when no engine is found.
pub(crate) fn all_candidate_paths() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(path) = env::var("POCKETDOCK_SOCKET") {
        candidates.push(PathBuf::from(path));
    }

    if let Ok(runtime_dir) = env::var("XDG_RUNTIME_DIR") {
        candidates.push(PathBuf::from(runtime_dir).join("podman/podman.sock"));
    }

    for candidate in [
        "/run/podman/podman.sock",
        "/var/run/docker.sock",
        "/run/user/0/podman/podman.sock",
    ] {
        candidates.push(PathBuf::from(candidate));
    }

    if let Ok(home) = env::var("HOME") {
        for suffix in [
            ".local/share/containers/podman/machine/podman.sock",
            ".docker/run/docker.sock",
        ] {
            candidates.push(PathBuf::from(&home).join(suffix));
        }
    }

    candidates
}

/// `all_candidate_paths()` narrowed to paths that currently exist on disk. `Docker::auto()` still
/// has to `/_ping` each of these in turn — a socket file existing doesn't mean the engine behind
/// it is alive.
pub(crate) fn candidate_sockets() -> Vec<PathBuf> {
    all_candidate_paths().into_iter().filter(|p| p.exists()).collect()
}

/// Probes for a usable engine socket in the order spec'd for auto-detection: an explicit
/// override, then rootless Podman's well-known locations, then Docker's. Returns the first path
/// that exists on disk; callers still need to confirm it's live with a `/_ping` — see
/// [`candidate_sockets`] for the full list when probing for liveness.
pub fn detect_socket() -> Result<PathBuf> {
    let candidates = all_candidate_paths();

    for candidate in &candidates {
        if candidate.exists() {
            return Ok(candidate.clone());
        }
    }

    Err(Error::EngineUnavailable {
        probed: candidates.into_iter().map(|p| p.display().to_string()).collect(),
        hint: "is Podman or Docker running? set POCKETDOCK_SOCKET to override the socket path",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_container_id_from_path() {
        assert_eq!(
            container_id_in("/containers/abc123/json"),
            Some("abc123".to_owned())
        );
        assert_eq!(
            container_id_in("/exec/deadbeef/start"),
            Some("deadbeef".to_owned())
        );
        assert_eq!(container_id_in("/images/alpine/json"), None);
    }

    #[test]
    fn extracts_image_name_from_path() {
        assert_eq!(
            image_name_in("/images/alpine/json"),
            Some("alpine".to_owned())
        );
        assert_eq!(image_name_in("/containers/json?all=1"), None);
    }

    #[test]
    fn detect_socket_honors_override() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("custom.sock");
        std::fs::write(&sock_path, b"").unwrap();

        std::env::set_var("POCKETDOCK_SOCKET", &sock_path);
        let found = detect_socket().unwrap();
        std::env::remove_var("POCKETDOCK_SOCKET");

        assert_eq!(found, sock_path);
    }
}
