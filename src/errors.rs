//! Representations of the error taxonomy the crate surfaces to callers.

use std::{error::Error as StdError, fmt, io};

use hyper::StatusCode;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// No usable engine socket was found during auto-detection.
    EngineUnavailable {
        probed: Vec<String>,
        hint: &'static str,
    },
    /// A specific socket path could not be connected to.
    SocketConnection { path: String, source: io::Error },
    /// A protocol-level failure: malformed response, mid-stream disconnect,
    /// unexpected status that doesn't map to a more specific variant.
    SocketCommunication { operation: String, message: String },
    /// Engine returned 404 for a container id.
    ContainerNotFound { id: String },
    /// Engine returned 409 because the container is stopped.
    ContainerNotRunning { id: String, status: String },
    /// A previously-valid handle's container was removed externally.
    ContainerGone { id: String },
    /// Engine returned 404 for an image-bound operation.
    ImageNotFound { name: String },
    /// Operation attempted on a session that has already been closed.
    SessionClosed,
    /// A project-scoped operation was invoked outside a `.pocketdock/` project.
    ProjectNotInitialized,
    /// The requested connection scheme isn't supported (e.g. `unix://` without
    /// the `unix-socket` feature).
    UnsupportedScheme(String),
    /// A `unix://`/`tcp://` uri was given with no authority portion.
    MissingAuthority,
    Hyper(hyper::Error),
    Http(http::Error),
    Io(io::Error),
    SerdeJson(serde_json::Error),
    #[cfg(feature = "tls")]
    Ssl(openssl::error::ErrorStack),
    /// Catch-all for a non-2xx status this crate doesn't give special
    /// treatment to.
    Fault { code: StatusCode, message: String },
}

impl From<hyper::Error> for Error {
    fn from(error: hyper::Error) -> Error {
        Error::Hyper(error)
    }
}

impl From<http::Error> for Error {
    fn from(error: http::Error) -> Error {
        Error::Http(error)
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Error {
        Error::Io(error)
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Error {
        Error::SerdeJson(error)
    }
}

#[cfg(feature = "tls")]
impl From<openssl::error::ErrorStack> for Error {
    fn from(error: openssl::error::ErrorStack) -> Error {
        Error::Ssl(error)
    }
}

impl fmt::Display for Error {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        match self {
            Error::EngineUnavailable { probed, hint } => write!(
                f,
                "no container engine found; probed {:?}. {}",
                probed, hint
            ),
            Error::SocketConnection { path, source } => {
                write!(f, "could not connect to engine socket {}: {}", path, source)
            }
            Error::SocketCommunication { operation, message } => {
                write!(f, "engine communication failed during {}: {}", operation, message)
            }
            Error::ContainerNotFound { id } => write!(f, "container {} not found", id),
            Error::ContainerNotRunning { id, status } => {
                write!(f, "container {} is not running (status: {})", id, status)
            }
            Error::ContainerGone { id } => write!(f, "container {} was removed externally", id),
            Error::ImageNotFound { name } => write!(f, "image {} not found", name),
            Error::SessionClosed => write!(f, "session is closed"),
            Error::ProjectNotInitialized => {
                write!(f, "not inside a pocketdock project (missing .pocketdock/)")
            }
            Error::UnsupportedScheme(scheme) => write!(f, "unsupported scheme: {}", scheme),
            Error::MissingAuthority => write!(f, "missing authority in engine uri"),
            Error::Hyper(err) => write!(f, "{}", err),
            Error::Http(err) => write!(f, "{}", err),
            Error::Io(err) => write!(f, "{}", err),
            Error::SerdeJson(err) => write!(f, "{}", err),
            #[cfg(feature = "tls")]
            Error::Ssl(err) => write!(f, "{}", err),
            Error::Fault { code, message } => write!(f, "{}: {}", code, message),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::SocketConnection { source, .. } => Some(source),
            Error::Hyper(err) => Some(err),
            Error::Http(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::SerdeJson(err) => Some(err),
            #[cfg(feature = "tls")]
            Error::Ssl(err) => Some(err),
            _ => None,
        }
    }
}

/// Maps an engine HTTP response status to a taxonomy error, following
/// spec.md §4.2's error mapping table. `container_id` is `Some` when the
/// request path names a container (so 404 becomes `ContainerNotFound` rather
/// than `ImageNotFound`).
pub(crate) fn status_to_error(
    status: StatusCode,
    operation: &str,
    body: String,
    container_id: Option<&str>,
    image_name: Option<&str>,
) -> Error {
    match status {
        StatusCode::NOT_FOUND => {
            if let Some(id) = container_id {
                Error::ContainerNotFound { id: id.to_owned() }
            } else if let Some(name) = image_name {
                Error::ImageNotFound {
                    name: name.to_owned(),
                }
            } else {
                Error::Fault {
                    code: status,
                    message: body,
                }
            }
        }
        StatusCode::CONFLICT => {
            if let Some(id) = container_id {
                Error::ContainerNotRunning {
                    id: id.to_owned(),
                    status: body,
                }
            } else {
                Error::Fault {
                    code: status,
                    message: body,
                }
            }
        }
        _ => Error::SocketCommunication {
            operation: operation.to_owned(),
            message: format!("{}: {}", status, body),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_404_on_container_path() {
        let err = status_to_error(
            StatusCode::NOT_FOUND,
            "GET /containers/abc/json",
            "no such container".into(),
            Some("abc"),
            None,
        );
        match err {
            Error::ContainerNotFound { id } => assert_eq!(id, "abc"),
            other => panic!("expected ContainerNotFound, got {:?}", other),
        }
    }

    #[test]
    fn maps_404_on_image_path() {
        let err = status_to_error(
            StatusCode::NOT_FOUND,
            "GET /images/foo/json",
            "no such image".into(),
            None,
            Some("foo"),
        );
        match err {
            Error::ImageNotFound { name } => assert_eq!(name, "foo"),
            other => panic!("expected ImageNotFound, got {:?}", other),
        }
    }

    #[test]
    fn maps_409_to_not_running() {
        let err = status_to_error(
            StatusCode::CONFLICT,
            "POST /containers/abc/start",
            "container stopped".into(),
            Some("abc"),
            None,
        );
        assert!(matches!(err, Error::ContainerNotRunning { .. }));
    }

    #[test]
    fn other_status_is_communication_error() {
        let err = status_to_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "GET /info",
            "boom".into(),
            None,
            None,
        );
        assert!(matches!(err, Error::SocketCommunication { .. }));
    }
}
