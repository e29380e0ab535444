//! A client for managing OCI container sandboxes (Podman rootless preferred, Docker supported)
//! over the engine's Docker-compatible REST protocol on a Unix domain socket.
//!
//! [`Docker`] is the low-level engine client; [`ContainerHandle`] is the sandbox-facing surface
//! most callers want — it runs commands in three modes (blocking, streaming, detached), moves
//! files via tar archives, and opens persistent shell [`Session`]s.

pub mod builder;
pub mod container;
#[cfg(feature = "chrono")]
mod datetime;
pub mod detached;
pub mod discovery;
mod docker;
pub mod errors;
pub mod exec;
pub mod handle;
pub mod image;
pub mod ringbuffer;
pub mod session;
pub mod tarball;
mod transport;
pub mod tty;

pub use crate::{
    docker::Docker,
    errors::{Error, Result},
    handle::{Callbacks, ContainerHandle, CreateOptions, ExecResult},
    session::Session,
};
