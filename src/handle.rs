//! The per-container handle: connection-per-operation discipline, the three run modes, file
//! transfer, and the shutdown/cleanup contract.

use std::{
    collections::HashMap,
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use futures_util::{stream::Stream, try_join, StreamExt};
use rand::RngCore;

use crate::{
    builder::ExecContainerOptions,
    container::{Container, RmContainerOptions},
    detached::DetachedProcess,
    errors::{Error, Result},
    exec::Exec,
    ringbuffer::RingBuffer,
    session::Session,
    tarball,
    tty::TtyChunk,
    Docker,
};

/// Default cap, per stream, on bytes accumulated by a blocking run.
pub const DEFAULT_MAX_OUTPUT: usize = 10 * 1024 * 1024;

/// Immutable outcome of a blocking or streaming exec.
#[derive(Clone, Debug)]
pub struct ExecResult {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub timed_out: bool,
    pub truncated: bool,
}

impl ExecResult {
    pub fn ok(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Functions invoked on stdout/stderr frames and on exit, for a detached process.
#[derive(Default)]
pub struct Callbacks {
    pub(crate) output: Vec<Box<dyn Fn(&TtyChunk) + Send + Sync>>,
    pub(crate) exit: Vec<Box<dyn Fn(&ExecResult) + Send + Sync>>,
}

impl Callbacks {
    pub fn new() -> Self {
        Callbacks::default()
    }

    pub fn on_output<F>(
        mut self,
        f: F,
    ) -> Self
    where
        F: Fn(&TtyChunk) + Send + Sync + 'static,
    {
        self.output.push(Box::new(f));
        self
    }

    pub fn on_exit<F>(
        mut self,
        f: F,
    ) -> Self
    where
        F: Fn(&ExecResult) + Send + Sync + 'static,
    {
        self.exit.push(Box::new(f));
        self
    }

    pub(crate) fn dispatch_output(
        &self,
        chunk: &TtyChunk,
    ) {
        for cb in &self.output {
            cb(chunk);
        }
    }

    pub(crate) fn dispatch_exit(
        &self,
        result: &ExecResult,
    ) {
        for cb in &self.exit {
            cb(result);
        }
    }
}

/// Builds the command vector for a `run`: `lang` wraps the command as `{lang, "-c", command}`
/// (e.g. `python -c '...'`); otherwise it's a plain shell invocation (`sh -c command`).
pub fn build_command(
    lang: Option<&str>,
    command: &str,
) -> Vec<String> {
    let interpreter = lang.unwrap_or("sh");
    vec![interpreter.to_owned(), "-c".to_owned(), command.to_owned()]
}

enum ActiveOp {
    Stream { cancel: Arc<AtomicBool> },
    Detached(Arc<DetachedProcess>),
    Session(Arc<Session>),
}

#[derive(Default)]
struct ActiveOps {
    next_token: u64,
    ops: HashMap<u64, ActiveOp>,
}

/// RAII guard: removes its token from the active-operations set on every exit path, including
/// error returns and panics unwinding through `?`.
struct OpGuard {
    active_ops: Arc<Mutex<ActiveOps>>,
    token: u64,
}

impl Drop for OpGuard {
    fn drop(&mut self) {
        self.active_ops.lock().unwrap().ops.remove(&self.token);
    }
}

fn register(
    active_ops: &Arc<Mutex<ActiveOps>>,
    op: ActiveOp,
) -> OpGuard {
    let mut inner = active_ops.lock().unwrap();
    let token = inner.next_token;
    inner.next_token += 1;
    inner.ops.insert(token, op);
    OpGuard {
        active_ops: active_ops.clone(),
        token,
    }
}

/// A long-lived value bound to one engine-side container, implementing the three run modes,
/// file transfer, persistent sessions, and shutdown.
pub struct ContainerHandle {
    docker: Docker,
    id: String,
    name: String,
    default_timeout: Option<Duration>,
    max_output: usize,
    persist: bool,
    project: Option<String>,
    data_path: Option<std::path::PathBuf>,
    /// The spec this handle was created from, if any. Populated by `create`; left `None` for
    /// handles reconstructed by `discovery::resume`, which have no create-time spec to recreate
    /// from. Required for `reboot(fresh: true)`.
    create_opts: Option<CreateOptions>,
    active_ops: Arc<Mutex<ActiveOps>>,
    shutting_down: Arc<AtomicBool>,
}

/// A single frame from a streaming run, tagged as it was observed in the stream.
pub type StreamChunk = TtyChunk;

/// Lazy, single-pass iterator over a streaming run's output. After exhaustion, `result()` returns
/// the final `ExecResult`. Cancelling drops the inner stream and fires a best-effort kill.
pub struct ExecStream<'docker> {
    inner: std::pin::Pin<Box<dyn Stream<Item = Result<TtyChunk>> + Send + 'docker>>,
    exec: Exec<'docker>,
    docker: Docker,
    stdout: String,
    stderr: String,
    max_output: usize,
    truncated: bool,
    started: Instant,
    result: Option<ExecResult>,
    _guard: OpGuard,
}

impl<'docker> ExecStream<'docker> {
    /// The final `ExecResult`, available only once the stream has been fully consumed.
    pub fn result(&self) -> Option<&ExecResult> {
        self.result.as_ref()
    }

    /// Drops the inner stream and asks the engine to kill the exec's process. Best-effort: errors
    /// talking to the engine are swallowed since the caller is already giving up on this stream.
    pub async fn cancel(self) {
        if let Ok(details) = self.exec.inspect().await {
            let _ = kill_pid(&self.docker, &details.container_id, details.pid).await;
        }
    }

    pub async fn next(&mut self) -> Option<Result<TtyChunk>> {
        let item = self.inner.next().await;
        match &item {
            Some(Ok(chunk)) => {
                let (buf, cap) = match chunk {
                    TtyChunk::StdErr(_) => (&mut self.stderr, self.max_output),
                    _ => (&mut self.stdout, self.max_output),
                };
                if buf.len() < cap {
                    buf.push_str(&String::from_utf8_lossy(chunk.as_bytes()));
                    if buf.len() > cap {
                        buf.truncate(cap);
                        self.truncated = true;
                    }
                } else {
                    self.truncated = true;
                }
            }
            None => {
                let exit_code = self
                    .exec
                    .inspect()
                    .await
                    .ok()
                    .and_then(|d| d.exit_code)
                    .map(|c| c as i64)
                    .unwrap_or(-1);
                self.result = Some(ExecResult {
                    exit_code,
                    stdout: std::mem::take(&mut self.stdout),
                    stderr: std::mem::take(&mut self.stderr),
                    duration: self.started.elapsed(),
                    timed_out: false,
                    truncated: self.truncated,
                });
            }
            Some(Err(_)) => {}
        }
        item
    }
}

/// Sends SIGTERM, then SIGKILL, to `pid` inside `container_id`. The engine doesn't expose "kill
/// this exec's process" directly, so this runs a side-channel `kill` through a fresh, short-lived
/// exec on the same container.
async fn kill_pid(
    docker: &Docker,
    container_id: &str,
    pid: u64,
) -> Result<()> {
    let pid = pid.to_string();
    for signal in ["-TERM", "-KILL"] {
        let opts = ExecContainerOptions::builder()
            .cmd(vec!["kill", signal, pid.as_str()])
            .build();
        if let Ok(created) = Exec::create(docker, container_id, &opts).await {
            let _ = created.start().collect::<Vec<_>>().await;
        }
    }
    Ok(())
}

/// Parameters for creating a new managed container.
#[derive(Debug, Default, Clone)]
pub struct CreateOptions {
    pub image: String,
    pub name: Option<String>,
    pub env: Vec<String>,
    pub memory_bytes: Option<u64>,
    /// `HostConfig.NanoCpus`: CPU quota in units of 10^-9 CPUs. 0 means unlimited.
    pub nano_cpus: Option<u64>,
    pub working_dir: Option<String>,
    /// Bind mounts in `/host/path:/container/path[:ro]` form.
    pub binds: Vec<String>,
    /// Host devices to pass through, as `(host_path, container_path)` pairs.
    pub devices: Vec<(String, String)>,
    pub network_mode: Option<String>,
    /// Port bindings as `(container_port, protocol, host_port)` triples.
    pub ports: Vec<(u32, String, u32)>,
    pub persist: bool,
    pub project: Option<String>,
    pub profile: Option<String>,
    pub data_path: Option<std::path::PathBuf>,
}

fn random_container_name() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    let suffix: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("pd-{}", suffix)
}

#[cfg(feature = "chrono")]
fn created_at_label() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(not(feature = "chrono"))]
fn created_at_label() -> String {
    String::new()
}

impl ContainerHandle {
    /// Creates and starts a new managed container, tagging it with the `pocketdock.*` labels
    /// discovery relies on to find it again.
    pub async fn create(
        docker: &Docker,
        opts: CreateOptions,
    ) -> Result<ContainerHandle> {
        let name = opts.name.clone().unwrap_or_else(random_container_name);
        let data_path_label = opts
            .data_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let persist_label = opts.persist.to_string();
        let created_at = created_at_label();
        let project_label = opts.project.clone().unwrap_or_default();
        let profile_label = opts.profile.clone().unwrap_or_default();

        let mut labels: HashMap<&str, &str> = HashMap::new();
        labels.insert("pocketdock.managed", "true");
        labels.insert("pocketdock.instance", &name);
        labels.insert("pocketdock.profile", &profile_label);
        labels.insert("pocketdock.project", &project_label);
        labels.insert("pocketdock.persist", &persist_label);
        labels.insert("pocketdock.created-at", &created_at);
        labels.insert("pocketdock.data-path", &data_path_label);

        let mut builder = crate::container::ContainerOptions::builder(&opts.image);
        builder.name(&name).cmd(vec!["sleep", "infinity"]).labels(&labels);
        if !opts.env.is_empty() {
            builder.env(&opts.env);
        }
        if let Some(mem) = opts.memory_bytes {
            builder.memory(mem);
        }
        if let Some(nano_cpus) = opts.nano_cpus {
            builder.nano_cpus(nano_cpus);
        }
        if let Some(dir) = &opts.working_dir {
            builder.working_dir(dir);
        }
        if !opts.binds.is_empty() {
            builder.volumes(opts.binds.iter().map(String::as_str).collect());
        }
        if !opts.devices.is_empty() {
            let devices = opts
                .devices
                .iter()
                .map(|(host, container)| {
                    let mut device = HashMap::new();
                    device.insert("PathOnHost".to_owned(), host.clone());
                    device.insert("PathInContainer".to_owned(), container.clone());
                    device
                })
                .collect();
            builder.devices(devices);
        }
        if let Some(mode) = &opts.network_mode {
            builder.network_mode(mode);
        }
        for (container_port, protocol, host_port) in &opts.ports {
            builder.expose(*container_port, protocol, *host_port);
        }
        let docker_create_opts = builder.build();

        let info = docker.containers().create(&docker_create_opts).await?;
        let container = Container::new(docker, info.id.clone());
        container.start().await?;

        let mut handle = ContainerHandle::new(
            docker.clone(),
            info.id,
            name,
            opts.persist,
            opts.project.clone(),
            opts.data_path.clone(),
        );
        handle.create_opts = Some(opts);
        Ok(handle)
    }

    /// Wraps an already-running container. Used by the create factory and by `discovery::resume`.
    pub(crate) fn new(
        docker: Docker,
        id: String,
        name: String,
        persist: bool,
        project: Option<String>,
        data_path: Option<std::path::PathBuf>,
    ) -> ContainerHandle {
        ContainerHandle {
            docker,
            id,
            name,
            default_timeout: None,
            max_output: DEFAULT_MAX_OUTPUT,
            persist,
            project,
            data_path,
            create_opts: None,
            active_ops: Arc::new(Mutex::new(ActiveOps::default())),
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_default_timeout(
        &mut self,
        timeout: Option<Duration>,
    ) {
        self.default_timeout = timeout;
    }

    pub fn set_max_output(
        &mut self,
        max_output: usize,
    ) {
        self.max_output = max_output;
    }

    fn container(&self) -> Container<'_> {
        Container::new(&self.docker, self.id.clone())
    }

    /// Remaps a 404 on this handle's own `id` from `ContainerNotFound` (the engine's generic "no
    /// such container" answer) to `ContainerGone` — the container existed when this handle was
    /// created and has since been removed out from under it, which callers need to distinguish
    /// from a lookup by name that never resolved (`discovery::resume`/`destroy`).
    fn remap_gone(
        &self,
        err: Error,
    ) -> Error {
        match err {
            Error::ContainerNotFound { id } if id == self.id => Error::ContainerGone { id },
            other => other,
        }
    }

    fn rejecting_if_shutting_down(&self) -> Result<()> {
        if self.shutting_down.load(Ordering::SeqCst) {
            Err(Error::SocketCommunication {
                operation: "run".into(),
                message: "handle is shutting down".into(),
            })
        } else {
            Ok(())
        }
    }

    /// Common prelude shared by the three run modes: builds the command vector, creates an exec
    /// with stdin not attached, and starts it. Returns the exec (for inspect/kill) and the
    /// demuxed output stream.
    async fn start_exec(
        &self,
        lang: Option<&str>,
        command: &str,
    ) -> Result<(Exec<'_>, impl Stream<Item = Result<TtyChunk>> + Send + '_)> {
        self.rejecting_if_shutting_down()?;

        let argv = build_command(lang, command);
        let opts = ExecContainerOptions::builder()
            .cmd(argv.iter().map(String::as_str).collect())
            .build();

        let exec = Exec::create(&self.docker, &self.id, &opts)
            .await
            .map_err(|e| self.remap_gone(e))?;
        let stream = exec.start();
        Ok((exec, stream))
    }

    /// Runs `command` to completion, accumulating stdout/stderr up to `max_output` bytes each.
    pub async fn run_blocking(
        &self,
        lang: Option<&str>,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<ExecResult> {
        let cancel = Arc::new(AtomicBool::new(false));
        let _guard = register(&self.active_ops, ActiveOp::Stream { cancel: cancel.clone() });

        let started = Instant::now();
        let (exec, stream) = self.start_exec(lang, command).await?;
        let max_output = self.max_output;

        let accumulate = async {
            let mut stdout = String::new();
            let mut stderr = String::new();
            let mut truncated = false;
            futures_util::pin_mut!(stream);
            while let Some(item) = stream.next().await {
                let chunk = item?;
                let (buf, is_full) = match &chunk {
                    TtyChunk::StdErr(_) => {
                        let is_full = stderr.len() >= max_output;
                        (&mut stderr, is_full)
                    }
                    _ => {
                        let is_full = stdout.len() >= max_output;
                        (&mut stdout, is_full)
                    }
                };
                if is_full {
                    truncated = true;
                    continue;
                }
                buf.push_str(&String::from_utf8_lossy(chunk.as_bytes()));
                if buf.len() > max_output {
                    buf.truncate(max_output);
                    truncated = true;
                }
            }
            Ok::<_, Error>((stdout, stderr, truncated))
        };

        let timeout = timeout.or(self.default_timeout);
        let outcome = match timeout {
            Some(d) => tokio::time::timeout(d, accumulate).await,
            None => Ok(accumulate.await),
        };

        match outcome {
            Ok(Ok((stdout, stderr, truncated))) => {
                let exit_code = exec
                    .inspect()
                    .await
                    .ok()
                    .and_then(|d| d.exit_code)
                    .map(|c| c as i64)
                    .unwrap_or(-1);
                Ok(ExecResult {
                    exit_code,
                    stdout,
                    stderr,
                    duration: started.elapsed(),
                    timed_out: false,
                    truncated,
                })
            }
            Ok(Err(err)) => Err(err),
            Err(_elapsed) => {
                let pid = exec.inspect().await.ok().map(|d| d.pid).unwrap_or(0);
                let _ = kill_pid(&self.docker, &self.id, pid).await;
                Ok(ExecResult {
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration: started.elapsed(),
                    timed_out: true,
                    truncated: false,
                })
            }
        }
    }

    /// Runs `command`, returning a lazy iterator over its output; after exhaustion `result()`
    /// exposes the final `ExecResult`.
    pub async fn run_streaming(
        &self,
        lang: Option<&str>,
        command: &str,
    ) -> Result<ExecStream<'_>> {
        let cancel = Arc::new(AtomicBool::new(false));
        let guard = register(&self.active_ops, ActiveOp::Stream { cancel });

        let (exec, stream) = self.start_exec(lang, command).await?;
        Ok(ExecStream {
            inner: Box::pin(stream),
            exec,
            docker: self.docker.clone(),
            stdout: String::new(),
            stderr: String::new(),
            max_output: self.max_output,
            truncated: false,
            started: Instant::now(),
            result: None,
            _guard: guard,
        })
    }

    /// Runs `command` on a background task, fanning every frame out to `callbacks` and a ring
    /// buffer, returning a handle to observe or kill it.
    pub async fn run_detached(
        &self,
        lang: Option<&str>,
        command: &str,
        callbacks: Callbacks,
    ) -> Result<Arc<DetachedProcess>> {
        self.rejecting_if_shutting_down()?;

        let argv = build_command(lang, command);
        let opts = ExecContainerOptions::builder()
            .cmd(argv.iter().map(String::as_str).collect())
            .build();

        let exec = Exec::create(&self.docker, &self.id, &opts)
            .await
            .map_err(|e| self.remap_gone(e))?;
        let exec_id = exec.id().to_owned();
        let process =
            DetachedProcess::spawn(self.docker.clone(), exec_id, RingBuffer::default(), callbacks);

        register(&self.active_ops, ActiveOp::Detached(process.clone()));
        Ok(process)
    }

    /// Opens a persistent interactive shell shared across calls.
    pub async fn open_session(&self) -> Result<Arc<Session>> {
        self.rejecting_if_shutting_down()?;
        let session = Session::open(&self.docker, &self.id).await?;
        register(&self.active_ops, ActiveOp::Session(session.clone()));
        Ok(session)
    }

    /// Packs `content` into a single-entry tar stream and PUTs it to the directory containing
    /// `path`.
    pub async fn write_file(
        &self,
        path: &str,
        content: &[u8],
    ) -> Result<()> {
        let target = Path::new(path);
        let name = target
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::SocketCommunication {
                operation: "write_file".into(),
                message: format!("path has no file name: {}", path),
            })?;
        let dir = target.parent().unwrap_or_else(|| Path::new("/"));

        let packed = tarball::pack_file(name, content, 0o644)?;
        self.container()
            .copy_to(dir, packed.into())
            .await
            .map_err(|e| self.remap_gone(e))
    }

    /// GETs the archive for `path` and extracts the first entry's bytes.
    pub async fn read_file(
        &self,
        path: &str,
    ) -> Result<Vec<u8>> {
        let chunks: Vec<Vec<u8>> = self
            .container()
            .copy_from(Path::new(path))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_>>()
            .map_err(|e| self.remap_gone(e))?;
        let data: Vec<u8> = chunks.into_iter().flatten().collect();
        tarball::unpack_first(&data)
    }

    /// Lists entries under `path` via `ls -A`.
    pub async fn list_files(
        &self,
        path: &str,
    ) -> Result<Vec<String>> {
        let result = self
            .run_blocking(None, &format!("ls -A {}", shell_quote(path)), None)
            .await?;
        Ok(result
            .stdout
            .lines()
            .map(str::to_owned)
            .filter(|l| !l.is_empty())
            .collect())
    }

    /// Packs the host directory `src` and PUTs it at `dst` inside the container.
    pub async fn push(
        &self,
        src: &Path,
        dst: &Path,
    ) -> Result<()> {
        let packed = tarball::pack_dir(src)?;
        self.container()
            .copy_to(dst, packed.into())
            .await
            .map_err(|e| self.remap_gone(e))
    }

    /// GETs the archive at `src` inside the container and unpacks it into the host directory
    /// `dst`.
    pub async fn pull(
        &self,
        src: &Path,
        dst: &Path,
    ) -> Result<()> {
        let chunks: Vec<Vec<u8>> = self
            .container()
            .copy_from(src)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_>>()
            .map_err(|e| self.remap_gone(e))?;
        let data: Vec<u8> = chunks.into_iter().flatten().collect();
        tarball::unpack_all(&data, dst)
    }

    /// Composes a status/image/memory/cpu/network/process snapshot from inspect, stats and top,
    /// fetched concurrently. CPU percent is derived from two stats samples taken 200ms apart,
    /// following the engine's own delta formula (`docker stats` does the same).
    pub async fn info(&self) -> Result<ContainerInfoSnapshot> {
        let container = self.container();

        let inspect = container.inspect();
        let samples = async {
            let mut stream = Box::pin(container.stats());
            let first = stream.next().await.transpose()?;
            tokio::time::sleep(Duration::from_millis(200)).await;
            let second = stream.next().await.transpose()?;
            Ok((first, second))
        };
        let top = container.top(None);

        let (details, (prev, curr), processes) =
            try_join!(inspect, samples, top).map_err(|e| self.remap_gone(e))?;

        let memory_usage_bytes = curr.as_ref().map(|s| s.memory_stats.usage);
        let memory_limit_bytes = details.host_config.memory.filter(|&m| m > 0);
        let memory_percent = match (&curr, memory_limit_bytes) {
            (Some(s), Some(limit)) if limit > 0 => {
                let cache = s.memory_stats.stats.cache;
                let used = s.memory_stats.usage.saturating_sub(cache);
                Some(used as f64 / limit as f64 * 100.0)
            }
            _ => None,
        };

        let cpu_percent = match (&prev, &curr) {
            (Some(prev), Some(curr)) => {
                let cpu_delta = curr
                    .cpu_stats
                    .cpu_usage
                    .total_usage
                    .saturating_sub(prev.cpu_stats.cpu_usage.total_usage);
                let system_delta = curr
                    .cpu_stats
                    .system_cpu_usage
                    .saturating_sub(prev.cpu_stats.system_cpu_usage);
                let num_cpus = curr.cpu_stats.cpu_usage.percpu_usage.len().max(1);
                if system_delta > 0 {
                    Some(cpu_delta as f64 / system_delta as f64 * num_cpus as f64 * 100.0)
                } else {
                    None
                }
            }
            _ => None,
        };

        Ok(ContainerInfoSnapshot {
            id: details.id,
            status: details.state.status,
            image: details.image,
            memory_usage_bytes,
            memory_limit_bytes,
            memory_percent,
            cpu_percent,
            network: details.network_settings,
            processes,
        })
    }

    /// Restarts the container. If `fresh` is set, instead tears the container down entirely and
    /// recreates it from the `CreateOptions` it was originally created with, replacing this
    /// handle's `id`/`name` in place. Handles reconstructed by `discovery::resume` have no stored
    /// create options and return `Error::Fault` if asked for a fresh reboot.
    pub async fn reboot(
        &mut self,
        timeout: Option<Duration>,
        fresh: bool,
    ) -> Result<()> {
        if !fresh {
            return self
                .container()
                .restart(timeout)
                .await
                .map_err(|e| self.remap_gone(e));
        }

        let create_opts = self.create_opts.clone().ok_or_else(|| Error::Fault {
            code: hyper::StatusCode::BAD_REQUEST,
            message: "handle has no stored create options; resumed handles can't be freshly rebooted".into(),
        })?;

        self.container()
            .stop(timeout)
            .await
            .map_err(|e| self.remap_gone(e))?;
        let opts = RmContainerOptions::builder().force(true).build();
        self.container()
            .remove(opts)
            .await
            .map_err(|e| self.remap_gone(e))?;

        let fresh_handle = ContainerHandle::create(&self.docker, create_opts).await?;
        self.id = fresh_handle.id;
        self.name = fresh_handle.name;
        self.create_opts = fresh_handle.create_opts;
        self.active_ops = fresh_handle.active_ops;
        self.shutting_down = fresh_handle.shutting_down;

        Ok(())
    }

    /// Commits the container's current filesystem as a new image, returning its id.
    pub async fn snapshot(
        &self,
        image_name: &str,
    ) -> Result<String> {
        let info = self.docker.images().commit(&self.id, image_name).await?;
        Ok(info.id)
    }

    /// Tears down every active operation, then stops (or, if not persistent, removes) the
    /// container. Continues past individual failures; the first error encountered, if any, is
    /// returned after teardown completes.
    pub async fn shutdown(&self, grace: Duration) -> Result<()> {
        self.shutting_down.store(true, Ordering::SeqCst);
        let ops: Vec<ActiveOp> = {
            let mut inner = self.active_ops.lock().unwrap();
            inner.ops.drain().map(|(_, op)| op).collect()
        };

        let mut first_err = None;

        for op in ops {
            match op {
                ActiveOp::Detached(proc) => {
                    proc.kill("TERM").await.ok();
                    proc.wait(Some(grace)).await;
                }
                ActiveOp::Stream { cancel } => {
                    cancel.store(true, Ordering::SeqCst);
                }
                ActiveOp::Session(session) => {
                    if let Err(e) = session.close().await {
                        first_err.get_or_insert(e);
                    }
                }
            }
        }

        if let Err(e) = self.container().stop(Some(grace)).await.map_err(|e| self.remap_gone(e)) {
            first_err.get_or_insert(e);
        }

        if !self.persist {
            let opts = RmContainerOptions::builder().force(true).build();
            if let Err(e) = self.container().remove(opts).await.map_err(|e| self.remap_gone(e)) {
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    pub fn data_path(&self) -> Option<&Path> {
        self.data_path.as_deref()
    }

    pub fn persist(&self) -> bool {
        self.persist
    }
}

/// Status/image/memory/cpu/network/process snapshot returned by `ContainerHandle::info`.
#[derive(Clone, Debug)]
pub struct ContainerInfoSnapshot {
    pub id: String,
    pub status: String,
    pub image: String,
    pub memory_usage_bytes: Option<u64>,
    pub memory_limit_bytes: Option<u64>,
    /// `(usage - cache) / limit * 100`, the same convention `docker stats` uses. `None` when the
    /// container has no memory limit or no stats sample was available.
    pub memory_percent: Option<f64>,
    /// CPU percent since the previous sample, derived from two stats readings taken 200ms apart.
    pub cpu_percent: Option<f64>,
    pub network: crate::container::NetworkSettings,
    pub processes: crate::container::Top,
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_command_wraps_lang_as_dash_c() {
        assert_eq!(
            build_command(Some("python3"), "print(1)"),
            vec!["python3", "-c", "print(1)"]
        );
    }

    #[test]
    fn build_command_defaults_to_sh() {
        assert_eq!(build_command(None, "echo hi"), vec!["sh", "-c", "echo hi"]);
    }

    #[test]
    fn exec_result_ok_requires_zero_exit_and_no_timeout() {
        let good = ExecResult {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::default(),
            timed_out: false,
            truncated: false,
        };
        assert!(good.ok());

        let timed_out = ExecResult {
            timed_out: true,
            ..good.clone()
        };
        assert!(!timed_out.ok());
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }
}
