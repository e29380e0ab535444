//! Fire-and-forget execs: output fans out to callbacks and a ring buffer while a background task
//! drives the stream to completion.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use futures_util::StreamExt;
use tokio::sync::Notify;

use crate::{
    exec::Exec,
    handle::{Callbacks, ExecResult},
    ringbuffer::RingBuffer,
    Docker,
};

/// A command running on a background task, independent of whoever started it.
pub struct DetachedProcess {
    docker: Docker,
    container_id_and_pid: std::sync::Mutex<Option<(String, u64)>>,
    buffer: Arc<RingBuffer>,
    running: Arc<AtomicBool>,
    done: Arc<Notify>,
    result: std::sync::Mutex<Option<ExecResult>>,
}

impl DetachedProcess {
    pub(crate) fn spawn(
        docker: Docker,
        exec_id: String,
        buffer: RingBuffer,
        callbacks: Callbacks,
    ) -> Arc<DetachedProcess> {
        let process = Arc::new(DetachedProcess {
            docker: docker.clone(),
            container_id_and_pid: std::sync::Mutex::new(None),
            buffer: Arc::new(buffer),
            running: Arc::new(AtomicBool::new(true)),
            done: Arc::new(Notify::new()),
            result: std::sync::Mutex::new(None),
        });

        let worker = process.clone();
        tokio::task::spawn(async move {
            worker.drive(docker, exec_id, callbacks).await;
        });

        process
    }

    async fn drive(
        &self,
        docker: Docker,
        exec_id: String,
        callbacks: Callbacks,
    ) {
        let exec = Exec::get(&docker, exec_id).await;

        if let Ok(details) = exec.inspect().await {
            *self.container_id_and_pid.lock().unwrap() =
                Some((details.container_id, details.pid));
        }

        let mut stream = Box::pin(exec.start());
        let started = std::time::Instant::now();

        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    callbacks.dispatch_output(&chunk);
                    self.buffer.append(chunk);
                }
                Err(_) => break,
            }
        }

        let exit_code = exec
            .inspect()
            .await
            .ok()
            .and_then(|d| d.exit_code)
            .map(|c| c as i64)
            .unwrap_or(-1);

        let (stdout, stderr) = split_buffered(&self.buffer.peek());
        let result = ExecResult {
            exit_code,
            stdout,
            stderr,
            duration: started.elapsed(),
            timed_out: false,
            truncated: self.buffer.overflow(),
        };
        callbacks.dispatch_exit(&result);

        *self.result.lock().unwrap() = Some(result);
        self.running.store(false, Ordering::SeqCst);
        self.done.notify_waiters();
    }

    /// Whether the process is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Consumes and returns everything buffered since the last call.
    pub fn drain_output(&self) -> Vec<crate::tty::TtyChunk> {
        self.buffer.drain()
    }

    /// Returns a copy of everything buffered since the last call, without consuming it. A `read`
    /// (`drain_output`) immediately followed by `peek` on a quiescent process returns empty both
    /// times; a `peek` followed by `read` returns the same snapshot both times.
    pub fn peek(&self) -> Vec<crate::tty::TtyChunk> {
        self.buffer.peek()
    }

    /// Sends `signal` (or SIGTERM if processes ignore their first signal) to the process, using
    /// the pid discovered when the exec started. A no-op if the process's pid hasn't been
    /// resolved yet or it has already exited.
    pub async fn kill(
        &self,
        signal: &str,
    ) -> crate::errors::Result<()> {
        let target = self.container_id_and_pid.lock().unwrap().clone();
        let (container_id, pid) = match target {
            Some(target) => target,
            None => return Ok(()),
        };

        let signal = format!("-{}", signal);
        let pid = pid.to_string();
        let opts = crate::builder::ExecContainerOptions::builder()
            .cmd(vec!["kill", signal.as_str(), pid.as_str()])
            .build();
        let killer = Exec::create(&self.docker, &container_id, &opts).await?;
        let _ = killer.start().collect::<Vec<_>>().await;
        Ok(())
    }

    /// Waits until the process exits or `timeout` elapses, whichever comes first. Returns `None`
    /// if the timer expired while the process was still running.
    pub async fn wait(
        &self,
        timeout: Option<std::time::Duration>,
    ) -> Option<ExecResult> {
        let wait_for_exit = async {
            loop {
                if let Some(result) = self.result.lock().unwrap().clone() {
                    return result;
                }
                if !self.running.load(Ordering::SeqCst) {
                    // Running flag flipped but result not yet stored; yield and retry.
                    tokio::task::yield_now().await;
                    continue;
                }
                self.done.notified().await;
            }
        };

        match timeout {
            Some(d) => tokio::time::timeout(d, wait_for_exit).await.ok(),
            None => Some(wait_for_exit.await),
        }
    }
}

fn split_buffered(chunks: &[crate::tty::TtyChunk]) -> (String, String) {
    let mut stdout = String::new();
    let mut stderr = String::new();
    for chunk in chunks {
        match chunk {
            crate::tty::TtyChunk::StdErr(_) => {
                stderr.push_str(&String::from_utf8_lossy(chunk.as_bytes()))
            }
            _ => stdout.push_str(&String::from_utf8_lossy(chunk.as_bytes())),
        }
    }
    (stdout, stderr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tty::TtyChunk;

    #[test]
    fn split_buffered_separates_stdout_and_stderr() {
        let chunks = vec![
            TtyChunk::StdOut(b"out".to_vec()),
            TtyChunk::StdErr(b"err".to_vec()),
        ];
        let (stdout, stderr) = split_buffered(&chunks);
        assert_eq!(stdout, "out");
        assert_eq!(stderr, "err");
    }
}
