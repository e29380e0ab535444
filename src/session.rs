//! Persistent interactive shell: one exec with stdin attached, shared across calls so `cd` and
//! shell variable state survive between commands.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use futures_util::{
    io::{AsyncReadExt, AsyncWriteExt},
    StreamExt,
};
use rand::RngCore;
use tokio::sync::oneshot;

use crate::{
    errors::{Error, Result},
    exec::Exec,
    handle::ExecResult,
    tty::{self, TtyChunk},
    Docker,
};

fn random_token() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn sentinel_pattern(uuid: &str) -> String {
    format!("__PD_{}_", uuid)
}

/// Parses a completed sentinel out of `text`, if one is present, returning
/// `(byte offset of the sentinel's start, seq, exit_code, byte offset just past the sentinel)`.
fn find_sentinel(
    text: &str,
    uuid: &str,
) -> Option<(usize, u64, i64, usize)> {
    let needle = sentinel_pattern(uuid);
    let start = text.find(&needle)?;
    let rest = &text[start + needle.len()..];

    let mut parts = rest.splitn(2, '_');
    let seq_str = parts.next()?;
    let tail = parts.next()?;
    let close = tail.find("__")?;
    let exit_str = &tail[..close];

    let seq: u64 = seq_str.parse().ok()?;
    let exit_code: i64 = exit_str.parse().ok()?;
    let end = start + needle.len() + seq_str.len() + 1 + close + 2;
    Some((start, seq, exit_code, end))
}

type Waiters = Mutex<HashMap<(String, u64), oneshot::Sender<ExecResult>>>;

/// A long-lived `/bin/sh` exec shared across calls on a [`crate::handle::ContainerHandle`].
///
/// The writer half is guarded by a `tokio::sync::Mutex`, not `std::sync::Mutex`: writing a
/// command genuinely suspends (it's a socket write), so the lock must be held across an `.await`.
pub struct Session {
    uuid: String,
    seq: AtomicU64,
    accumulator: Mutex<String>,
    closed: Arc<AtomicBool>,
    waiters: Arc<Waiters>,
    writer: tokio::sync::Mutex<Box<dyn futures_util::io::AsyncWrite + Send + Unpin>>,
    callbacks: Mutex<Vec<Box<dyn Fn(&TtyChunk) + Send + Sync>>>,
}

impl Session {
    /// Opens a new session against `container_id`: creates a `/bin/sh` exec with stdin attached
    /// and spawns a reader task that demuxes output into the accumulator, invokes output
    /// callbacks, and resolves `send_and_wait` waiters on sentinel matches.
    pub async fn open(
        docker: &Docker,
        container_id: &str,
    ) -> Result<Arc<Session>> {
        let opts = crate::builder::ExecContainerOptions::builder()
            .cmd(vec!["/bin/sh"])
            .attach_stdin(true)
            .tty(false)
            .build();

        let exec = Exec::create(docker, container_id, &opts).await?;
        let stream = exec.start_attached().await?;
        let (reader, writer) = stream.split();

        let uuid = random_token();
        let closed = Arc::new(AtomicBool::new(false));
        let waiters: Arc<Waiters> = Arc::new(Mutex::new(HashMap::new()));

        let session = Arc::new(Session {
            uuid,
            seq: AtomicU64::new(0),
            accumulator: Mutex::new(String::new()),
            closed: closed.clone(),
            waiters,
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            callbacks: Mutex::new(Vec::new()),
        });

        let reader_session = session.clone();
        tokio::task::spawn(async move {
            let mut chunks = tty::decode_reader(reader);
            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(c) => reader_session.on_chunk(c),
                    Err(_) => break,
                }
            }
            closed.store(true, Ordering::SeqCst);
        });

        Ok(session)
    }

    fn on_chunk(
        &self,
        chunk: TtyChunk,
    ) {
        for cb in self.callbacks.lock().unwrap().iter() {
            cb(&chunk);
        }

        if matches!(chunk, TtyChunk::StdIn(_)) {
            return;
        }

        let text = String::from_utf8_lossy(chunk.as_bytes()).into_owned();

        let mut acc = self.accumulator.lock().unwrap();
        acc.push_str(&text);

        while let Some((start, seq, exit_code, end)) = find_sentinel(&acc, &self.uuid) {
            let output = acc[..start].to_owned();
            acc.replace_range(..end, "");

            if let Some(sender) = self
                .waiters
                .lock()
                .unwrap()
                .remove(&(self.uuid.clone(), seq))
            {
                let _ = sender.send(ExecResult {
                    exit_code,
                    stdout: output,
                    stderr: String::new(),
                    duration: Duration::default(),
                    timed_out: false,
                    truncated: false,
                });
            }
        }
    }

    /// Registers a callback invoked with every demuxed output chunk.
    pub fn on_output<F>(
        &self,
        callback: F,
    ) where
        F: Fn(&TtyChunk) + Send + Sync + 'static,
    {
        self.callbacks.lock().unwrap().push(Box::new(callback));
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::SessionClosed)
        } else {
            Ok(())
        }
    }

    /// Writes `command\n` to stdin and returns immediately; any output appears in the
    /// accumulator and output callbacks.
    pub async fn send(
        &self,
        command: &str,
    ) -> Result<()> {
        self.ensure_open()?;
        let line = format!("{}\n", command);
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Sends `command`, tags it with a fresh sentinel, and waits for the shell to emit it,
    /// returning the output produced since the prior sentinel and the command's exit code.
    pub async fn send_and_wait(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<ExecResult> {
        self.ensure_open()?;

        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let key = (self.uuid.clone(), seq);

        let (tx, rx) = oneshot::channel();
        self.waiters.lock().unwrap().insert(key.clone(), tx);

        let line = format!(
            "{}; printf \"\\n__PD_{}_{}_$?__\\n\"\n",
            command, self.uuid, seq
        );
        {
            let mut writer = self.writer.lock().await;
            writer.write_all(line.as_bytes()).await?;
        }

        let started = Instant::now();
        let result = match timeout {
            Some(d) => tokio::time::timeout(d, rx)
                .await
                .map_err(|_| {
                    self.waiters.lock().unwrap().remove(&key);
                    Error::SocketCommunication {
                        operation: format!("session send_and_wait({})", command),
                        message: "timed out waiting for sentinel".into(),
                    }
                })?
                .map_err(|_| Error::SessionClosed)?,
            None => rx.await.map_err(|_| Error::SessionClosed)?,
        };

        Ok(ExecResult {
            duration: started.elapsed(),
            ..result
        })
    }

    /// Drains and returns everything demuxed into the accumulator since the last read.
    pub fn read(&self) -> String {
        let mut acc = self.accumulator.lock().unwrap();
        std::mem::take(&mut *acc)
    }

    /// Closes the session. Further calls fail with [`Error::SessionClosed`].
    pub async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        let mut writer = self.writer.lock().await;
        let _ = writer.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_parses_seq_and_exit_code() {
        let uuid = "deadbeefcafebabe";
        let text = format!("some output\n__PD_{}_{}_{}__\ntrailer", uuid, 3, 0);
        let (start, seq, exit_code, end) = find_sentinel(&text, uuid).unwrap();
        assert_eq!(seq, 3);
        assert_eq!(exit_code, 0);
        assert_eq!(&text[..start], "some output\n");
        assert_eq!(&text[end..], "trailer");
    }

    #[test]
    fn sentinel_in_command_output_does_not_confuse_the_qualified_match() {
        let uuid = "deadbeefcafebabe";
        let text = format!(
            "the literal string __PD_ showed up here\n__PD_{}_{}_{}__\n",
            uuid, 1, 7
        );
        let (_, seq, exit_code, _) = find_sentinel(&text, uuid).unwrap();
        assert_eq!(seq, 1);
        assert_eq!(exit_code, 7);
    }

    #[test]
    fn no_sentinel_present_returns_none() {
        assert!(find_sentinel("plain old output\n", "deadbeefcafebabe").is_none());
    }

    #[test]
    fn random_token_has_reasonable_entropy() {
        let a = random_token();
        let b = random_token();
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
    }
}
