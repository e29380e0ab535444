//! Bounded accumulator for detached process output.

use std::{collections::VecDeque, sync::Mutex};

use crate::tty::TtyChunk;

/// Default capacity, in bytes, of a single `RingBuffer`.
pub const DEFAULT_CAPACITY: usize = 1024 * 1024;

struct Inner {
    chunks: VecDeque<TtyChunk>,
    size: usize,
    capacity: usize,
    overflow: bool,
}

/// Bounded, thread-safe circular accumulator for a detached process's output.
///
/// Both stdout and stderr share one byte budget; when appending a chunk would exceed capacity
/// the oldest chunks are evicted first and the overflow flag latches true permanently.
pub struct RingBuffer {
    inner: Mutex<Inner>,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        RingBuffer {
            inner: Mutex::new(Inner {
                chunks: VecDeque::new(),
                size: 0,
                capacity,
                overflow: false,
            }),
        }
    }

    pub fn append(
        &self,
        chunk: TtyChunk,
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner.size += chunk.as_bytes().len();
        inner.chunks.push_back(chunk);

        while inner.size > inner.capacity {
            match inner.chunks.pop_front() {
                Some(evicted) => {
                    inner.size -= evicted.as_bytes().len();
                    inner.overflow = true;
                }
                None => break,
            }
        }
    }

    /// Consumes and returns everything currently buffered.
    pub fn drain(&self) -> Vec<TtyChunk> {
        let mut inner = self.inner.lock().unwrap();
        inner.size = 0;
        inner.chunks.drain(..).collect()
    }

    /// Returns a copy of everything currently buffered without consuming it.
    pub fn peek(&self) -> Vec<TtyChunk> {
        let inner = self.inner.lock().unwrap();
        inner.chunks.iter().cloned().collect()
    }

    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().size
    }

    pub fn overflow(&self) -> bool {
        self.inner.lock().unwrap().overflow
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        RingBuffer::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_does_not_consume() {
        let rb = RingBuffer::new(1024);
        rb.append(TtyChunk::StdOut(b"hello".to_vec()));
        assert_eq!(rb.peek(), vec![TtyChunk::StdOut(b"hello".to_vec())]);
        assert_eq!(rb.peek(), vec![TtyChunk::StdOut(b"hello".to_vec())]);
        assert_eq!(rb.size(), 5);
    }

    #[test]
    fn drain_empties_the_buffer() {
        let rb = RingBuffer::new(1024);
        rb.append(TtyChunk::StdOut(b"hello".to_vec()));
        assert_eq!(rb.drain(), vec![TtyChunk::StdOut(b"hello".to_vec())]);
        assert!(rb.drain().is_empty());
        assert_eq!(rb.size(), 0);
    }

    #[test]
    fn read_then_peek_on_quiescent_buffer_is_empty_both_times() {
        let rb = RingBuffer::new(1024);
        rb.append(TtyChunk::StdOut(b"hello".to_vec()));
        assert_eq!(rb.drain().len(), 1);
        assert!(rb.drain().is_empty());
        assert!(rb.peek().is_empty());
    }

    #[test]
    fn overflow_evicts_oldest_chunks_and_latches() {
        let rb = RingBuffer::new(10);
        rb.append(TtyChunk::StdOut(b"0123456789".to_vec()));
        assert!(!rb.overflow());

        rb.append(TtyChunk::StdOut(b"abc".to_vec()));
        assert!(rb.overflow());
        assert!(rb.size() <= 10);

        let remaining = rb.peek();
        assert_eq!(remaining.last().unwrap().as_bytes(), b"abc");
    }

    #[test]
    fn stdout_and_stderr_share_one_capacity_budget() {
        let rb = RingBuffer::new(10);
        rb.append(TtyChunk::StdOut(b"12345".to_vec()));
        rb.append(TtyChunk::StdErr(b"67890".to_vec()));
        rb.append(TtyChunk::StdOut(b"x".to_vec()));

        assert!(rb.overflow());
        let chunks = rb.peek();
        assert!(chunks.iter().map(|c| c.as_bytes().len()).sum::<usize>() <= 10);
    }
}
