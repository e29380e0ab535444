//! Demultiplexes the stdout/stderr framing the engine uses for exec/attach streams.
//!
//! Docker multiplexes stdout and stderr over a single connection with an 8 byte header per
//! frame: `[ STREAM_TYPE, 0, 0, 0, SIZE1, SIZE2, SIZE3, SIZE4 ]` followed by `SIZE` bytes of
//! payload. Podman's rootless exec sometimes skips the framing entirely and writes raw bytes
//! instead, so the decoder looks at the first frame to decide which mode it's in and sticks with
//! it for the life of the stream.

use std::io;

use byteorder::{BigEndian, ByteOrder};
use bytes::{Buf, Bytes, BytesMut};
use futures_codec::{Decoder, FramedRead};
use futures_util::{stream::Stream, TryStreamExt};

use crate::errors::{Error, Result};

const HEADER_LEN: usize = 8;

/// One frame of demultiplexed exec/attach output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TtyChunk {
    StdIn(Vec<u8>),
    StdOut(Vec<u8>),
    StdErr(Vec<u8>),
}

impl TtyChunk {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            TtyChunk::StdIn(b) | TtyChunk::StdOut(b) | TtyChunk::StdErr(b) => b,
        }
    }
}

fn looks_framed(buf: &[u8]) -> bool {
    buf.len() >= HEADER_LEN && matches!(buf[0], 0 | 1 | 2) && buf[1] == 0 && buf[2] == 0 && buf[3] == 0
}

struct TtyDecoder {
    framed: Option<bool>,
}

impl TtyDecoder {
    fn new() -> Self {
        TtyDecoder { framed: None }
    }
}

impl Decoder for TtyDecoder {
    type Item = TtyChunk;
    type Error = io::Error;

    fn decode(
        &mut self,
        buf: &mut BytesMut,
    ) -> io::Result<Option<TtyChunk>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if self.framed.is_none() {
            if buf.len() < HEADER_LEN {
                return Ok(None);
            }
            self.framed = Some(looks_framed(buf));
        }

        if self.framed == Some(false) {
            let chunk = buf.split_to(buf.len());
            return Ok(Some(TtyChunk::StdOut(chunk.to_vec())));
        }

        if buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let payload_len = BigEndian::read_u32(&buf[4..HEADER_LEN]) as usize;
        if buf.len() < HEADER_LEN + payload_len {
            return Ok(None);
        }

        let tag = buf[0];
        buf.advance(HEADER_LEN);
        let payload = buf.split_to(payload_len).to_vec();

        Ok(Some(match tag {
            0 => TtyChunk::StdIn(payload),
            2 => TtyChunk::StdErr(payload),
            _ => TtyChunk::StdOut(payload),
        }))
    }
}

impl TtyDecoder {
    #[allow(dead_code)]
    fn decode_eof(
        &mut self,
        buf: &mut BytesMut,
    ) -> io::Result<Option<TtyChunk>> {
        match self.decode(buf)? {
            Some(chunk) => Ok(Some(chunk)),
            None if !buf.is_empty() => {
                let chunk = buf.split_to(buf.len());
                Ok(Some(TtyChunk::StdOut(chunk.to_vec())))
            }
            None => Ok(None),
        }
    }
}

/// Turns a raw byte stream from the engine into a stream of tagged stdout/stderr chunks.
pub fn decode<'a>(
    stream: impl Stream<Item = Result<Bytes>> + 'a,
) -> impl Stream<Item = Result<TtyChunk>> + 'a {
    let reader = Box::pin(stream.map_err(|e| io::Error::new(io::ErrorKind::Other, e))).into_async_read();

    FramedRead::new(reader, TtyDecoder::new()).map_err(Error::from)
}

/// Same demultiplexing, but driven directly from an `AsyncRead` half rather than a chunked
/// `Stream`. Used by sessions, whose exec-start response is a bidirectional upgraded connection
/// rather than a one-way response body.
pub fn decode_reader<R>(reader: R) -> impl Stream<Item = Result<TtyChunk>>
where
    R: futures_util::io::AsyncRead + Unpin,
{
    FramedRead::new(reader, TtyDecoder::new()).map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn frame(
        tag: u8,
        payload: &[u8],
    ) -> Vec<u8> {
        let mut out = vec![tag, 0, 0, 0];
        let mut len = [0u8; 4];
        BigEndian::write_u32(&mut len, payload.len() as u32);
        out.extend_from_slice(&len);
        out.extend_from_slice(payload);
        out
    }

    async fn collect(chunks: Vec<Bytes>) -> Vec<TtyChunk> {
        let s = stream::iter(chunks.into_iter().map(Ok));
        decode(s).try_collect::<Vec<_>>().await.unwrap()
    }

    #[tokio::test]
    async fn demuxes_frames_split_across_chunks() {
        let mut full = frame(1, b"hello ");
        full.extend(frame(2, b"oops"));

        // split in the middle of the first frame's header and again inside its payload
        let chunks = vec![
            Bytes::copy_from_slice(&full[0..3]),
            Bytes::copy_from_slice(&full[3..10]),
            Bytes::copy_from_slice(&full[10..]),
        ];

        let out = collect(chunks).await;
        assert_eq!(
            out,
            vec![
                TtyChunk::StdOut(b"hello ".to_vec()),
                TtyChunk::StdErr(b"oops".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn handles_multiple_frames_in_one_chunk() {
        let mut full = frame(1, b"one");
        full.extend(frame(1, b"two"));

        let out = collect(vec![Bytes::copy_from_slice(&full)]).await;
        assert_eq!(
            out,
            vec![
                TtyChunk::StdOut(b"one".to_vec()),
                TtyChunk::StdOut(b"two".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn falls_back_to_raw_stdout_for_unframed_podman_output() {
        let chunks = vec![
            Bytes::from_static(b"just some "),
            Bytes::from_static(b"plain text"),
        ];

        let out = collect(chunks).await;
        assert_eq!(
            out,
            vec![
                TtyChunk::StdOut(b"just some ".to_vec()),
                TtyChunk::StdOut(b"plain text".to_vec()),
            ]
        );
    }
}
