//! Checksum an upload while it streams into the blob store.

use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

#[derive(Default)]
struct State {
    hasher: blake3::Hasher,
    bytes: u64,
}

pin_project! {
    /// Feeds every byte read through it into a BLAKE3 hasher.
    ///
    /// The reader is usually boxed and handed to a blob store, which consumes
    /// it; the matching [`DigestHandle`] reads the result afterwards.
    pub struct HashingReader<R> {
        #[pin]
        inner: R,
        state: Arc<Mutex<State>>,
        limit: u64,
    }
}

/// Read side of a [`HashingReader`].
#[derive(Clone)]
pub struct DigestHandle {
    state: Arc<Mutex<State>>,
}

impl<R: AsyncRead> HashingReader<R> {
    /// Wrap `inner`, failing reads once more than `limit` bytes have passed.
    pub fn new(inner: R, limit: u64) -> (Self, DigestHandle) {
        let state = Arc::new(Mutex::new(State::default()));
        (Self { inner, state: Arc::clone(&state), limit }, DigestHandle { state })
    }
}

impl<R: AsyncRead> AsyncRead for HashingReader<R> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.project();
        let before = buf.filled().len();
        match this.inner.poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let chunk = &buf.filled()[before..];
                let mut state = this.state.lock().unwrap_or_else(PoisonError::into_inner);
                state.bytes += chunk.len() as u64;
                if state.bytes > *this.limit {
                    return Poll::Ready(Err(io::Error::new(io::ErrorKind::InvalidData, "stream exceeds size limit")));
                }
                state.hasher.update(chunk);
                Poll::Ready(Ok(()))
            },
            other => other,
        }
    }
}

impl DigestHandle {
    /// Bytes seen so far.
    pub fn bytes(&self) -> u64 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).bytes
    }

    /// Hex-encoded BLAKE3 digest of the bytes seen so far.
    pub fn checksum(&self) -> String {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).hasher.finalize().to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_digest_matches_one_shot_hash() {
        let body = b"the quick brown fox jumps over the lazy dog".repeat(1000);
        let (mut reader, digest) = HashingReader::new(body.as_slice(), u64::MAX);
        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).await.unwrap();
        assert_eq!(sink, body);
        assert_eq!(digest.bytes(), body.len() as u64);
        assert_eq!(digest.checksum(), blake3::hash(&body).to_hex().to_string());
    }

    #[tokio::test]
    async fn test_digest_readable_after_reader_dropped() {
        let (reader, digest) = HashingReader::new(&b"abc"[..], 3);
        let mut boxed: Pin<Box<dyn AsyncRead + Send>> = Box::pin(reader);
        let mut sink = Vec::new();
        boxed.read_to_end(&mut sink).await.unwrap();
        drop(boxed);
        assert_eq!(digest.bytes(), 3);
        assert_eq!(digest.checksum(), blake3::hash(b"abc").to_hex().to_string());
    }

    #[tokio::test]
    async fn test_limit_enforced() {
        let (mut reader, _digest) = HashingReader::new(&b"0123456789"[..], 4);
        let mut sink = Vec::new();
        let err = reader.read_to_end(&mut sink).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
