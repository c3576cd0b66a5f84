use std::cmp;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures::Stream;
use pin_project::pin_project;
use tracing::warn;

/// Slices a byte stream without buffering it: discards the first `start` bytes,
/// then yields exactly `length` bytes and ends.
///
/// The inner stream is dropped as soon as the range has been produced, when
/// it fails, or when it ends early. Dropping the `RangedStream` itself (for
/// instance when the client goes away) drops the inner stream too.
#[pin_project]
pub struct RangedStream<S> {
    state: StreamState,
    #[pin]
    inner: Option<S>,
}

impl<S> RangedStream<S> {
    pub fn new(inner: S, start: u64, length: u64) -> Self {
        let state = if start > 0 {
            StreamState::Skipping { skip: start, remaining: length }
        } else {
            StreamState::Taking { remaining: length }
        };

        RangedStream { state, inner: Some(inner) }
    }

    /// Whether the inner stream has been released.
    pub fn is_released(&self) -> bool {
        self.inner.is_none()
    }
}

#[derive(Debug, Clone, Copy)]
enum StreamState {
    Skipping { skip: u64, remaining: u64 },
    Taking { remaining: u64 },
    Done,
}

impl StreamState {
    fn remaining(&self) -> u64 {
        match *self {
            StreamState::Skipping { remaining, .. } => remaining,
            StreamState::Taking { remaining } => remaining,
            StreamState::Done => 0,
        }
    }
}

impl<S, E> Stream for RangedStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let StreamState::Done = *this.state {
                this.inner.set(None);
                return Poll::Ready(None);
            }

            let Some(inner) = this.inner.as_mut().as_pin_mut() else {
                return Poll::Ready(None);
            };

            let mut chunk = match ready!(inner.poll_next(cx)) {
                Some(Ok(chunk)) => chunk,
                Some(Err(err)) => {
                    *this.state = StreamState::Done;
                    this.inner.set(None);
                    return Poll::Ready(Some(Err(err)));
                }
                None => {
                    let remaining = this.state.remaining();
                    warn!(remaining, "stream ended before requested range was filled");
                    *this.state = StreamState::Done;
                    this.inner.set(None);
                    return Poll::Ready(None);
                }
            };

            let remaining = match *this.state {
                StreamState::Skipping { skip, remaining } => {
                    let chunk_len = chunk.len() as u64;
                    if chunk_len <= skip {
                        *this.state = StreamState::Skipping { skip: skip - chunk_len, remaining };
                        continue;
                    }
                    // skip < chunk_len, so it fits in usize
                    chunk = chunk.slice(skip as usize..);
                    remaining
                }
                StreamState::Taking { remaining } => remaining,
                StreamState::Done => unreachable!(),
            };

            if chunk.is_empty() {
                *this.state = StreamState::Taking { remaining };
                continue;
            }

            let n = cmp::min(remaining, chunk.len() as u64);
            chunk.truncate(n as usize);

            *this.state = match remaining - n {
                0 => StreamState::Done,
                remaining => StreamState::Taking { remaining },
            };

            if let StreamState::Done = *this.state {
                this.inner.set(None);
            }

            return Poll::Ready(Some(Ok(chunk)));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use futures::{stream, StreamExt};

    use super::*;

    async fn collect<S: Stream<Item = io::Result<Bytes>>>(stream: S) -> String {
        let mut string = String::new();
        futures::pin_mut!(stream);
        while let Some(chunk) = stream.next().await.transpose().unwrap() {
            string += std::str::from_utf8(&chunk).unwrap();
        }
        string
    }

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = io::Result<Bytes>> {
        let parts: Vec<_> = parts
            .iter()
            .map(|part| Ok(Bytes::from_static(part.as_bytes())))
            .collect();
        stream::iter(parts)
    }

    /// Flags when the wrapped stream is dropped.
    struct DropFlag<S> {
        inner: S,
        dropped: Arc<AtomicBool>,
    }

    impl<S> Drop for DropFlag<S> {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    impl<S: Stream + Unpin> Stream for DropFlag<S> {
        type Item = S::Item;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<S::Item>> {
            self.inner.poll_next_unpin(cx)
        }
    }

    #[tokio::test]
    async fn test_take_from_start() {
        let ranged = RangedStream::new(chunks(&["Hello ", "world ", "this is a stream"]), 0, 8);
        assert_eq!("Hello wo", collect(ranged).await);
    }

    #[tokio::test]
    async fn test_skip_across_chunks() {
        let ranged = RangedStream::new(chunks(&["Hello ", "world ", "this is a stream"]), 8, 9);
        assert_eq!("rld this ", collect(ranged).await);
    }

    #[tokio::test]
    async fn test_skip_exact_chunk_boundary() {
        let ranged = RangedStream::new(chunks(&["Hello ", "world ", "this is a stream"]), 6, 6);
        assert_eq!("world ", collect(ranged).await);
    }

    #[tokio::test]
    async fn test_stream_shorter_than_range() {
        let ranged = RangedStream::new(chunks(&["Hello ", "world"]), 6, 100);
        assert_eq!("world", collect(ranged).await);

        let ranged = RangedStream::new(chunks(&["Hello"]), 10, 5);
        assert_eq!("", collect(ranged).await);
    }

    #[tokio::test]
    async fn test_forwards_errors() {
        let inner = stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone")),
            Ok(Bytes::from_static(b"def")),
        ]);
        let mut ranged = RangedStream::new(inner, 1, 10);

        assert_eq!(Bytes::from_static(b"bc"), ranged.next().await.unwrap().unwrap());
        assert_eq!(io::ErrorKind::BrokenPipe, ranged.next().await.unwrap().unwrap_err().kind());
        assert!(ranged.next().await.is_none());
        assert!(ranged.is_released());
    }

    #[tokio::test]
    async fn test_releases_inner_when_range_is_filled() {
        let dropped = Arc::new(AtomicBool::new(false));
        let digits = stream::repeat_with(|| Ok::<_, io::Error>(Bytes::from_static(b"0123456789")));
        let inner = DropFlag { inner: digits, dropped: dropped.clone() };
        let mut ranged = RangedStream::new(inner, 5, 10);

        assert_eq!(Bytes::from_static(b"56789"), ranged.next().await.unwrap().unwrap());
        assert!(!dropped.load(Ordering::SeqCst));
        assert_eq!(Bytes::from_static(b"01234"), ranged.next().await.unwrap().unwrap());
        assert!(dropped.load(Ordering::SeqCst));
        assert!(ranged.next().await.is_none());
    }

    #[tokio::test]
    async fn test_releases_inner_on_early_drop() {
        let dropped = Arc::new(AtomicBool::new(false));
        let pairs = stream::repeat_with(|| Ok::<_, io::Error>(Bytes::from_static(b"xy")));
        let inner = DropFlag { inner: pairs, dropped: dropped.clone() };
        let mut ranged = RangedStream::new(inner, 0, 1000);

        ranged.next().await.unwrap().unwrap();
        drop(ranged);
        assert!(dropped.load(Ordering::SeqCst));
    }
}
