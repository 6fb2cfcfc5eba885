//! Phase-timestamp recording for a single HTTP exchange.
//!
//! The exchange marks phase boundaries on a [`PhaseRecorder`] as it crosses
//! them. Request-written and first-byte boundaries happen inside hyper, so
//! they are captured by [`TracedStream`], an I/O wrapper sitting directly
//! below the HTTP codec (above TLS). [`PhaseRecorder::apply`] turns the
//! timestamps into phase durations on a [`CheckResult`].

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::CheckResult;

/// Timestamps observed on the wire by a [`TracedStream`].
#[derive(Debug, Default)]
pub struct StreamMarks {
    inner: Mutex<WireMarks>,
}

#[derive(Debug, Default, Clone, Copy)]
struct WireMarks {
    last_write: Option<Instant>,
    first_read: Option<Instant>,
}

impl StreamMarks {
    fn wrote(&self) {
        let mut marks = self.inner.lock();
        // Writes after the response started belong to the body, not the request.
        if marks.first_read.is_none() {
            marks.last_write = Some(Instant::now());
        }
    }

    fn read(&self) {
        let mut marks = self.inner.lock();
        if marks.first_read.is_none() {
            marks.first_read = Some(Instant::now());
        }
    }

    fn snapshot(&self) -> WireMarks {
        *self.inner.lock()
    }
}

/// Records phase-boundary timestamps for one exchange.
#[derive(Debug, Default)]
pub struct PhaseRecorder {
    dns_start: Option<Instant>,
    dns_done: Option<Instant>,
    connect_start: Option<Instant>,
    connect_done: Option<Instant>,
    tls_start: Option<Instant>,
    tls_done: Option<Instant>,
    body_done: Option<Instant>,
    wire: Arc<StreamMarks>,
}

impl PhaseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything recorded so far. Used when a redirect starts a new hop.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn dns_start(&mut self) {
        self.dns_start = Some(Instant::now());
    }

    pub fn dns_done(&mut self) {
        self.dns_done = Some(Instant::now());
    }

    pub fn connect_start(&mut self) {
        self.connect_start = Some(Instant::now());
    }

    pub fn connect_done(&mut self) {
        self.connect_done = Some(Instant::now());
    }

    pub fn tls_start(&mut self) {
        self.tls_start = Some(Instant::now());
    }

    pub fn tls_done(&mut self) {
        self.tls_done = Some(Instant::now());
    }

    pub fn body_done(&mut self) {
        self.body_done = Some(Instant::now());
    }

    /// Wrap the connection the HTTP codec will talk over.
    pub fn wrap<S>(&self, stream: S) -> TracedStream<S> {
        TracedStream {
            inner: stream,
            marks: self.wire.clone(),
        }
    }

    /// Write the phase durations recorded so far into `result`.
    ///
    /// A phase whose start or end was never reached yields zero.
    pub fn apply(&self, result: &mut CheckResult) {
        let wire = self.wire.snapshot();

        result.dns_lookup = span(self.dns_start, self.dns_done);
        result.tcp_connection = span(self.connect_start, self.connect_done);
        result.tls_handshake = span(self.tls_start, self.tls_done);
        result.server_processing = span(wire.last_write, wire.first_read);
        result.content_transfer = span(wire.first_read, self.body_done);
    }
}

fn span(start: Option<Instant>, end: Option<Instant>) -> Duration {
    match (start, end) {
        (Some(start), Some(end)) => end.saturating_duration_since(start),
        _ => Duration::ZERO,
    }
}

/// I/O wrapper that reports request-written and first-byte timestamps.
pub struct TracedStream<S> {
    inner: S,
    marks: Arc<StreamMarks>,
}

impl<S: AsyncRead + Unpin> AsyncRead for TracedStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            if buf.filled().len() > before {
                self.marks.read();
            }
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TracedStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = poll {
            if n > 0 {
                self.marks.wrote();
            }
        }
        poll
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write_vectored(cx, bufs);
        if let Poll::Ready(Ok(n)) = poll {
            if n > 0 {
                self.marks.wrote();
            }
        }
        poll
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
