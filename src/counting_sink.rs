use std::{
    io::{self, IoSlice},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::ready;
use log::{trace, warn};
use pin_project::pin_project;
use tokio::io::AsyncWrite;

use crate::listener::ProgressListener;

/// Pass-through writer that counts the bytes its inner writer accepts and reports
/// the running total to a [`ProgressListener`] after every accepted chunk.
///
/// One sink covers one write-out attempt; the count starts at zero.
#[pin_project]
pub struct CountingSink<W> {
    #[pin]
    inner: W,
    bytes_written: u64,
    content_length: i64,
    listener: Arc<dyn ProgressListener>,
}

impl<W> CountingSink<W> {
    pub fn new(inner: W, content_length: i64, listener: Arc<dyn ProgressListener>) -> Self {
        Self {
            inner,
            bytes_written: 0,
            content_length,
            listener,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn content_length(&self) -> i64 {
        self.content_length
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite> CountingSink<W> {
    fn record(self: Pin<&mut Self>, written: usize) -> io::Result<()> {
        if written == 0 {
            return Ok(());
        }
        let this = self.project();
        let previous = *this.bytes_written;
        *this.bytes_written += written as u64;
        let total = *this.bytes_written;
        let content_length = *this.content_length;
        trace!("forwarded {written} bytes, {total} total");

        // unknown length never completes from the count alone
        let done = content_length >= 0 && total == content_length as u64;
        if content_length >= 0 && previous <= content_length as u64 && total > content_length as u64
        {
            warn!("body wrote {total} bytes, more than its declared length of {content_length}");
        }
        this.listener
            .update(total, content_length, done)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

impl<W: AsyncWrite> AsyncWrite for CountingSink<W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let written = ready!(self.as_mut().project().inner.poll_write(cx, buf))?;
        self.record(written)?;
        Poll::Ready(Ok(written))
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let written = ready!(self.as_mut().project().inner.poll_write_vectored(cx, bufs))?;
        self.record(written)?;
        Poll::Ready(Ok(written))
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}
