use std::{io, sync::Arc};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use crate::{
    body::{RequestBody, UNKNOWN_LENGTH},
    counting_sink::CountingSink,
    listener::ProgressListener,
};

/// Buffer placed between the wrapped body and the counting sink.
pub const DEFAULT_BUFFER_CAPACITY: usize = 8192;

/// Wraps a [`RequestBody`] so every byte it writes is reported to a [`ProgressListener`].
///
/// The wrapper reports the inner body's media type and length unchanged and is
/// itself a [`RequestBody`], so it can stand in anywhere the inner body could.
/// Cloning is cheap; clones share the inner body and listener.
#[derive(Clone)]
pub struct CountingBody {
    inner: Arc<dyn RequestBody>,
    listener: Arc<dyn ProgressListener>,
    buffer_capacity: usize,
}

impl CountingBody {
    /// Wraps `inner` with a write buffer of [`DEFAULT_BUFFER_CAPACITY`] bytes, so the
    /// listener sees buffer-sized chunks rather than the inner body's own writes.
    /// Use [`CountingBody::with_buffer_capacity`] with 0 for per-write callbacks.
    pub fn new(inner: impl RequestBody + 'static, listener: Arc<dyn ProgressListener>) -> Self {
        Self {
            inner: Arc::new(inner),
            listener,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }

    /// Sets the write buffer size. With a capacity of 0 every write of the inner
    /// body reaches the counting sink as-is.
    pub fn with_buffer_capacity(mut self, buffer_capacity: usize) -> Self {
        self.buffer_capacity = buffer_capacity;
        self
    }

    /// Length of the inner body, or [`UNKNOWN_LENGTH`] if it cannot be determined.
    pub fn declared_length(&self) -> i64 {
        match self.inner.content_length() {
            Ok(length) => length,
            Err(e) => {
                warn!("failed to determine body length, reporting unknown: {e}");
                UNKNOWN_LENGTH
            }
        }
    }
}

#[async_trait]
impl RequestBody for CountingBody {
    fn media_type(&self) -> Option<&str> {
        self.inner.media_type()
    }

    fn content_length(&self) -> io::Result<i64> {
        Ok(self.declared_length())
    }

    async fn write_to(&self, sink: &mut (dyn AsyncWrite + Unpin + Send)) -> io::Result<()> {
        let content_length = self.declared_length();
        debug!("writing body, content-length: {content_length}");
        self.listener
            .started(content_length)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        let mut counting = CountingSink::new(sink, content_length, self.listener.clone());
        if self.buffer_capacity == 0 {
            self.inner.write_to(&mut counting).await?;
            counting.flush().await?;
        } else {
            let mut buffered = BufWriter::with_capacity(self.buffer_capacity, &mut counting);
            self.inner.write_to(&mut buffered).await?;
            buffered.flush().await?;
        }

        let bytes_written = counting.bytes_written();
        debug!("body written, {bytes_written} bytes");
        self.listener
            .finished(bytes_written, content_length)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}
