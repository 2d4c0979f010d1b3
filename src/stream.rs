use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures::{ready, FutureExt, Stream};
use log::debug;
use pin_project::{pin_project, pinned_drop};
use reqwest::multipart::Part;
use tokio::{
    io::{duplex, AsyncWriteExt, DuplexStream},
    task::JoinHandle,
};
use tokio_util::io::ReaderStream;

use crate::{
    body::RequestBody,
    counting_body::CountingBody,
    error::UploadError,
};

/// Size of the in-memory pipe between a body's write-out and the HTTP client.
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Pull-based view of a [`CountingBody`] for HTTP clients that consume a byte stream.
///
/// The first poll spawns the body's write-out into one end of a bounded pipe; the
/// stream yields what arrives at the other end. Progress therefore advances as the
/// client drains the stream. A failed write-out is yielded as the final item.
/// Dropping the stream aborts the write-out.
#[pin_project(PinnedDrop)]
pub struct BodyStream {
    #[pin]
    reader: ReaderStream<DuplexStream>,
    pending: Option<(CountingBody, DuplexStream)>,
    writer: Option<JoinHandle<io::Result<()>>>,
}

impl BodyStream {
    pub fn new(body: CountingBody, pipe_capacity: usize) -> Self {
        let (pipe, reader) = duplex(pipe_capacity);
        Self {
            reader: ReaderStream::with_capacity(reader, pipe_capacity),
            pending: Some((body, pipe)),
            writer: None,
        }
    }
}

impl Stream for BodyStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if let Some((body, mut pipe)) = this.pending.take() {
            *this.writer = Some(tokio::spawn(async move {
                body.write_to(&mut pipe).await?;
                pipe.shutdown().await
            }));
        }

        if let Some(chunk) = ready!(this.reader.poll_next(cx)) {
            return Poll::Ready(Some(chunk));
        }
        let Some(writer) = this.writer.as_mut() else {
            return Poll::Ready(None);
        };
        let result = ready!(writer.poll_unpin(cx));
        *this.writer = None;
        match result {
            Ok(Ok(())) => Poll::Ready(None),
            Ok(Err(e)) => Poll::Ready(Some(Err(e))),
            Err(e) => Poll::Ready(Some(Err(io::Error::new(io::ErrorKind::Other, e)))),
        }
    }
}

#[pinned_drop]
impl PinnedDrop for BodyStream {
    fn drop(self: Pin<&mut Self>) {
        if let Some(writer) = self.project().writer.take() {
            if !writer.is_finished() {
                debug!("upload body dropped before it was fully written");
                writer.abort();
            }
        }
    }
}

impl CountingBody {
    pub fn into_stream(self, pipe_capacity: usize) -> BodyStream {
        BodyStream::new(self, pipe_capacity)
    }

    pub fn into_reqwest_body(self, pipe_capacity: usize) -> reqwest::Body {
        reqwest::Body::wrap_stream(self.into_stream(pipe_capacity))
    }

    /// Builds a multipart file part, declaring the length when it is known.
    pub fn into_part(
        self,
        file_name: Option<String>,
        pipe_capacity: usize,
    ) -> Result<Part, UploadError> {
        let length = self.declared_length();
        let media_type = self.media_type().map(str::to_string);
        let body = self.into_reqwest_body(pipe_capacity);

        let mut part = if length >= 0 {
            Part::stream_with_length(body, length as u64)
        } else {
            Part::stream(body)
        };
        if let Some(file_name) = file_name {
            part = part.file_name(file_name);
        }
        if let Some(media_type) = media_type {
            part = part
                .mime_str(&media_type)
                .map_err(|e| UploadError::InvalidMediaType(media_type.clone(), e))?;
        }
        Ok(part)
    }
}
