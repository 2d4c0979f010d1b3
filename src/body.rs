use std::{io, path::PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{
    fs::File,
    io::{AsyncWrite, AsyncWriteExt},
};

/// Content length reported for bodies whose size is not known up front.
pub const UNKNOWN_LENGTH: i64 = -1;

/// Producer of an outgoing request payload.
///
/// A body is immutable once built: `write_to` may run more than once (e.g. on a
/// retried request) and must emit the same bytes every time.
#[async_trait]
pub trait RequestBody: Send + Sync {
    fn media_type(&self) -> Option<&str>;

    /// Total byte count `write_to` will produce, or [`UNKNOWN_LENGTH`].
    fn content_length(&self) -> io::Result<i64>;

    async fn write_to(&self, sink: &mut (dyn AsyncWrite + Unpin + Send)) -> io::Result<()>;
}

/// A payload held in memory.
#[derive(Clone, Debug)]
pub struct BytesBody {
    media_type: Option<String>,
    bytes: Bytes,
}

impl BytesBody {
    pub fn new(media_type: Option<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            media_type,
            bytes: bytes.into(),
        }
    }
}

#[async_trait]
impl RequestBody for BytesBody {
    fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    fn content_length(&self) -> io::Result<i64> {
        Ok(self.bytes.len() as i64)
    }

    async fn write_to(&self, sink: &mut (dyn AsyncWrite + Unpin + Send)) -> io::Result<()> {
        sink.write_all(&self.bytes).await
    }
}

/// A file streamed from disk. The length is read from file metadata on every query.
#[derive(Clone, Debug)]
pub struct FileBody {
    media_type: Option<String>,
    path: PathBuf,
}

impl FileBody {
    pub fn new(media_type: Option<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            media_type,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn file_name(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|x| x.to_string_lossy().into_owned())
    }
}

#[async_trait]
impl RequestBody for FileBody {
    fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    fn content_length(&self) -> io::Result<i64> {
        Ok(std::fs::metadata(&self.path)?.len() as i64)
    }

    async fn write_to(&self, sink: &mut (dyn AsyncWrite + Unpin + Send)) -> io::Result<()> {
        let mut file = File::open(&self.path).await?;
        tokio::io::copy(&mut file, sink).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bytes_body_metadata_and_payload() {
        let body = BytesBody::new(Some("image/png".to_string()), vec![0u8; 16]);
        assert_eq!(body.media_type(), Some("image/png"));
        assert_eq!(body.content_length().unwrap(), 16);

        let mut out = Vec::new();
        body.write_to(&mut out).await.unwrap();
        assert_eq!(out, vec![0u8; 16]);
    }

    #[tokio::test]
    async fn file_body_streams_file() {
        let path = std::env::temp_dir().join(format!("file_body_{}.bin", std::process::id()));
        let payload: Vec<u8> = (0..10_000u32).map(|x| (x % 251) as u8).collect();
        tokio::fs::write(&path, &payload).await.unwrap();

        let body = FileBody::new(None, &path);
        assert_eq!(body.media_type(), None);
        assert_eq!(body.content_length().unwrap(), payload.len() as i64);

        let mut out = Vec::new();
        body.write_to(&mut out).await.unwrap();
        assert_eq!(out, payload);

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[test]
    fn missing_file_length_fails() {
        let body = FileBody::new(None, "/nonexistent/upload/file.png");
        assert!(body.content_length().is_err());
        assert_eq!(body.file_name().as_deref(), Some("file.png"));
    }
}
