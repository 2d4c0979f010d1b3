//! Progress reporting for streamed HTTP request bodies.
//!
//! A [`CountingBody`] wraps any [`RequestBody`] and reports every byte the HTTP
//! client accepts to a [`ProgressListener`], without buffering the payload.

mod body;
mod config;
mod counting_body;
mod counting_sink;
mod error;
mod listener;
mod stream;
mod upload;

pub use body::{BytesBody, FileBody, RequestBody, UNKNOWN_LENGTH};
pub use config::Config;
pub use counting_body::{CountingBody, DEFAULT_BUFFER_CAPACITY};
pub use counting_sink::CountingSink;
pub use error::UploadError;
pub use listener::{Fanout, LogProgress, MetricsProgress, ProgressListener};
pub use stream::{BodyStream, DEFAULT_PIPE_CAPACITY};
pub use upload::send_form;
