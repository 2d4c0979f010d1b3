use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytesize::ByteSize;
use log::info;
use prometheus::{register_int_counter_vec, IntCounterVec};

use crate::body::UNKNOWN_LENGTH;

lazy_static::lazy_static! {
    static ref UPLOAD_BYTES: IntCounterVec = register_int_counter_vec!("upload_bytes", "bytes accepted by the upload transport", &["field"]).unwrap();
    static ref UPLOAD_COMPLETE: IntCounterVec = register_int_counter_vec!("upload_complete", "count of bodies fully written", &["field"]).unwrap();
}

/// Receives progress for one body as it is written out.
///
/// `update` runs synchronously on the writing task after every chunk the transport
/// accepts. Returning an error aborts the upload.
pub trait ProgressListener: Send + Sync {
    /// A write-out attempt is starting; the count restarts from zero.
    fn started(&self, _content_length: i64) -> anyhow::Result<()> {
        Ok(())
    }

    fn update(&self, bytes_written: u64, content_length: i64, done: bool) -> anyhow::Result<()>;

    /// End of stream: the body was fully written and flushed. This is the only
    /// completion signal for bodies of unknown length.
    fn finished(&self, _bytes_written: u64, _content_length: i64) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Logs upload progress for a single named body.
pub struct LogProgress {
    name: String,
    first_update: AtomicBool,
}

impl LogProgress {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            first_update: AtomicBool::new(true),
        }
    }
}

impl ProgressListener for LogProgress {
    fn update(&self, bytes_written: u64, content_length: i64, done: bool) -> anyhow::Result<()> {
        if done {
            info!("{}: completed", self.name);
            return Ok(());
        }
        if self.first_update.swap(false, Ordering::Relaxed) {
            if content_length == UNKNOWN_LENGTH {
                info!("{}: content-length: unknown", self.name);
            } else {
                info!(
                    "{}: content-length: {}",
                    self.name,
                    ByteSize(content_length as u64)
                );
            }
        }
        if content_length > 0 {
            info!(
                "{}: {} ({}% done)",
                self.name,
                ByteSize(bytes_written),
                (100 * bytes_written) / content_length as u64
            );
        } else {
            info!("{}: {}", self.name, ByteSize(bytes_written));
        }
        Ok(())
    }

    fn finished(&self, bytes_written: u64, content_length: i64) -> anyhow::Result<()> {
        if content_length == UNKNOWN_LENGTH {
            info!("{}: completed ({})", self.name, ByteSize(bytes_written));
        }
        Ok(())
    }
}

/// Exports upload progress as prometheus counters labelled by form field.
pub struct MetricsProgress {
    field: String,
    // bytes already added to UPLOAD_BYTES for the current attempt
    reported: AtomicU64,
}

impl MetricsProgress {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reported: Default::default(),
        }
    }
}

impl ProgressListener for MetricsProgress {
    fn started(&self, _content_length: i64) -> anyhow::Result<()> {
        self.reported.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn update(&self, bytes_written: u64, _content_length: i64, _done: bool) -> anyhow::Result<()> {
        let previous = self.reported.swap(bytes_written, Ordering::Relaxed);
        UPLOAD_BYTES
            .with_label_values(&[&self.field])
            .inc_by(bytes_written.saturating_sub(previous));
        Ok(())
    }

    fn finished(&self, _bytes_written: u64, _content_length: i64) -> anyhow::Result<()> {
        UPLOAD_COMPLETE.with_label_values(&[&self.field]).inc();
        Ok(())
    }
}

/// Forwards every notification to each listener in order, stopping at the first error.
pub struct Fanout(pub Vec<std::sync::Arc<dyn ProgressListener>>);

impl ProgressListener for Fanout {
    fn started(&self, content_length: i64) -> anyhow::Result<()> {
        for listener in &self.0 {
            listener.started(content_length)?;
        }
        Ok(())
    }

    fn update(&self, bytes_written: u64, content_length: i64, done: bool) -> anyhow::Result<()> {
        for listener in &self.0 {
            listener.update(bytes_written, content_length, done)?;
        }
        Ok(())
    }

    fn finished(&self, bytes_written: u64, content_length: i64) -> anyhow::Result<()> {
        for listener in &self.0 {
            listener.finished(bytes_written, content_length)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Records every notification for later inspection.
    #[derive(Default)]
    pub struct Recorder {
        pub starts: Mutex<Vec<i64>>,
        pub updates: Mutex<Vec<(u64, i64, bool)>>,
        pub finished: Mutex<Vec<(u64, i64)>>,
        /// Fail the update that would report this many bytes.
        pub fail_at: Option<u64>,
    }

    impl Recorder {
        pub fn starts(&self) -> Vec<i64> {
            self.starts.lock().unwrap().clone()
        }

        pub fn updates(&self) -> Vec<(u64, i64, bool)> {
            self.updates.lock().unwrap().clone()
        }

        pub fn finishes(&self) -> Vec<(u64, i64)> {
            self.finished.lock().unwrap().clone()
        }
    }

    impl ProgressListener for Recorder {
        fn started(&self, content_length: i64) -> anyhow::Result<()> {
            self.starts.lock().unwrap().push(content_length);
            Ok(())
        }

        fn update(&self, bytes_written: u64, content_length: i64, done: bool) -> anyhow::Result<()> {
            if self.fail_at == Some(bytes_written) {
                anyhow::bail!("listener rejected {bytes_written} bytes");
            }
            self.updates
                .lock()
                .unwrap()
                .push((bytes_written, content_length, done));
            Ok(())
        }

        fn finished(&self, bytes_written: u64, content_length: i64) -> anyhow::Result<()> {
            self.finished
                .lock()
                .unwrap()
                .push((bytes_written, content_length));
            Ok(())
        }
    }

    #[test]
    fn log_progress_never_fails() {
        let listener = LogProgress::new("file");
        listener.update(1, 4, false).unwrap();
        listener.update(2, 4, false).unwrap();
        listener.update(4, 4, true).unwrap();
        listener.update(10, UNKNOWN_LENGTH, false).unwrap();
        listener.finished(10, UNKNOWN_LENGTH).unwrap();
        assert!(!listener.first_update.load(Ordering::Relaxed));
    }

    #[test]
    fn metrics_count_deltas_and_restart() {
        let field = "metrics_count_deltas_and_restart";
        let listener = MetricsProgress::new(field);
        listener.started(10).unwrap();
        listener.update(3, 10, false).unwrap();
        listener.update(10, 10, true).unwrap();
        listener.finished(10, 10).unwrap();
        assert_eq!(UPLOAD_BYTES.with_label_values(&[field]).get(), 10);
        assert_eq!(UPLOAD_COMPLETE.with_label_values(&[field]).get(), 1);

        listener.started(10).unwrap();
        listener.update(4, 10, false).unwrap();
        assert_eq!(UPLOAD_BYTES.with_label_values(&[field]).get(), 14);
    }

    #[test]
    fn metrics_keep_bytes_of_failed_attempt() {
        let field = "metrics_keep_bytes_of_failed_attempt";
        let listener = MetricsProgress::new(field);
        // first attempt dies after 2 bytes, so finished never runs
        listener.started(10).unwrap();
        listener.update(2, 10, false).unwrap();

        listener.started(10).unwrap();
        listener.update(8, 10, false).unwrap();
        listener.update(10, 10, true).unwrap();
        listener.finished(10, 10).unwrap();

        assert_eq!(UPLOAD_BYTES.with_label_values(&[field]).get(), 12);
        assert_eq!(UPLOAD_COMPLETE.with_label_values(&[field]).get(), 1);
    }

    #[test]
    fn fanout_stops_at_first_error() {
        let failing = Arc::new(Recorder {
            fail_at: Some(2),
            ..Default::default()
        });
        let after = Arc::new(Recorder::default());
        let fanout = Fanout(vec![
            failing.clone() as Arc<dyn ProgressListener>,
            after.clone() as Arc<dyn ProgressListener>,
        ]);

        fanout.update(1, 4, false).unwrap();
        assert!(fanout.update(2, 4, false).is_err());
        assert_eq!(failing.updates(), vec![(1, 4, false)]);
        assert_eq!(after.updates(), vec![(1, 4, false)]);
    }
}
