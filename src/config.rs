use std::{io, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{counting_body::DEFAULT_BUFFER_CAPACITY, stream::DEFAULT_PIPE_CAPACITY};

fn default_url() -> Url {
    "http://127.0.0.1:5000/".parse().unwrap()
}

fn default_field() -> String {
    "file".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

fn default_pipe_capacity() -> usize {
    DEFAULT_PIPE_CAPACITY
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_url")]
    pub url: Url,
    /// multipart field carrying the uploaded body
    #[serde(default = "default_field")]
    pub field: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    // 0 disables buffering in front of the counting sink
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    #[serde(default = "default_pipe_capacity")]
    pub pipe_capacity: usize,
    /// if true, prometheus metrics are printed after the upload
    #[serde(default)]
    pub metrics: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: default_url(),
            field: default_field(),
            timeout_secs: default_timeout_secs(),
            buffer_capacity: default_buffer_capacity(),
            pipe_capacity: default_pipe_capacity(),
            metrics: false,
        }
    }
}

impl Config {
    /// Reads a YAML config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_yaml::from_str(&raw)
                .with_context(|| format!("failed to parse config file {}", path.display())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => {
                Err(e).with_context(|| format!("failed to read config file {}", path.display()))
            }
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
