//! Event recording
//!
//! Recorders receive raw bytes for named events (for example the host the
//! router was asked to dial). Which recorder gets which event is decided by
//! `RecorderObject` entries handed to the router.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::Result;

/// Event names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordEvent {
    /// Client address of an accepted connection
    ClientAddress,
    /// Host the router is about to dial
    DialAddress,
    /// Host the router failed to dial
    DialAddressError,
}

impl RecordEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordEvent::ClientAddress => "recorder.service.client.address",
            RecordEvent::DialAddress => "recorder.service.router.dial.address",
            RecordEvent::DialAddressError => "recorder.service.router.dial.address.error",
        }
    }
}

impl std::fmt::Display for RecordEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait Recorder: Send + Sync {
    async fn record(&self, data: &[u8]) -> Result<()>;
}

/// Binds a recorder to one event
#[derive(Clone)]
pub struct RecorderObject {
    pub recorder: Arc<dyn Recorder>,
    pub event: RecordEvent,
}

impl RecorderObject {
    pub fn new(event: RecordEvent, recorder: Arc<dyn Recorder>) -> Self {
        Self { recorder, event }
    }
}

/// Appends each record to a file followed by a separator
pub struct FileRecorder {
    path: PathBuf,
    sep: String,
    lock: Mutex<()>,
}

impl FileRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sep: "\n".to_string(),
            lock: Mutex::new(()),
        }
    }

    pub fn with_separator(mut self, sep: impl Into<String>) -> Self {
        self.sep = sep.into();
        self
    }
}

#[async_trait]
impl Recorder for FileRecorder {
    async fn record(&self, data: &[u8]) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let mut buf = Vec::with_capacity(data.len() + self.sep.len());
        buf.extend_from_slice(data);
        buf.extend_from_slice(self.sep.as_bytes());
        file.write_all(&buf).await?;
        Ok(())
    }
}
