//! Sink contract
//!
//! Destinations receive encoded bytes through [`Sink`]. A sink is started
//! once, written any number of times, and closed; closing twice is harmless
//! and writing after close fails with [`EgressError::SinkClosed`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use log::{debug, info};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::errors::{EgressError, Result};

#[async_trait]
pub trait Sink: Send + Sync {
    /// Open the destination.
    async fn start(&self) -> Result<()>;

    /// Push a chunk of encoded data, returning the number of bytes accepted.
    async fn write(&self, data: &[u8]) -> Result<usize>;

    /// Flush and release the destination. Idempotent.
    async fn close(&self) -> Result<()>;

    fn name(&self) -> &str;
}

/// Local file under the session working directory.
pub struct FileSink {
    name: String,
    path: PathBuf,
    file: Mutex<Option<File>>,
    closed: AtomicBool,
}

impl FileSink {
    pub fn new(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            path: path.as_ref().to_path_buf(),
            file: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn start(&self) -> Result<()> {
        if self.is_closed() {
            return Err(EgressError::SinkClosed);
        }
        let mut file = self.file.lock().await;
        if file.is_some() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        *file = Some(File::create(&self.path).await?);
        info!("{}: writing to {}", self.name, self.path.display());
        Ok(())
    }

    async fn write(&self, data: &[u8]) -> Result<usize> {
        if self.is_closed() {
            return Err(EgressError::SinkClosed);
        }
        let mut guard = self.file.lock().await;
        let Some(file) = guard.as_mut() else {
            return Err(EgressError::invalid_input(format!(
                "{} written before start",
                self.name
            )));
        };
        file.write_all(data).await?;
        Ok(data.len())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("{}: already closed", self.name);
            return Ok(());
        }
        if let Some(mut file) = self.file.lock().await.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        info!("{}: closed", self.name);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
