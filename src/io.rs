//! Output targets - where the encoded byte stream goes
//!
//! A target hands the writer a sink, then either commits it (the output
//! becomes visible as a complete file) or aborts it (nothing is left behind).

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use uuid::Uuid;

/// Write buffer used for file output
const FILE_BUFFER_SIZE: usize = 1 << 20;

/// Trait for the destination of a SEG-Y byte stream
#[async_trait]
pub trait OutputTarget: Send + Sync {
    /// Sink the writer appends to
    type Writer: AsyncWrite + Unpin + Send;

    /// Prepare a fresh sink
    async fn open(&self) -> Result<Self::Writer>;

    /// Flush the sink and publish the output as complete
    async fn commit(&self, writer: Self::Writer) -> Result<()>;

    /// Discard everything written to the sink
    async fn abort(&self, writer: Self::Writer);

    /// Human-readable destination for log messages
    fn location(&self) -> String;
}

/// File output staged in a sibling temporary file and renamed into place on commit
#[derive(Debug, Clone)]
pub struct FileTarget {
    destination: PathBuf,
    staging: PathBuf,
}

impl FileTarget {
    pub fn new(destination: impl AsRef<Path>) -> Self {
        let destination = destination.as_ref().to_path_buf();
        let file_name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output.segy".to_string());
        let staging = destination.with_file_name(format!(".{}.{}.partial", file_name, Uuid::new_v4()));
        Self {
            destination,
            staging,
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Temporary path bytes are written to before commit
    pub fn staging_path(&self) -> &Path {
        &self.staging
    }

    async fn discard_staging(&self) {
        if let Err(e) = fs::remove_file(&self.staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    "Could not remove partial output {}: {}",
                    self.staging.display(),
                    e
                );
            }
        }
    }
}

#[async_trait]
impl OutputTarget for FileTarget {
    type Writer = BufWriter<fs::File>;

    async fn open(&self) -> Result<Self::Writer> {
        // Create parent directories if they don't exist
        if let Some(parent) = self.staging.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let file = fs::File::create(&self.staging).await?;
        Ok(BufWriter::with_capacity(FILE_BUFFER_SIZE, file))
    }

    async fn commit(&self, mut writer: Self::Writer) -> Result<()> {
        let published = async {
            writer.flush().await?;
            let file = writer.into_inner();
            file.sync_all().await?;
            drop(file);
            fs::rename(&self.staging, &self.destination).await
        }
        .await;

        if let Err(e) = published {
            self.discard_staging().await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn abort(&self, writer: Self::Writer) {
        drop(writer);
        self.discard_staging().await;
    }

    fn location(&self) -> String {
        self.destination.display().to_string()
    }
}

/// In-memory output; the bytes become available once committed
#[derive(Debug, Clone, Default)]
pub struct MemoryTarget {
    committed: Arc<Mutex<Option<Bytes>>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed bytes, or `None` if nothing was committed
    pub fn contents(&self) -> Option<Bytes> {
        self.committed.lock().clone()
    }
}

#[async_trait]
impl OutputTarget for MemoryTarget {
    type Writer = Vec<u8>;

    async fn open(&self) -> Result<Self::Writer> {
        Ok(Vec::new())
    }

    async fn commit(&self, writer: Self::Writer) -> Result<()> {
        *self.committed.lock() = Some(Bytes::from(writer));
        Ok(())
    }

    async fn abort(&self, writer: Self::Writer) {
        drop(writer);
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
