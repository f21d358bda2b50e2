use crate::error::{Result, StorageError};
use crate::memory::MemStorage;
use crate::Storage;
use async_trait::async_trait;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use vigil_common::{Metric, MetricKind};

/// Settings for [`FileStorage`].
#[derive(Debug, Clone)]
pub struct FileStorageConfig {
    /// Snapshot file, created on first dump.
    pub path: PathBuf,
    /// Period of the background dump. Zero dumps after every write.
    pub interval: Duration,
    /// Load the snapshot file at startup.
    pub restore: bool,
}

/// Memory backend with a line-delimited JSON snapshot on disk.
///
/// Each dump appends one line per stored metric. Restoring replays the
/// lines in order, so the last dump wins.
pub struct FileStorage {
    snapshotter: Arc<Snapshotter>,
    sync_dump: bool,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

struct Snapshotter {
    inner: Arc<MemStorage>,
    path: PathBuf,
    // Keeps a periodic dump and the close-time dump from interleaving lines.
    dump_lock: Mutex<()>,
}

impl Snapshotter {
    fn dump(&self) -> Result<()> {
        let _guard = self
            .dump_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let metrics = self.inner.snapshot();
        if metrics.is_empty() {
            return Ok(());
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        for metric in &metrics {
            serde_json::to_writer(&mut writer, metric)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        tracing::debug!(path = %self.path.display(), count = metrics.len(), "Dumped metric snapshot");
        Ok(())
    }
}

impl FileStorage {
    /// Opens the backend, restoring from `config.path` when requested.
    ///
    /// A missing snapshot file yields an empty store; a corrupt line fails
    /// construction. A non-zero interval spawns the background dump task,
    /// so this must run inside a Tokio runtime.
    pub async fn open(config: FileStorageConfig, hash_key: impl Into<String>) -> Result<Self> {
        let inner = Arc::new(MemStorage::new(hash_key));

        if config.restore {
            let restored = read_snapshot(&config.path).await?;
            let count = restored.len();
            inner.replace(restored);
            tracing::info!(path = %config.path.display(), count, "Restored metric snapshot");
        }

        let snapshotter = Arc::new(Snapshotter {
            inner,
            path: config.path,
            dump_lock: Mutex::new(()),
        });

        let sync_dump = config.interval.is_zero();
        let flusher = if sync_dump {
            None
        } else {
            Some(spawn_flusher(Arc::clone(&snapshotter), config.interval))
        };

        Ok(Self {
            snapshotter,
            sync_dump,
            flusher: Mutex::new(flusher),
        })
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.snapshotter.path
    }

    /// Writes the current state to the snapshot file.
    pub async fn dump(&self) -> Result<()> {
        let snapshotter = Arc::clone(&self.snapshotter);
        tokio::task::spawn_blocking(move || snapshotter.dump())
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))?
    }
}

fn spawn_flusher(snapshotter: Arc<Snapshotter>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            ticker.tick().await;
            let snapshotter = Arc::clone(&snapshotter);
            match tokio::task::spawn_blocking(move || snapshotter.dump()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Periodic snapshot dump failed"),
                Err(e) => tracing::warn!(error = %e, "Periodic snapshot task panicked"),
            }
        }
    })
}

async fn read_snapshot(path: &Path) -> Result<Vec<Metric>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "No snapshot file, starting empty");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut metrics = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let metric: Metric = serde_json::from_str(line)
            .map_err(|source| StorageError::Snapshot { line: idx + 1, source })?;
        metric.validate()?;
        metrics.push(metric);
    }
    Ok(metrics)
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self, kind: MetricKind, id: &str) -> Result<Option<Metric>> {
        self.snapshotter.inner.get(kind, id).await
    }

    async fn update(&self, metric: Metric) -> Result<Metric> {
        let stored = self.snapshotter.inner.apply(metric)?;
        if self.sync_dump {
            self.dump().await?;
        }
        Ok(stored)
    }

    async fn update_all(&self, metrics: Vec<Metric>) -> Result<()> {
        self.snapshotter.inner.apply_all(metrics);
        if self.sync_dump {
            self.dump().await?;
        }
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Metric>> {
        Ok(self.snapshotter.inner.snapshot())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let flusher = self
            .flusher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = flusher {
            handle.abort();
        }
        self.dump().await?;
        self.snapshotter.inner.close().await
    }
}
