use crate::error::Result;
use crate::Storage;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use vigil_common::{merge, Metric, MetricKind};

type MetricMap = BTreeMap<(MetricKind, String), Metric>;

/// In-memory backend.
///
/// A single mutex guards the whole map, so every update is linearized. The
/// lock is never held across an `.await`.
pub struct MemStorage {
    metrics: Mutex<MetricMap>,
    hash_key: String,
}

impl MemStorage {
    /// Creates an empty store. Stored metrics are signed with `hash_key`;
    /// an empty key leaves them unsigned.
    pub fn new(hash_key: impl Into<String>) -> Self {
        Self {
            metrics: Mutex::new(BTreeMap::new()),
            hash_key: hash_key.into(),
        }
    }

    /// Lock the metric map, recovering from a poisoned Mutex if necessary.
    fn lock(&self) -> MutexGuard<'_, MetricMap> {
        self.metrics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Merges one metric under the lock and returns the stored result.
    pub fn apply(&self, metric: Metric) -> Result<Metric> {
        metric.validate()?;
        let key = (metric.kind, metric.id.clone());
        let mut map = self.lock();
        let mut merged = merge(map.get(&key), metric);
        merged.sign(&self.hash_key);
        map.insert(key, merged.clone());
        Ok(merged)
    }

    /// Applies every metric, logging and skipping the ones that fail.
    /// Returns how many were stored.
    pub fn apply_all(&self, metrics: Vec<Metric>) -> usize {
        let mut stored = 0;
        for metric in metrics {
            let id = metric.id.clone();
            match self.apply(metric) {
                Ok(_) => stored += 1,
                Err(e) => tracing::warn!(metric = %id, error = %e, "Skipping metric in batch"),
            }
        }
        stored
    }

    /// Returns every stored metric ordered by `(kind, id)`.
    pub fn snapshot(&self) -> Vec<Metric> {
        self.lock().values().cloned().collect()
    }

    /// Stores metrics verbatim, without merging. Used to restore a
    /// snapshot so counters are not accumulated twice.
    pub fn replace(&self, metrics: impl IntoIterator<Item = Metric>) {
        let mut map = self.lock();
        for mut metric in metrics {
            metric.sign(&self.hash_key);
            map.insert((metric.kind, metric.id.clone()), metric);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[async_trait]
impl Storage for MemStorage {
    async fn get(&self, kind: MetricKind, id: &str) -> Result<Option<Metric>> {
        Ok(self.lock().get(&(kind, id.to_string())).cloned())
    }

    async fn update(&self, metric: Metric) -> Result<Metric> {
        self.apply(metric)
    }

    async fn update_all(&self, metrics: Vec<Metric>) -> Result<()> {
        self.apply_all(metrics);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Metric>> {
        Ok(self.snapshot())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
