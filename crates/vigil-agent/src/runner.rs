use crate::reporter::Reporter;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use vigil_collector::Collector;
use vigil_storage::{MemStorage, Storage};

/// The agent's two scheduled tasks: collection into a local store and
/// delivery of that store's contents to the server.
///
/// The two run on independent timers; the store's lock is the only point
/// where they meet.
pub struct Agent {
    storage: Arc<MemStorage>,
    reporter: Arc<dyn Reporter>,
    tasks: Vec<JoinHandle<()>>,
    sends: Arc<Mutex<JoinSet<()>>>,
}

impl Agent {
    /// Spawns the collection and delivery tasks.
    pub fn start(
        collectors: Vec<Box<dyn Collector>>,
        storage: Arc<MemStorage>,
        reporter: Arc<dyn Reporter>,
        poll_interval: Duration,
        report_interval: Duration,
    ) -> Self {
        tracing::info!(
            poll_secs = poll_interval.as_secs_f64(),
            report_secs = report_interval.as_secs_f64(),
            collectors = collectors.len(),
            "Starting agent tasks"
        );

        let sends = Arc::new(Mutex::new(JoinSet::new()));
        let tasks = vec![
            tokio::spawn(collect_loop(collectors, Arc::clone(&storage), poll_interval)),
            tokio::spawn(deliver_loop(
                Arc::clone(&storage),
                Arc::clone(&reporter),
                Arc::clone(&sends),
                report_interval,
            )),
        ];

        Self {
            storage,
            reporter,
            tasks,
            sends,
        }
    }

    pub fn storage(&self) -> &Arc<MemStorage> {
        &self.storage
    }

    /// Cancels both timers, then waits up to `grace` for sends already
    /// started to finish before stopping the reporter. Sends still running
    /// after `grace` are aborted.
    pub async fn stop(self, grace: Duration) {
        for task in &self.tasks {
            task.abort();
        }

        let mut sends = std::mem::take(&mut *lock_sends(&self.sends));
        let pending = sends.len();
        if pending > 0 {
            tracing::info!(pending, "Waiting for in-flight reports");
            let drained = tokio::time::timeout(grace, async {
                while sends.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                tracing::warn!(remaining = sends.len(), "Reports still running after grace period, aborting");
                sends.shutdown().await;
            }
        }

        self.reporter.stop();
        tracing::info!("Agent stopped");
    }
}

fn lock_sends(sends: &Mutex<JoinSet<()>>) -> std::sync::MutexGuard<'_, JoinSet<()>> {
    sends.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn collect_loop(
    mut collectors: Vec<Box<dyn Collector>>,
    storage: Arc<MemStorage>,
    period: Duration,
) {
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tick.tick().await;
        let mut collected = 0usize;
        for collector in &mut collectors {
            let metrics = match collector.collect() {
                Ok(metrics) => metrics,
                Err(e) => {
                    tracing::warn!(collector = collector.name(), error = %e, "Collection failed");
                    continue;
                }
            };
            for metric in metrics {
                let id = metric.id.clone();
                match storage.update(metric).await {
                    Ok(_) => collected += 1,
                    Err(e) => tracing::warn!(metric = %id, error = %e, "Failed to store metric"),
                }
            }
        }
        tracing::debug!(count = collected, "Collected metrics");
    }
}

async fn deliver_loop(
    storage: Arc<MemStorage>,
    reporter: Arc<dyn Reporter>,
    sends: Arc<Mutex<JoinSet<()>>>,
    period: Duration,
) {
    let mut tick = interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tick.tick().await;
        let metrics = match storage.all().await {
            Ok(metrics) if metrics.is_empty() => continue,
            Ok(metrics) => metrics,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to snapshot metrics");
                continue;
            }
        };

        // Each send gets its own task so a slow server does not hold up the
        // next tick; the dispatch client caps how many run at once.
        let reporter = Arc::clone(&reporter);
        let mut sends = lock_sends(&sends);
        while sends.try_join_next().is_some() {}
        sends.spawn(async move {
            let count = metrics.len();
            match reporter.report(metrics).await {
                Ok(()) => tracing::info!(count, "Metrics reported"),
                Err(e) => tracing::warn!(count, error = %e, "Failed to report metrics, dropping batch"),
            }
        });
        drop(sends);
    }
}
