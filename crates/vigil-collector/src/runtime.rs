use crate::Collector;
use anyhow::Result;
use rand::Rng;
use vigil_common::Metric;

/// Agent bookkeeping metrics: a poll counter and a random gauge that lets
/// the collector side observe every delivered batch.
pub struct RuntimeCollector;

impl RuntimeCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RuntimeCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for RuntimeCollector {
    fn name(&self) -> &str {
        "runtime"
    }

    fn collect(&mut self) -> Result<Vec<Metric>> {
        let random: f64 = rand::thread_rng().gen();
        Ok(vec![
            Metric::counter("PollCount", 1),
            Metric::gauge("RandomValue", random),
        ])
    }
}
