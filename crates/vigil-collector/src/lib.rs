//! Metric collection framework for the vigil agent.
//!
//! Each [`Collector`] implementation gathers a specific category of host
//! metrics (CPU, memory, load, network, agent runtime) and returns them as
//! gauges or counters ready to be merged into the agent's local store.

pub mod cpu;
pub mod load;
pub mod memory;
pub mod network;
pub mod runtime;

use anyhow::Result;
use vigil_common::Metric;

/// A host metric collector that runs on the agent.
///
/// Implementations are registered in the agent's poll loop and called at
/// each poll interval. The trait requires `Send + Sync` so the collector
/// set can live inside a spawned task.
pub trait Collector: Send + Sync {
    /// Returns the collector name (e.g., `"cpu"`, `"network"`), used for
    /// logging.
    fn name(&self) -> &str;

    /// Collects current metric values.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying system API call fails.
    fn collect(&mut self) -> Result<Vec<Metric>>;
}

/// Every collector the agent ships with.
pub fn default_collectors() -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(cpu::CpuCollector::new()),
        Box::new(memory::MemoryCollector::new()),
        Box::new(load::LoadCollector::new()),
        Box::new(network::NetworkCollector::new()),
        Box::new(runtime::RuntimeCollector::new()),
    ]
}
