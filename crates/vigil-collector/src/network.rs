use crate::Collector;
use anyhow::Result;
use std::collections::HashMap;
use sysinfo::Networks;
use vigil_common::Metric;

/// Reports per-interface traffic as counters.
///
/// Each poll emits the bytes seen since the previous poll, so the receiving
/// store accumulates them into running totals. The first poll of an
/// interface only records a baseline and reports a zero delta.
pub struct NetworkCollector {
    networks: Networks,
    prev_received: HashMap<String, u64>,
    prev_transmitted: HashMap<String, u64>,
}

impl NetworkCollector {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
            prev_received: HashMap::new(),
            prev_transmitted: HashMap::new(),
        }
    }
}

impl Default for NetworkCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn delta_since(prev: &mut HashMap<String, u64>, name: &str, current: u64) -> i64 {
    let previous = prev.insert(name.to_string(), current).unwrap_or(current);
    i64::try_from(current.saturating_sub(previous)).unwrap_or(i64::MAX)
}

impl Collector for NetworkCollector {
    fn name(&self) -> &str {
        "network"
    }

    fn collect(&mut self) -> Result<Vec<Metric>> {
        self.networks.refresh();
        let mut metrics = Vec::new();

        for (name, data) in self.networks.iter() {
            let rx = delta_since(&mut self.prev_received, name, data.total_received());
            let tx = delta_since(&mut self.prev_transmitted, name, data.total_transmitted());

            metrics.push(Metric::counter(format!("NetworkReceivedBytes.{name}"), rx));
            metrics.push(Metric::counter(format!("NetworkSentBytes.{name}"), tx));
        }

        Ok(metrics)
    }
}
