//! Simulation metrics.

use std::collections::VecDeque;

use serde::Serialize;

/// Client-side view of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationMetrics {
    /// Operations attempted.
    pub total_operations: u64,
    /// Operations that committed.
    pub committed: u64,
    /// Operations rejected for invalid input or insufficient balance.
    pub rejected: u64,
    /// Operations that failed in the store or timed out.
    pub failed: u64,
    /// Latency samples of committed operations (µs).
    #[serde(skip)]
    latency_samples: VecDeque<u64>,
    #[serde(skip)]
    max_samples: usize,
}

impl SimulationMetrics {
    pub fn new() -> Self {
        Self {
            total_operations: 0,
            committed: 0,
            rejected: 0,
            failed: 0,
            latency_samples: VecDeque::with_capacity(10000),
            max_samples: 10000,
        }
    }

    pub fn record_commit(&mut self, latency_us: u64) {
        self.total_operations += 1;
        self.committed += 1;

        if self.latency_samples.len() >= self.max_samples {
            self.latency_samples.pop_front();
        }
        self.latency_samples.push_back(latency_us);
    }

    pub fn record_rejection(&mut self) {
        self.total_operations += 1;
        self.rejected += 1;
    }

    pub fn record_failure(&mut self) {
        self.total_operations += 1;
        self.failed += 1;
    }

    pub fn average_latency_us(&self) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.latency_samples.iter().sum();
        sum / self.latency_samples.len() as u64
    }

    pub fn p50_latency_us(&self) -> u64 {
        self.percentile_latency(50)
    }

    pub fn p99_latency_us(&self) -> u64 {
        self.percentile_latency(99)
    }

    fn percentile_latency(&self, percentile: usize) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let mut sorted: Vec<_> = self.latency_samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Operations per second over `elapsed`.
    pub fn throughput(&self, elapsed: std::time::Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }

        self.total_operations as f64 / secs
    }
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics() {
        let mut metrics = SimulationMetrics::new();

        metrics.record_commit(100);
        metrics.record_commit(200);
        metrics.record_commit(150);
        metrics.record_rejection();

        assert_eq!(metrics.total_operations, 4);
        assert_eq!(metrics.committed, 3);
        assert_eq!(metrics.rejected, 1);
        assert_eq!(metrics.failed, 0);
        assert_eq!(metrics.average_latency_us(), 150);
        assert_eq!(metrics.p50_latency_us(), 150);
        assert_eq!(metrics.p99_latency_us(), 200);
    }

    #[test]
    fn test_latency_window_is_bounded() {
        let mut metrics = SimulationMetrics::new();
        for latency in 0..10_500u64 {
            metrics.record_commit(latency);
        }

        assert_eq!(metrics.committed, 10_500);
        assert_eq!(metrics.p50_latency_us(), 5_500);
        assert_eq!(metrics.p99_latency_us(), 10_400);
    }

    #[test]
    fn test_empty_metrics() {
        let metrics = SimulationMetrics::default();
        assert_eq!(metrics.p99_latency_us(), 0);
        assert_eq!(metrics.average_latency_us(), 0);
        assert_eq!(metrics.throughput(std::time::Duration::ZERO), 0.0);
    }
}
