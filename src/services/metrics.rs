use std::{collections::VecDeque, sync::Mutex};

use serde::Serialize;

/// One recommendation run, as seen by the metrics ring
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSample {
    pub latency_ms: u64,
    pub candidates: usize,
    pub vector_count: usize,
    pub keyword_count: usize,
    pub cache_hit: bool,
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub capacity: usize,
    pub count: usize,
    pub cache_hit_rate: f64,
    pub degraded_rate: f64,
    pub mean_latency_ms: f64,
    pub max_latency_ms: u64,
}

/// Fixed-size buffer of the latest pipeline samples; the oldest is dropped when full
#[derive(Debug)]
pub struct MetricsRing {
    capacity: usize,
    samples: Mutex<VecDeque<PipelineSample>>,
}

impl MetricsRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn record(&self, sample: PipelineSample) {
        // Samples stay valid after a poisoned push
        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    pub fn snapshot(&self) -> Vec<PipelineSample> {
        let samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        samples.iter().cloned().collect()
    }

    pub fn summary(&self) -> MetricsSummary {
        let samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        let count = samples.len();
        let rate = |hits: usize| {
            if count == 0 {
                0.0
            } else {
                hits as f64 / count as f64
            }
        };

        let total_latency: u64 = samples.iter().map(|s| s.latency_ms).sum();

        MetricsSummary {
            capacity: self.capacity,
            count,
            cache_hit_rate: rate(samples.iter().filter(|s| s.cache_hit).count()),
            degraded_rate: rate(samples.iter().filter(|s| s.degraded).count()),
            mean_latency_ms: if count == 0 {
                0.0
            } else {
                total_latency as f64 / count as f64
            },
            max_latency_ms: samples.iter().map(|s| s.latency_ms).max().unwrap_or(0),
        }
    }
}
