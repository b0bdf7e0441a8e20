use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;

/// Number of samples kept by the uniform reservoir. Offers a 99.9% confidence
/// level with a 5% margin of error assuming a normal distribution.
pub const DEFAULT_RESERVOIR_SIZE: usize = 1028;

/// Point-in-time statistics of a [`Histogram`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub min: i64,
    pub max: i64,
    pub mean: f64,
    pub stddev: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub p99: f64,
    pub p999: f64,
}

#[derive(Debug)]
struct HistogramState {
    count: u64,
    min: i64,
    max: i64,
    samples: Vec<i64>,
}

/// Distribution of recorded values, sampled with Vitter's algorithm R so that
/// memory stays bounded no matter how many values are recorded.
#[derive(Debug)]
pub struct Histogram {
    capacity: usize,
    state: Mutex<HistogramState>,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    pub fn new() -> Self {
        Self::with_reservoir_size(DEFAULT_RESERVOIR_SIZE)
    }

    pub fn with_reservoir_size(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(HistogramState {
                count: 0,
                min: i64::MAX,
                max: i64::MIN,
                samples: Vec::with_capacity(capacity),
            }),
        }
    }

    pub fn record(&self, value: i64) {
        let mut state = self.state.lock();
        state.count += 1;
        state.min = state.min.min(value);
        state.max = state.max.max(value);

        if state.samples.len() < self.capacity {
            state.samples.push(value);
        } else {
            let slot = rand::thread_rng().gen_range(0..state.count);
            if let Ok(slot) = usize::try_from(slot) {
                if slot < self.capacity {
                    state.samples[slot] = value;
                }
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.state.lock().count
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let (count, min, max, mut samples) = {
            let state = self.state.lock();
            (state.count, state.min, state.max, state.samples.clone())
        };
        if samples.is_empty() {
            return HistogramSnapshot::default();
        }
        samples.sort_unstable();

        let n = samples.len() as f64;
        let mean = samples.iter().map(|v| *v as f64).sum::<f64>() / n;
        let stddev = if samples.len() > 1 {
            let variance = samples
                .iter()
                .map(|v| {
                    let diff = *v as f64 - mean;
                    diff * diff
                })
                .sum::<f64>()
                / (n - 1.0);
            variance.sqrt()
        } else {
            0.0
        };

        HistogramSnapshot {
            count,
            min,
            max,
            mean,
            stddev,
            p50: quantile(&samples, 0.5),
            p75: quantile(&samples, 0.75),
            p95: quantile(&samples, 0.95),
            p99: quantile(&samples, 0.99),
            p999: quantile(&samples, 0.999),
        }
    }
}

// `sorted` must be non-empty and sorted ascending.
fn quantile(sorted: &[i64], q: f64) -> f64 {
    let len = sorted.len();
    let pos = q * (len as f64 + 1.0);
    if pos < 1.0 {
        return sorted[0] as f64;
    }
    if pos >= len as f64 {
        return sorted[len - 1] as f64;
    }
    let index = pos.floor();
    let lower = sorted[index as usize - 1] as f64;
    let upper = sorted[index as usize] as f64;
    (pos - index).mul_add(upper - lower, lower)
}
