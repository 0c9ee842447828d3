//! Health scoring and adaptive batch sizing
//!
//! The scheduler records one [`BatchSample`] per batch. [`HealthTracker`]
//! turns the recent samples into a score between 0 and 1, and [`BatchSizer`]
//! uses that score to grow, shrink or clamp the next batch.

use crate::config::SchedulerConfig;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{info, warn};

const HISTORY_LEN: usize = 5;
const EMERGENCY_THRESHOLD: f64 = 0.4;
const RECOVERY_THRESHOLD: f64 = 0.8;
const GOOD_BATCH_RATE: f64 = 0.85;
const REQUIRED_GOOD_BATCHES: usize = 7;

/// Measurements taken after one batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchSample {
    pub success_rate: f64,
    pub elapsed: Duration,
    pub failure_count: usize,
}

/// Rolling window of the most recent batch samples
#[derive(Debug, Clone, Default)]
pub struct HealthTracker {
    success_rates: VecDeque<f64>,
    times: VecDeque<f64>,
    failures: VecDeque<usize>,
}

fn push_bounded<T>(deque: &mut VecDeque<T>, value: T) {
    if deque.len() == HISTORY_LEN {
        deque.pop_front();
    }
    deque.push_back(value);
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, sample: BatchSample) {
        push_bounded(&mut self.success_rates, sample.success_rate);
        push_bounded(&mut self.times, sample.elapsed.as_secs_f64());
        push_bounded(&mut self.failures, sample.failure_count);
    }

    /// Forgets the success history; timing and failure history are kept
    pub fn clear_success_history(&mut self) {
        self.success_rates.clear();
    }

    pub fn success_rates(&self) -> &VecDeque<f64> {
        &self.success_rates
    }

    pub fn average_success(&self) -> Option<f64> {
        mean(self.success_rates.iter().copied())
    }

    pub fn min_success(&self) -> Option<f64> {
        self.success_rates.iter().copied().reduce(f64::min)
    }

    /// Composite score in `[0, 1]`; 1.0 while there is no success or timing history
    ///
    /// | factor      | weight | value                                         |
    /// |-------------|--------|-----------------------------------------------|
    /// | success     | 0.4    | `avg * 0.7 + min * 0.3`                        |
    /// | performance | 0.3    | `max(0, 1 - (max_t / min_t - 1) * 0.5)`        |
    /// | failures    | 0.2    | `max(0, 1 - avg_failures / 50)`                |
    /// | trend       | 0.1    | `clamp(0.5 + (last - third_last), 0, 1)`       |
    pub fn health_score(&self) -> f64 {
        let (avg, min) = match (self.average_success(), self.min_success()) {
            (Some(avg), Some(min)) if !self.times.is_empty() => (avg, min),
            _ => return 1.0,
        };
        let success = avg * 0.7 + min * 0.3;

        let performance = if self.times.len() < 2 {
            1.0
        } else {
            let max = self.times.iter().copied().fold(f64::MIN, f64::max);
            let min = self.times.iter().copied().fold(f64::MAX, f64::min);
            if min <= 0.0 {
                1.0
            } else {
                (1.0 - (max / min - 1.0) * 0.5).max(0.0)
            }
        };

        let failures = match mean(self.failures.iter().map(|&f| f as f64)) {
            Some(avg) => (1.0 - avg / 50.0).max(0.0),
            None => 1.0,
        };

        let trend = if self.success_rates.len() >= 3 {
            let n = self.success_rates.len();
            let delta = self.success_rates[n - 1] - self.success_rates[n - 3];
            (0.5 + delta).clamp(0.0, 1.0)
        } else {
            1.0
        };

        (success * 0.4 + performance * 0.3 + failures * 0.2 + trend * 0.1).clamp(0.0, 1.0)
    }

    /// Recent batches are getting slower
    ///
    /// True when the mean of the last two batch times exceeds 1.5 times the
    /// mean of the first two; needs at least three samples.
    pub fn performance_degrading(&self) -> bool {
        let n = self.times.len();
        if n < 3 {
            return false;
        }
        let early = (self.times[0] + self.times[1]) / 2.0;
        let recent = (self.times[n - 2] + self.times[n - 1]) / 2.0;
        recent > early * 1.5
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Reports how much system memory is still available
pub trait MemoryProbe: Send + Sync {
    /// Available fraction in `[0, 1]`, or `None` when it cannot be determined
    fn available_fraction(&self) -> Option<f64>;
}

/// Reads `MemAvailable` and `MemTotal` from `/proc/meminfo`
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcMemoryProbe;

impl MemoryProbe for ProcMemoryProbe {
    fn available_fraction(&self) -> Option<f64> {
        let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
        parse_meminfo(&meminfo)
    }
}

fn parse_meminfo(meminfo: &str) -> Option<f64> {
    let field = |name: &str| -> Option<f64> {
        meminfo
            .lines()
            .find(|line| line.starts_with(name))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|value| value.parse::<f64>().ok())
    };
    let total = field("MemTotal:")?;
    let available = field("MemAvailable:")?;
    if total <= 0.0 {
        return None;
    }
    Some((available / total).clamp(0.0, 1.0))
}

/// What the sizer did after a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeChange {
    Unchanged,
    Increased,
    Decreased,
    EmergencyEntered,
    EmergencyCleared,
}

/// Adjusts the batch size from observed health
pub struct BatchSizer {
    config: SchedulerConfig,
    tracker: HealthTracker,
    memory: Box<dyn MemoryProbe>,
    size: usize,
    emergency: bool,
    emergency_activations: usize,
    consecutive_good: usize,
    batches_since_change: usize,
    last_health: f64,
}

impl std::fmt::Debug for BatchSizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchSizer")
            .field("size", &self.size)
            .field("emergency", &self.emergency)
            .field("consecutive_good", &self.consecutive_good)
            .field("batches_since_change", &self.batches_since_change)
            .field("last_health", &self.last_health)
            .finish()
    }
}

impl BatchSizer {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_memory_probe(config, Box::new(ProcMemoryProbe))
    }

    pub fn with_memory_probe(config: SchedulerConfig, memory: Box<dyn MemoryProbe>) -> Self {
        let size = config
            .initial_batch_size
            .clamp(config.min_batch_size, config.max_batch_size.max(config.min_batch_size));
        Self {
            config,
            tracker: HealthTracker::new(),
            memory,
            size,
            emergency: false,
            emergency_activations: 0,
            consecutive_good: 0,
            batches_since_change: 0,
            last_health: 1.0,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn in_emergency(&self) -> bool {
        self.emergency
    }

    pub fn emergency_activations(&self) -> usize {
        self.emergency_activations
    }

    pub fn last_health(&self) -> f64 {
        self.last_health
    }

    pub fn tracker(&self) -> &HealthTracker {
        &self.tracker
    }

    fn memory_safe(&self) -> bool {
        match self.memory.available_fraction() {
            Some(fraction) => fraction > self.config.memory_headroom,
            None => true,
        }
    }

    /// Feeds the result of batch number `batch` (1-based) into the sizer
    ///
    /// Batches before `adaptation_start_batch` are ignored so that warm-up
    /// noise does not drive the size.
    pub fn observe(&mut self, batch: usize, sample: BatchSample) -> SizeChange {
        if batch < self.config.adaptation_start_batch {
            return SizeChange::Unchanged;
        }

        self.tracker.record(sample);
        self.batches_since_change += 1;
        let health = self.tracker.health_score();
        self.last_health = health;

        if health < EMERGENCY_THRESHOLD && !self.emergency {
            self.size = self.config.min_batch_size;
            self.emergency = true;
            self.emergency_activations += 1;
            self.batches_since_change = 0;
            self.consecutive_good = 0;
            self.tracker.clear_success_history();
            warn!(
                "Health {:.2} below {:.2}: emergency mode, batch size {}",
                health, EMERGENCY_THRESHOLD, self.size
            );
            return SizeChange::EmergencyEntered;
        }

        if self.emergency {
            if health > RECOVERY_THRESHOLD {
                self.emergency = false;
                self.consecutive_good = 0;
                info!("Health {:.2} recovered: leaving emergency mode", health);
                return SizeChange::EmergencyCleared;
            }
            return SizeChange::Unchanged;
        }

        if sample.success_rate >= GOOD_BATCH_RATE {
            self.consecutive_good += 1;
        } else {
            self.consecutive_good = 0;
        }

        let avg = self.tracker.average_success().unwrap_or(0.0);
        let min = self.tracker.min_success().unwrap_or(0.0);

        let can_grow = avg >= 0.9
            && min >= GOOD_BATCH_RATE
            && health >= 0.85
            && self.consecutive_good >= REQUIRED_GOOD_BATCHES
            && self.batches_since_change >= self.config.stability_window
            && self.size < self.config.max_batch_size;

        if can_grow && self.memory_safe() {
            let old = self.size;
            self.size = (self.size + self.config.increase_step).min(self.config.max_batch_size);
            self.batches_since_change = 0;
            self.consecutive_good = 0;
            info!(
                "Batch size {} -> {} (avg {:.0}%, health {:.2})",
                old,
                self.size,
                avg * 100.0,
                health
            );
            return SizeChange::Increased;
        }

        let struggling = sample.success_rate < 0.75
            || health < 0.7
            || self.tracker.performance_degrading();

        if struggling && self.size > self.config.min_batch_size {
            let old = self.size;
            self.size = self
                .size
                .saturating_sub(self.config.decrease_step)
                .max(self.config.min_batch_size);
            self.batches_since_change = 0;
            self.consecutive_good = 0;
            self.tracker.clear_success_history();
            info!(
                "Batch size {} -> {} (rate {:.0}%, health {:.2})",
                old,
                self.size,
                sample.success_rate * 100.0,
                health
            );
            return SizeChange::Decreased;
        }

        SizeChange::Unchanged
    }
}
