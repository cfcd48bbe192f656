use std::collections::VecDeque;

/// Rolling window of valid CPU load readings, used for a smoothed average.
#[derive(Debug, Clone)]
pub struct CpuHistory {
    samples:  VecDeque<f64>,
    capacity: usize,
}

impl CpuHistory {
    /// A window holding at most `capacity` readings (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a new reading, evicting the oldest if at capacity.
    pub fn push(&mut self, load: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(load);
    }

    /// Mean of the readings in the window, `None` while it is empty.
    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
