use std::collections::VecDeque;

use crate::monitor::types::QualityMetrics;

/// Bounded FIFO of finalized metrics awaiting upload. Each entry carries a sequence number so a
/// successful upload removes exactly what it sent, even if newer entries arrived meanwhile.
///
/// `clear` starts a new generation. A push stamped with an older generation was collected before
/// the clear and is refused.
#[derive(Debug)]
pub struct MetricsCache {
    entries: VecDeque<(u64, QualityMetrics)>,
    capacity: usize,
    next_seq: u64,
    generation: u64,
}

impl MetricsCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            next_seq: 0,
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Appends and returns how many of the oldest entries were evicted to stay within capacity.
    /// `None` when `generation` is stale.
    pub fn push(&mut self, metrics: QualityMetrics, generation: u64) -> Option<usize> {
        if generation != self.generation {
            return None;
        }
        self.entries.push_back((self.next_seq, metrics));
        self.next_seq += 1;
        Some(self.enforce_capacity())
    }

    pub fn set_capacity(&mut self, capacity: usize) -> usize {
        self.capacity = capacity.max(1);
        self.enforce_capacity()
    }

    fn enforce_capacity(&mut self) -> usize {
        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Current contents with the sequence number of the newest entry.
    pub fn batch(&self) -> Option<(u64, Vec<QualityMetrics>)> {
        let (last_seq, _) = self.entries.back()?;
        Some((*last_seq, self.entries.iter().map(|(_, m)| m.clone()).collect()))
    }

    /// Drops every entry up to and including `last_seq`.
    pub fn acknowledge(&mut self, last_seq: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(seq, _)| *seq > last_seq);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.generation += 1;
    }

    pub fn iter(&self) -> impl Iterator<Item = &QualityMetrics> {
        self.entries.iter().map(|(_, m)| m)
    }
}
