use std::collections::VecDeque;

/// Default retention bound; the window keeps twice this many heights
pub const DEFAULT_MAX_REORG_DEPTH: usize = 10;

/// Sliding window of best-chain heights used to estimate reorg depth.
///
/// Any height decrease inside the window counts as a reorg of that depth.
#[derive(Debug, Clone)]
pub struct ReorgTracker {
    max_depth: usize,
    history: VecDeque<u64>,
}

impl Default for ReorgTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REORG_DEPTH)
    }
}

impl ReorgTracker {
    pub fn new(max_depth: usize) -> Self {
        let max_depth = max_depth.max(1);
        Self {
            max_depth,
            history: VecDeque::with_capacity(max_depth * 2),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn capacity(&self) -> usize {
        self.max_depth * 2
    }

    /// Records a best-chain height, dropping the oldest beyond the window
    pub fn update(&mut self, height: u64) {
        self.history.push_back(height);
        while self.history.len() > self.capacity() {
            self.history.pop_front();
        }
    }

    pub fn history(&self) -> impl Iterator<Item = u64> + '_ {
        self.history.iter().copied()
    }

    /// Largest backward jump between consecutive retained heights, 0 if none
    pub fn max_reorg_depth(&self) -> u64 {
        self.history
            .iter()
            .zip(self.history.iter().skip(1))
            .filter(|(prev, next)| next < prev)
            .map(|(prev, next)| prev - next)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_with(max_depth: usize, heights: &[u64]) -> ReorgTracker {
        let mut tracker = ReorgTracker::new(max_depth);
        heights.iter().for_each(|h| tracker.update(*h));
        tracker
    }

    #[test]
    fn detects_single_drop() {
        let tracker = tracker_with(5, &[100, 101, 102, 99, 100]);
        assert_eq!(tracker.max_reorg_depth(), 3);
    }

    #[test]
    fn monotonic_heights_have_no_reorg() {
        let tracker = tracker_with(5, &[1, 2, 2, 3, 4]);
        assert_eq!(tracker.max_reorg_depth(), 0);
    }

    #[test]
    fn empty_and_single_height() {
        assert_eq!(ReorgTracker::default().max_reorg_depth(), 0);
        assert_eq!(tracker_with(3, &[7]).max_reorg_depth(), 0);
    }

    #[test]
    fn drops_age_out_of_window() {
        let mut tracker = tracker_with(2, &[10, 4]);
        assert_eq!(tracker.max_reorg_depth(), 6);
        for h in 5..=8 {
            tracker.update(h);
        }
        assert_eq!(tracker.history().count(), 4);
        assert_eq!(tracker.max_reorg_depth(), 0);
    }

    #[test]
    fn reports_largest_of_several_drops() {
        let tracker = tracker_with(10, &[50, 48, 49, 40, 45, 44]);
        assert_eq!(tracker.max_reorg_depth(), 9);
    }
}
