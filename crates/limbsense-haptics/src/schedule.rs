use crate::pattern::Pattern;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Identifies every step belonging to one multi-step sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatternId(pub u64);

#[derive(Debug)]
struct Entry {
    fire_at_ms: u64,
    seq: u64,
    id: PatternId,
    pattern: Pattern,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.fire_at_ms, self.seq).cmp(&(other.fire_at_ms, other.seq))
    }
}

/// Delay queue of pattern steps, drained by the simulation loop.
///
/// Nothing here sleeps or spawns: the owner calls [`drain_due`] with the
/// current simulation time and dispatches whatever comes back. Steps due at
/// the same time come out in scheduling order.
///
/// [`drain_due`]: PatternScheduler::drain_due
#[derive(Debug, Default)]
pub struct PatternScheduler {
    heap: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
    next_id: u64,
}

impl PatternScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an id for a new sequence.
    pub fn allocate_id(&mut self) -> PatternId {
        self.next_id += 1;
        PatternId(self.next_id)
    }

    pub fn schedule(&mut self, id: PatternId, fire_at_ms: u64, pattern: Pattern) {
        self.next_seq += 1;
        self.heap.push(Reverse(Entry {
            fire_at_ms,
            seq: self.next_seq,
            id,
            pattern,
        }));
    }

    /// Remove every pending step of `id`. Returns how many were removed.
    pub fn cancel(&mut self, id: PatternId) -> usize {
        let before = self.heap.len();
        self.heap.retain(|Reverse(entry)| entry.id != id);
        before - self.heap.len()
    }

    /// Remove everything. Returns how many steps were pending.
    pub fn cancel_all(&mut self) -> usize {
        let n = self.heap.len();
        self.heap.clear();
        n
    }

    /// Pop every step with `fire_at_ms <= now_ms`, earliest first.
    pub fn drain_due(&mut self, now_ms: u64) -> Vec<(PatternId, Pattern)> {
        let mut due = Vec::new();
        while self
            .heap
            .peek()
            .is_some_and(|Reverse(entry)| entry.fire_at_ms <= now_ms)
        {
            if let Some(Reverse(entry)) = self.heap.pop() {
                due.push((entry.id, entry.pattern));
            }
        }
        due
    }

    pub fn pending(&self, id: PatternId) -> usize {
        self.heap.iter().filter(|Reverse(e)| e.id == id).count()
    }

    pub fn next_fire_at(&self) -> Option<u64> {
        self.heap.peek().map(|Reverse(e)| e.fire_at_ms)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::ActuatorGrid;

    fn pattern(index: usize) -> Pattern {
        let mut grid = ActuatorGrid::new();
        grid.set(index, 50);
        Pattern::new(grid, 100)
    }

    #[test]
    fn drains_in_time_then_insertion_order() {
        let mut scheduler = PatternScheduler::new();
        let id = scheduler.allocate_id();
        scheduler.schedule(id, 200, pattern(2));
        scheduler.schedule(id, 100, pattern(0));
        scheduler.schedule(id, 100, pattern(1));

        assert!(scheduler.drain_due(99).is_empty());
        let due = scheduler.drain_due(150);
        let lit: Vec<Vec<usize>> = due.iter().map(|(_, p)| p.grid.lit()).collect();
        assert_eq!(lit, vec![vec![0], vec![1]]);
        assert_eq!(scheduler.next_fire_at(), Some(200));
        assert_eq!(scheduler.drain_due(1000).len(), 1);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn cancel_is_scoped_to_one_pattern() {
        let mut scheduler = PatternScheduler::new();
        let a = scheduler.allocate_id();
        let b = scheduler.allocate_id();
        scheduler.schedule(a, 100, pattern(0));
        scheduler.schedule(a, 200, pattern(0));
        scheduler.schedule(b, 150, pattern(1));

        assert_eq!(scheduler.cancel(a), 2);
        assert_eq!(scheduler.pending(b), 1);
        assert_eq!(scheduler.cancel(a), 0);

        let due = scheduler.drain_due(1000);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].0, b);
    }

    #[test]
    fn cancel_all_empties_queue() {
        let mut scheduler = PatternScheduler::new();
        let a = scheduler.allocate_id();
        scheduler.schedule(a, 10, pattern(0));
        scheduler.schedule(a, 20, pattern(0));
        assert_eq!(scheduler.cancel_all(), 2);
        assert_eq!(scheduler.len(), 0);
        assert!(scheduler.drain_due(u64::MAX).is_empty());
    }
}
