use std::{cmp::Ordering, collections::BinaryHeap};

// A heap entry; entries are compared by priority alone. Stale entries are
// left in the heap and skipped lazily at pop time.
#[derive(Debug, Clone, Copy, PartialEq)]
struct HeapEntry {
    priority: f64,
    vertex: usize,
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.total_cmp(&other.priority)
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Per-vertex scheduling state. At most one pending request exists per vertex
// (duplicate requests coalesce to the maximum priority), and a vertex being
// executed is marked running so it is never dequeued twice concurrently.
#[derive(Debug, Clone, Copy, Default)]
struct VertexSlot {
    pending: Option<f64>,
    running: bool,
}

// A max-priority queue over vertices keyed by residual, implementing the
// scheduling contract of residual belief propagation: coalescing upsert,
// highest-priority extraction, and per-vertex serialization. Convergence is
// detected as the fixed point where nothing is pending and nothing is
// running.
pub struct ResidualQueue {
    heap: BinaryHeap<HeapEntry>,
    slots: Vec<VertexSlot>,
    num_pending: usize,
    num_running: usize,
}

impl ResidualQueue {
    pub fn new(num_vertices: usize) -> Self {
        ResidualQueue {
            heap: BinaryHeap::with_capacity(num_vertices),
            slots: vec![VertexSlot::default(); num_vertices],
            num_pending: 0,
            num_running: 0,
        }
    }

    // Requests execution of a vertex with the given priority. If a request
    // for the vertex is already pending, only the maximum priority is kept.
    // Returns whether the pending priority changed.
    pub fn schedule(&mut self, vertex: usize, priority: f64) -> bool {
        assert!(
            priority > 0. && priority.is_finite(),
            "Scheduling priority must be positive and finite, got {}.",
            priority
        );
        let slot = &mut self.slots[vertex];
        match slot.pending {
            Some(pending) if pending >= priority => false,
            previous => {
                slot.pending = Some(priority);
                if previous.is_none() {
                    self.num_pending += 1;
                }
                // A running vertex is re-enqueued on completion instead
                if !slot.running {
                    self.heap.push(HeapEntry { priority, vertex });
                }
                true
            }
        }
    }

    // Extracts a pending vertex with maximal priority and marks it running.
    // Returns None when nothing is pending; the computation as a whole is
    // only converged once `is_converged` also reports no running vertices.
    pub fn pop(&mut self) -> Option<(usize, f64)> {
        while let Some(entry) = self.heap.pop() {
            let slot = &mut self.slots[entry.vertex];
            // Skip entries superseded by a coalescing upsert or a dequeue
            if slot.running || slot.pending != Some(entry.priority) {
                continue;
            }
            slot.pending = None;
            slot.running = true;
            self.num_pending -= 1;
            self.num_running += 1;
            return Some((entry.vertex, entry.priority));
        }
        None
    }

    // Marks a running vertex as completed, re-enqueueing any request that
    // arrived while it was running
    pub fn complete(&mut self, vertex: usize) {
        let slot = &mut self.slots[vertex];
        assert!(slot.running, "complete() called for a vertex that is not running.");
        slot.running = false;
        self.num_running -= 1;
        if let Some(priority) = slot.pending {
            self.heap.push(HeapEntry { priority, vertex });
        }
    }

    pub fn num_pending(&self) -> usize {
        self.num_pending
    }

    pub fn num_running(&self) -> usize {
        self.num_running
    }

    // The fixed point: no vertex produced a residual exceeding the bound on
    // its last update, and no update is still in flight
    pub fn is_converged(&self) -> bool {
        self.num_pending == 0 && self.num_running == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_for_the_same_vertex_coalesce_to_the_maximum() {
        let mut queue = ResidualQueue::new(4);
        assert!(queue.schedule(2, 0.3));
        assert!(!queue.schedule(2, 0.1));
        assert_eq!(queue.num_pending(), 1);
        assert_eq!(queue.pop(), Some((2, 0.3)));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn a_higher_priority_upsert_supersedes_the_stale_entry() {
        let mut queue = ResidualQueue::new(4);
        queue.schedule(2, 0.1);
        queue.schedule(2, 0.3);
        assert_eq!(queue.num_pending(), 1);
        assert_eq!(queue.pop(), Some((2, 0.3)));
        // The stale 0.1 entry must not resurface
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.num_pending(), 0);
    }

    #[test]
    fn pop_extracts_vertices_in_priority_order() {
        let mut queue = ResidualQueue::new(4);
        queue.schedule(0, 0.2);
        queue.schedule(1, 0.9);
        queue.schedule(2, 0.5);
        assert_eq!(queue.pop(), Some((1, 0.9)));
        assert_eq!(queue.pop(), Some((2, 0.5)));
        assert_eq!(queue.pop(), Some((0, 0.2)));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn a_running_vertex_is_not_dequeued_until_completed() {
        let mut queue = ResidualQueue::new(2);
        queue.schedule(0, 1.);
        assert_eq!(queue.pop(), Some((0, 1.)));
        // A request arriving mid-update stays pending
        queue.schedule(0, 0.7);
        assert_eq!(queue.pop(), None);
        assert!(!queue.is_converged());
        queue.complete(0);
        assert_eq!(queue.pop(), Some((0, 0.7)));
        queue.complete(0);
        assert!(queue.is_converged());
    }

    #[test]
    fn convergence_requires_nothing_pending_and_nothing_running() {
        let mut queue = ResidualQueue::new(2);
        assert!(queue.is_converged());
        queue.schedule(1, 0.4);
        assert!(!queue.is_converged());
        let (vertex, _) = queue.pop().unwrap();
        assert!(!queue.is_converged());
        queue.complete(vertex);
        assert!(queue.is_converged());
    }
}
