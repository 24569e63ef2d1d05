/// Identifier of a deferred task.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

/// Jobs deferred until the current dispatch returns control.
///
/// - Drained in insertion order.
/// - Cancellation does not perturb the order of remaining items.
/// - A job deferred while draining lands in the next drain.
#[derive(Debug)]
pub struct MicrotaskQueue<T> {
    next_id: u64,
    items: Vec<(TaskId, T)>,
}

impl<T> Default for MicrotaskQueue<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            items: Vec::new(),
        }
    }
}

impl<T> MicrotaskQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defer(&mut self, job: T) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.items.push((id, job));
        id
    }

    /// Removes a pending job. Returns it if it had not run yet.
    pub fn cancel(&mut self, id: TaskId) -> Option<T> {
        let pos = self.items.iter().position(|(i, _)| *i == id)?;
        Some(self.items.remove(pos).1)
    }

    pub fn drain(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
            .into_iter()
            .map(|(_, job)| job)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::MicrotaskQueue;

    #[test]
    fn drains_in_insertion_order() {
        let mut q = MicrotaskQueue::new();
        q.defer("a");
        q.defer("b");
        q.defer("c");
        assert_eq!(q.len(), 3);
        assert_eq!(q.drain(), vec!["a", "b", "c"]);
        assert!(q.is_empty());
    }

    #[test]
    fn cancel_keeps_remaining_order() {
        let mut q = MicrotaskQueue::new();
        q.defer(1);
        let b = q.defer(2);
        q.defer(3);
        assert_eq!(q.cancel(b), Some(2));
        assert_eq!(q.cancel(b), None);
        assert_eq!(q.drain(), vec![1, 3]);
    }

    #[test]
    fn ids_are_not_reused_after_drain() {
        let mut q = MicrotaskQueue::new();
        let a = q.defer(());
        q.drain();
        let b = q.defer(());
        assert_ne!(a, b);
        assert_eq!(q.cancel(a), None);
    }
}
