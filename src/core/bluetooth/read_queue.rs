//! Read pipeline for initial characteristic values
//! Holds the characteristics still waiting for a read and tracks the one read
//! that may be outstanding on the transport. The connection task is its only owner.

use std::collections::VecDeque;

use crate::core::bluetooth::types::{CharacteristicId, ReadProgress};

#[derive(Debug, Default)]
pub struct ReadPipeline {
    queue: VecDeque<CharacteristicId>,
    draining: bool,
    in_flight: Option<CharacteristicId>,
    progress: ReadProgress,
}

impl ReadPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends characteristics in the order given
    pub fn enqueue_readable<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = CharacteristicId>,
    {
        let before = self.queue.len();
        self.queue.extend(ids);
        self.progress.total += self.queue.len() - before;
    }

    /// Marks the pipeline as draining. Returns false when a drain is already
    /// running or there is nothing to read.
    pub fn begin(&mut self) -> bool {
        if self.draining || self.queue.is_empty() {
            return false;
        }
        self.draining = true;
        self.progress.draining = true;
        true
    }

    /// Pops the next characteristic to read. An empty queue ends the drain.
    pub fn pop_next(&mut self) -> Option<CharacteristicId> {
        self.in_flight = None;
        match self.queue.pop_front() {
            Some(id) => {
                self.progress.attempted += 1;
                Some(id)
            }
            None => {
                self.draining = false;
                self.progress.draining = false;
                None
            }
        }
    }

    /// Records that the transport accepted a read for `id`
    pub fn mark_in_flight(&mut self, id: CharacteristicId) {
        self.in_flight = Some(id);
    }

    /// Settles the outstanding read. Returns false if `id` is not the read in flight,
    /// in which case the completion must be ignored.
    pub fn complete(&mut self, id: &CharacteristicId, success: bool) -> bool {
        if self.in_flight.as_ref() != Some(id) {
            return false;
        }
        self.in_flight = None;
        if success {
            self.progress.succeeded += 1;
        }
        true
    }

    /// Drops the queue and any outstanding read
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    pub fn in_flight(&self) -> Option<&CharacteristicId> {
        self.in_flight.as_ref()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn progress(&self) -> ReadProgress {
        self.progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn id(n: u128) -> CharacteristicId {
        CharacteristicId::new(Uuid::from_u128(0x180f), Uuid::from_u128(n))
    }

    #[test]
    fn pops_in_fifo_order_and_ends_drain() {
        let mut pipeline = ReadPipeline::new();
        pipeline.enqueue_readable([id(1), id(2), id(3)]);
        assert!(pipeline.begin());
        assert_eq!(pipeline.pop_next(), Some(id(1)));
        assert_eq!(pipeline.pop_next(), Some(id(2)));
        assert_eq!(pipeline.pop_next(), Some(id(3)));
        assert!(pipeline.is_draining());
        assert_eq!(pipeline.pop_next(), None);
        assert!(!pipeline.is_draining());

        let progress = pipeline.progress();
        assert_eq!(progress.total, 3);
        assert_eq!(progress.attempted, 3);
        assert!(!progress.draining);
    }

    #[test]
    fn begin_is_idempotent() {
        let mut pipeline = ReadPipeline::new();
        assert!(!pipeline.begin(), "empty queue has nothing to drain");
        pipeline.enqueue_readable([id(1)]);
        assert!(pipeline.begin());
        assert!(!pipeline.begin());
    }

    #[test]
    fn completion_must_match_in_flight() {
        let mut pipeline = ReadPipeline::new();
        pipeline.enqueue_readable([id(1), id(2)]);
        pipeline.begin();
        let first = pipeline.pop_next().unwrap();
        pipeline.mark_in_flight(first);

        assert!(!pipeline.complete(&id(2), true));
        assert!(pipeline.complete(&id(1), true));
        assert!(!pipeline.complete(&id(1), true), "already settled");
        assert_eq!(pipeline.progress().succeeded, 1);
    }

    #[test]
    fn reset_discards_everything() {
        let mut pipeline = ReadPipeline::new();
        pipeline.enqueue_readable([id(1), id(2)]);
        pipeline.begin();
        let first = pipeline.pop_next().unwrap();
        pipeline.mark_in_flight(first);

        pipeline.reset();
        assert!(pipeline.is_empty());
        assert!(!pipeline.is_draining());
        assert!(pipeline.in_flight().is_none());
        assert!(!pipeline.complete(&id(1), true));
        assert_eq!(pipeline.progress(), ReadProgress::default());
    }
}
