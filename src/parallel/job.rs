//! Messages exchanged between the producer, the workers and the collector.

use super::error::{ItemError, MapError};

/// One indexed unit of work: the zero-based position in the original input
/// plus the argument at that position.
#[derive(Debug, Clone, PartialEq)]
pub struct Job<T> {
    pub index: usize,
    pub argument: T,
}

impl<T> Job<T> {
    pub fn new(index: usize, argument: T) -> Self {
        Self { index, argument }
    }
}

/// Jobs transported together. Workers process them front to back.
pub type Chunk<T> = Vec<Job<T>>;

/// What travels on the job queue.
#[derive(Debug)]
pub enum JobMessage<T> {
    Single(Job<T>),
    Chunk(Chunk<T>),
    /// Pushed once per worker after the last job.
    EndOfStream,
}

/// What travels on the result channel.
#[derive(Debug)]
pub enum Outcome<R> {
    Success { index: usize, value: R },
    Failure(ItemError),
    /// The sending worker has stopped and will publish nothing else.
    EndOfWork { worker_id: usize },
    /// The sending worker could not start (e.g. its log file could not be opened).
    Fatal { worker_id: usize, error: MapError },
}

impl<R> Outcome<R> {
    pub fn index(&self) -> Option<usize> {
        match self {
            Outcome::Success { index, .. } => Some(*index),
            Outcome::Failure(error) => Some(error.index),
            Outcome::EndOfWork { .. } | Outcome::Fatal { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::error::ErrorKind;

    #[test]
    fn test_outcome_index() {
        let success: Outcome<u32> = Outcome::Success { index: 4, value: 16 };
        assert_eq!(success.index(), Some(4));

        let failure: Outcome<u32> =
            Outcome::Failure(ItemError::new(2, ErrorKind::Item, "boom"));
        assert_eq!(failure.index(), Some(2));

        let done: Outcome<u32> = Outcome::EndOfWork { worker_id: 0 };
        assert_eq!(done.index(), None);
    }
}
