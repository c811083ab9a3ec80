//! FIFO of store commands awaiting the next pump, and the stream their
//! outcomes are reported on.

use crate::error::Result;
use crate::rpc::TransactionRef;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::trace;

/// Outcomes buffered for a slow reader before new ones are dropped.
pub const OUTCOME_BUFFER: usize = 256;

/// Commands queued from any thread and executed in submission order.
pub struct CommandQueue<C> {
    sender: Sender<C>,
    receiver: Receiver<C>,
}

impl<C> CommandQueue<C> {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    pub fn push(&self, command: C) {
        // Both ends live in `self`, so the queue can't be disconnected
        let _ = self.sender.send(command);
    }

    pub fn try_pop(&self) -> Option<C> {
        self.receiver.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl<C> Default for CommandQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one executed command.
#[derive(Debug)]
pub struct CommandOutcome<C> {
    pub command: C,
    pub result: Result<TransactionRef>,
}

/// Reports command outcomes to the most recent reader, if any.
pub(crate) struct Outcomes<C> {
    sender: Mutex<Option<Sender<CommandOutcome<C>>>>,
}

impl<C> Outcomes<C> {
    pub(crate) fn new() -> Self {
        Self {
            sender: Mutex::new(None),
        }
    }

    /// Start a new stream, replacing any previous reader.
    pub(crate) fn subscribe(&self) -> Receiver<CommandOutcome<C>> {
        let (sender, receiver) = bounded(OUTCOME_BUFFER);
        *self.sender.lock() = Some(sender);
        receiver
    }

    pub(crate) fn publish(&self, command: C, result: Result<TransactionRef>) {
        let mut slot = self.sender.lock();
        let Some(sender) = slot.as_ref() else {
            return;
        };
        match sender.try_send(CommandOutcome { command, result }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => trace!("outcome reader lagging, outcome dropped"),
            Err(TrySendError::Disconnected(_)) => *slot = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;

    #[test]
    fn test_fifo_order() {
        let queue = CommandQueue::new();
        for i in 0..5 {
            queue.push(i);
        }
        assert_eq!(queue.len(), 5);
        let drained: Vec<_> = std::iter::from_fn(|| queue.try_pop()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_outcomes_reach_latest_reader() {
        let outcomes = Outcomes::new();
        // No reader yet: dropped silently
        outcomes.publish(1, Ok(TransactionRef("a".to_string())));

        let first = outcomes.subscribe();
        let second = outcomes.subscribe();
        outcomes.publish(2, Err(ClientError::NotConnected));

        assert!(first.try_recv().is_err());
        let outcome = second.try_recv().unwrap();
        assert_eq!(outcome.command, 2);
        assert!(matches!(outcome.result, Err(ClientError::NotConnected)));
    }

    #[test]
    fn test_dropped_reader_detaches() {
        let outcomes = Outcomes::new();
        drop(outcomes.subscribe());
        outcomes.publish(1, Ok(TransactionRef("a".to_string())));
        assert!(outcomes.sender.lock().is_none());
    }
}
