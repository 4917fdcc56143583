use crossbeam_channel::{unbounded, Receiver, Sender};

/// Unbounded blocking FIFO queue shared between any number of producers
/// and consumers.
///
/// `put` never blocks; `get` blocks until an item is available. Items are
/// observed in enqueue order. There is no explicit close operation:
/// producers that want consumers to stop enqueue one sentinel value per
/// consumer (e.g. `None` when `T` is an `Option`), which `get` hands back
/// verbatim.
pub struct Channel<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
}

impl<T> Channel<T> {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Enqueues an item. Never blocks.
    pub fn put(&self, item: T) {
        // Every Channel clone holds a receiver, so the send side can never
        // observe a disconnected queue.
        self.sender.send(item).ok();
    }

    /// Dequeues the next item, blocking until one is available.
    pub fn get(&self) -> T {
        self.receiver
            .recv()
            .expect("channel disconnected while a receiver is alive")
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
        }
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}
