//! Single-fire resolution for push-based notification sources.
//!
//! Capture sessions and streaming transports call back any number of times,
//! from any thread. [`Completion`] turns that into one awaitable value: the
//! first [`Completion::resolve`] wins and every later call is dropped.

use std::sync::Mutex;
use tokio::sync::oneshot;

/// The sending half of a single-fire resolution.
///
/// Shareable across threads; pair it with the [`oneshot::Receiver`] returned
/// by [`Completion::new`].
#[derive(Debug)]
pub struct Completion<T> {
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> Completion<T> {
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let completion = Self {
            sender: Mutex::new(Some(tx)),
        };
        (completion, rx)
    }

    /// Resolves with `value` if nothing resolved before.
    ///
    /// Returns `false` when the value was dropped because an earlier call
    /// already won.
    pub fn resolve(&self, value: T) -> bool {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            // A dropped receiver still counts as resolved: nobody is waiting.
            Some(tx) => {
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[tokio::test]
    async fn first_resolution_wins() {
        let (completion, rx) = Completion::new();
        assert!(completion.resolve(1));
        assert!(!completion.resolve(2));
        assert_eq!(rx.await.ok(), Some(1));
    }

    #[tokio::test]
    async fn racing_threads_resolve_exactly_once() {
        let (completion, rx) = Completion::new();
        let completion = Arc::new(completion);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let completion = completion.clone();
                thread::spawn(move || completion.resolve(i))
            })
            .collect();
        let winners = handles
            .into_iter()
            .filter_map(|h| h.join().ok())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert!(rx.await.is_ok());
    }
}
