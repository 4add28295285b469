//! Trailing-edge debouncer for note edit signals.
//!
//! Editors fire a change signal on nearly every keystroke. The debouncer holds
//! each signal until its key has been quiet for the configured window and then
//! emits the key exactly once. There is no leading-edge emission.
//!
//! # Architecture
//!
//! A background task keeps a deadline per pending key. When a signal arrives:
//!
//! 1. The deadline for its key is pushed to `now + window`
//! 2. When the earliest deadline passes, its key is emitted and forgotten
//! 3. When the input side is dropped, every pending key is flushed at once
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tokio::sync::mpsc;
//! use dida_bridge::utils::debounce::Debouncer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (output_tx, mut output_rx) = mpsc::channel(16);
//!     let debouncer = Debouncer::new(Duration::from_millis(2500), output_tx);
//!
//!     debouncer.signal("note-1".to_string()).await.unwrap();
//!     debouncer.signal("note-1".to_string()).await.unwrap();
//!
//!     // One emission, 2.5s after the last signal
//!     assert_eq!(output_rx.recv().await.as_deref(), Some("note-1"));
//! }
//! ```

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Capacity of the signal queue in front of the debounce task.
const INPUT_CAPACITY: usize = 1024;

/// Error type for debouncer operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DebouncerError {
    /// The debounce task has stopped.
    #[error("debouncer channel closed")]
    ChannelClosed,
}

/// Coalesces bursts of signals per key into a single trailing emission.
///
/// Must be created inside a Tokio runtime.
#[derive(Debug)]
pub struct Debouncer<K>
where
    K: Clone + Eq + Hash + Send + Debug + 'static,
{
    input_tx: mpsc::Sender<K>,
}

impl<K> Debouncer<K>
where
    K: Clone + Eq + Hash + Send + Debug + 'static,
{
    /// Starts a debouncer that emits quiet keys on `output_tx`.
    #[must_use]
    pub fn new(window: Duration, output_tx: mpsc::Sender<K>) -> Self {
        let (input_tx, input_rx) = mpsc::channel(INPUT_CAPACITY);

        tokio::spawn(async move {
            run_debounce_loop(window, input_rx, output_tx).await;
        });

        Self { input_tx }
    }

    /// Records a signal for `key`, restarting its window.
    ///
    /// # Errors
    ///
    /// Returns `DebouncerError::ChannelClosed` if the background task has
    /// terminated.
    pub async fn signal(&self, key: K) -> Result<(), DebouncerError> {
        self.input_tx
            .send(key)
            .await
            .map_err(|_| DebouncerError::ChannelClosed)
    }
}

async fn run_debounce_loop<K>(
    window: Duration,
    mut input_rx: mpsc::Receiver<K>,
    output_tx: mpsc::Sender<K>,
) where
    K: Clone + Eq + Hash + Debug,
{
    let mut deadlines: HashMap<K, Instant> = HashMap::new();

    debug!(window_ms = window.as_millis(), "Starting debounce loop");

    loop {
        let next_deadline = deadlines.values().min().copied();

        tokio::select! {
            signal = input_rx.recv() => match signal {
                Some(key) => {
                    trace!(key = ?key, "Signal received, window restarted");
                    deadlines.insert(key, Instant::now() + window);
                }
                None => {
                    debug!(pending = deadlines.len(), "Input closed, flushing pending keys");
                    for (key, _) in deadlines.drain() {
                        if output_tx.send(key).await.is_err() {
                            break;
                        }
                    }
                    break;
                }
            },

            _ = tokio::time::sleep_until(next_deadline.unwrap_or_else(Instant::now)),
                if next_deadline.is_some() =>
            {
                let now = Instant::now();
                let expired: Vec<K> = deadlines
                    .iter()
                    .filter(|(_, deadline)| **deadline <= now)
                    .map(|(key, _)| key.clone())
                    .collect();

                for key in expired {
                    deadlines.remove(&key);
                    trace!(key = ?key, "Window closed, emitting");
                    if output_tx.send(key).await.is_err() {
                        warn!("Debounce output closed, stopping");
                        return;
                    }
                }
            }
        }
    }

    debug!("Debounce loop terminated");
}
