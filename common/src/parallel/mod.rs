//! Order-preserving pipelined parallel map.
//!
//! A [`Pipeline`] owns a rayon pool and a producer thread. The producer walks the
//! submitted items in windows of `loadsize * threads`, maps each window in parallel
//! on the pool, and forwards the results through a bounded channel in submission
//! order. The consumer reads them as a plain iterator while the next window is
//! already being computed.

use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use rayon::prelude::*;
use rayon::ThreadPool;

#[cfg(test)]
mod tests;

/// Streaming, order-preserving parallel map over an owned item list.
///
/// Results are delivered in the order the items were submitted, regardless of
/// which worker finishes first. At most one window of results plus `loadsize`
/// buffered results are resident at any time.
///
/// Dropping the pipeline closes the channel and joins the producer thread; a
/// window that is already being computed runs to completion first.
pub struct Pipeline<R> {
    rx: Option<Receiver<R>>,
    handle: Option<JoinHandle<()>>,
    expected: usize,
    received: usize,
}

impl<R: Send + 'static> Pipeline<R> {
    /// Start mapping `f` over `items` on `pool`.
    ///
    /// `loadsize` is the minimum number of consecutive items handed to one worker
    /// job and the capacity of the result channel. Lower values keep fewer
    /// undelivered results alive at the cost of scheduling overhead.
    ///
    /// The pool is owned by the producer thread and torn down when the stream is
    /// exhausted or dropped.
    pub fn spawn<T, F>(
        pool: ThreadPool,
        items: Vec<T>,
        loadsize: usize,
        name: &str,
        f: F,
    ) -> std::io::Result<Self>
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        let loadsize = loadsize.max(1);
        let window = loadsize * pool.current_num_threads().max(1);
        let expected = items.len();
        let (tx, rx) = mpsc::sync_channel(loadsize);

        let handle = thread::Builder::new()
            .name(format!("{name}-dispatch"))
            .spawn(move || {
                for batch in items.chunks(window) {
                    let results: Vec<R> = pool.install(|| {
                        batch
                            .par_iter()
                            .with_min_len(loadsize)
                            .map(&f)
                            .collect()
                    });
                    for result in results {
                        if tx.send(result).is_err() {
                            // Consumer hung up.
                            return;
                        }
                    }
                }
            })?;

        Ok(Self {
            rx: Some(rx),
            handle: Some(handle),
            expected,
            received: 0,
        })
    }
}

impl<R> Pipeline<R> {
    /// Number of items submitted.
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Number of results handed to the consumer so far.
    pub fn received(&self) -> usize {
        self.received
    }

    /// True when every submitted item has been delivered.
    pub fn is_complete(&self) -> bool {
        self.received == self.expected
    }
}

impl<R> Iterator for Pipeline<R> {
    type Item = R;

    fn next(&mut self) -> Option<R> {
        let result = self.rx.as_ref()?.recv().ok()?;
        self.received += 1;
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.expected - self.received))
    }
}

impl<R> Drop for Pipeline<R> {
    fn drop(&mut self) {
        // Receiver goes first so a producer blocked on `send` can observe the hang-up.
        drop(self.rx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("pipeline producer thread panicked");
            }
        }
    }
}
