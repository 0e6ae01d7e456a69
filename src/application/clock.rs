use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    Continue,
    Stop,
}

/// Spawns cancellable fixed-period tick loops on the current tokio runtime.
#[derive(Debug, Clone)]
pub struct TickSource {
    interval: Duration,
}

impl TickSource {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn from_millis(interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(interval_ms.max(1)))
    }

    /// Calls `on_tick` once per interval until it returns [`TickControl::Stop`]
    /// or the returned handle is cancelled or dropped.
    pub fn spawn<F>(&self, generation: u64, mut on_tick: F) -> TickHandle
    where
        F: FnMut() -> TickControl + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let interval = self.interval;

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!(generation, "tick loop cancelled");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if token.is_cancelled() {
                            break;
                        }
                        if on_tick() == TickControl::Stop {
                            debug!(generation, "tick loop stopped");
                            break;
                        }
                    }
                }
            }
        });

        TickHandle {
            generation,
            cancel,
            task,
        }
    }
}

/// Owner of one running tick loop. Dropping the handle cancels the loop.
#[derive(Debug)]
pub struct TickHandle {
    generation: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TickHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TickHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting_source(interval_ms: u64) -> (TickSource, Arc<AtomicU32>) {
        (TickSource::from_millis(interval_ms), Arc::new(AtomicU32::new(0)))
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_interval() {
        let (source, count) = counting_source(1_000);
        let counter = Arc::clone(&count);
        let _handle = source.spawn(1, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            TickControl::Continue
        });

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_the_loop() {
        let (source, count) = counting_source(1_000);
        let counter = Arc::clone(&count);
        let handle = source.spawn(7, move || {
            let seen = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if seen == 2 {
                TickControl::Stop
            } else {
                TickControl::Continue
            }
        });

        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(handle.generation(), 7);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_and_drop_prevent_further_ticks() {
        let (source, count) = counting_source(1_000);

        let counter = Arc::clone(&count);
        let handle = source.spawn(1, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            TickControl::Continue
        });
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        handle.cancel();
        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let counter = Arc::clone(&count);
        let dropped = source.spawn(2, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            TickControl::Continue
        });
        drop(dropped);
        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
