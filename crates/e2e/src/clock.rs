//! Wall-clock measurement around a single operation

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Run `operation` exactly once and return its output with the elapsed time.
///
/// Only the call itself is timed; building the closure is not.
pub async fn measure<F, Fut, T>(operation: F) -> (T, Duration)
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let start = Instant::now();
    let output = operation().await;
    (output, start.elapsed())
}

/// Elapsed-time tracker for a whole run
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    start: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_measure_times_the_call() {
        let (value, elapsed) = measure(|| async {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            42
        })
        .await;

        assert_eq!(value, 42);
        assert!(elapsed >= Duration::from_millis(1500));
        assert!(elapsed < Duration::from_millis(1600));
    }

    #[tokio::test]
    async fn test_measure_invokes_once() {
        let calls = AtomicU32::new(0);
        let (_, _) = measure(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
