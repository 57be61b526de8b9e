//! Fire-and-forget work that must not affect the request that started it.
//!
//! Tasks are spawned straight into a shared `JoinSet`, so aborting the set
//! stops the work itself. An `Err` result is logged where the task ends; a
//! panic surfaces as a `JoinError` when the set is reaped and is logged under
//! the `background` target there.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, warn};

#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl std::fmt::Debug for BackgroundTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTasks").field("pending", &self.pending()).finish()
    }
}

fn log_join_error(e: JoinError) {
    if e.is_panic() {
        error!(target: "background", "background task panicked");
    } else {
        debug!(target: "background", "background task cancelled");
    }
}

/// Collect finished tasks without waiting.
fn reap(set: &mut JoinSet<()>) {
    while let Some(res) = set.try_join_next() {
        if let Err(e) = res {
            log_join_error(e);
        }
    }
}

impl BackgroundTasks {
    pub fn new() -> Self { Self::default() }

    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut set = self.tasks.lock();
        reap(&mut set);
        set.spawn(async move {
            match task.await {
                Ok(()) => debug!(target: "background", task = name, "background task finished"),
                Err(e) => error!(target: "background", task = name, error = %e, "background task failed"),
            }
        });
    }

    /// Tasks spawned and not yet finished.
    pub fn pending(&self) -> usize {
        let mut set = self.tasks.lock();
        reap(&mut set);
        set.len()
    }

    /// Wait up to `timeout` for every task; whatever is left is aborted and
    /// awaited until cancelled. Returns true when everything finished in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let mut set = std::mem::take(&mut *self.tasks.lock());
        let drained = tokio::time::timeout(timeout, async {
            while let Some(res) = set.join_next().await {
                if let Err(e) = res {
                    log_join_error(e);
                }
            }
        })
        .await
        .is_ok();
        if !drained {
            warn!(target: "background", remaining = set.len(), "aborting background tasks after shutdown timeout");
            set.abort_all();
            while let Some(res) = set.join_next().await {
                if let Err(e) = res {
                    log_join_error(e);
                }
            }
        }
        drained
    }
}

/// Run `op` up to `attempts` times, sleeping `delay` between failures.
pub async fn retry<T, F, Fut>(attempts: usize, delay: Duration, mut op: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                debug!(target: "background", attempt, error = %e, "retrying");
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn ran_flag() -> bool { true }

    #[tokio::test]
    async fn failures_and_panics_stay_contained() {
        let tasks = BackgroundTasks::new();
        let ran = Arc::new(AtomicUsize::new(0));
        tasks.spawn("fails", async { Err(anyhow::anyhow!("smtp down")) });
        tasks.spawn("panics", async {
            if ran_flag() { panic!("boom") }
            Ok(())
        });
        let r = ran.clone();
        tasks.spawn("ok", async move {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(tasks.shutdown(Duration::from_secs(5)).await);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(tasks.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_stragglers() {
        let tasks = BackgroundTasks::new();
        let finished = Arc::new(AtomicBool::new(false));
        let f = finished.clone();
        tasks.spawn("slow", async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            f.store(true, Ordering::SeqCst);
            Ok(())
        });
        assert!(!tasks.shutdown(Duration::from_secs(1)).await);
        assert_eq!(tasks.pending(), 0);

        // an aborted task never reaches its side effect
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_fixed_attempts() {
        let calls = AtomicUsize::new(0);
        let result: anyhow::Result<()> = retry(3, Duration::from_millis(500), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(anyhow::anyhow!("nope")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let calls = AtomicUsize::new(0);
        let value = retry(3, Duration::from_millis(500), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { if n == 0 { Err(anyhow::anyhow!("transient")) } else { Ok(n) } }
        })
        .await
        .unwrap();
        assert_eq!(value, 1);
    }
}
