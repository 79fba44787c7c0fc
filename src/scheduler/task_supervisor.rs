use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;

/// Owns every background task the engine starts: response initiation,
/// emergency watchers, audit writes and the periodic loops.
///
/// Shutdown flips a watch flag that long-running tasks select on, then
/// waits up to a grace period before aborting whatever is left.
pub struct TaskSupervisor {
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<JoinSet<()>>,
    keyed: Arc<DashMap<String, ()>>,
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSupervisor {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            tasks: Mutex::new(JoinSet::new()),
            keyed: Arc::new(DashMap::new()),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Tracks `fut` until it completes. Returns `false` once shutdown began.
    pub fn spawn<F>(&self, fut: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shutting_down() {
            return false;
        }

        let mut tasks = self.tasks();
        // Shutdown sets the flag before it takes the set.
        if self.is_shutting_down() {
            return false;
        }
        while tasks.try_join_next().is_some() {}
        tasks.spawn(fut);
        true
    }

    /// Like [`spawn`](Self::spawn) but at most one live task per key.
    /// Returns `false` if a task for `key` is already pending.
    pub fn spawn_keyed<F>(&self, key: impl Into<String>, fut: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shutting_down() {
            return false;
        }

        let key = key.into();
        match self.keyed.entry(key.clone()) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => {
                slot.insert(());
            }
        }

        let keyed = self.keyed.clone();
        let task_key = key.clone();
        let spawned = self.spawn(async move {
            fut.await;
            keyed.remove(&task_key);
        });

        if !spawned {
            self.keyed.remove(&key);
        }
        spawned
    }

    pub fn has_pending(&self, key: &str) -> bool {
        self.keyed.contains_key(key)
    }

    pub fn active_count(&self) -> usize {
        let mut tasks = self.tasks();
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    /// Signals shutdown and waits up to `grace` for tracked tasks to finish.
    /// Returns the number of tasks that had to be aborted.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        // send() drops the value when nobody is subscribed.
        self.shutdown_tx.send_replace(true);

        let mut tasks = std::mem::take(&mut *self.tasks());
        let pending = tasks.len();
        tracing::info!(pending, ?grace, "Waiting for background tasks to finish");

        let drained = timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_ok() {
            return 0;
        }

        let aborted = tasks.len();
        tracing::warn!(aborted, "Grace period elapsed; aborting remaining tasks");
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
        self.keyed.clear();
        aborted
    }
}

/// Resolves once `rx` reports shutdown, or its sender is gone.
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn keyed_tasks_are_deduplicated_until_done() {
        let supervisor = TaskSupervisor::new();

        assert!(supervisor.spawn_keyed("alert-1", sleep(Duration::from_secs(5))));
        assert!(!supervisor.spawn_keyed("alert-1", async {}));
        assert!(supervisor.has_pending("alert-1"));

        sleep(Duration::from_secs(6)).await;
        assert!(!supervisor.has_pending("alert-1"));
        assert!(supervisor.spawn_keyed("alert-1", async {}));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_cooperative_tasks() {
        let supervisor = TaskSupervisor::new();
        let finished = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let mut rx = supervisor.shutdown_signal();
            let finished = finished.clone();
            supervisor.spawn(async move {
                wait_for_shutdown(&mut rx).await;
                finished.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(supervisor.shutdown(Duration::from_secs(1)).await, 0);
        assert_eq!(finished.load(Ordering::SeqCst), 3);
        assert!(!supervisor.spawn(async {}));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_without_listeners_still_refuses_new_work() {
        let supervisor = TaskSupervisor::new();

        assert_eq!(supervisor.shutdown(Duration::from_secs(1)).await, 0);

        assert!(supervisor.is_shutting_down());
        assert!(!supervisor.spawn(async {}));
        assert!(!supervisor.spawn_keyed("alert-1", async {}));
        assert_eq!(supervisor.active_count(), 0);
        assert!(*supervisor.shutdown_signal().borrow());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn spawns_racing_shutdown_are_either_drained_or_refused() {
        let supervisor = Arc::new(TaskSupervisor::new());
        let finished = Arc::new(AtomicUsize::new(0));
        let accepted = Arc::new(AtomicUsize::new(0));

        let mut spawners = Vec::new();
        for _ in 0..8 {
            let supervisor = supervisor.clone();
            let finished = finished.clone();
            let accepted = accepted.clone();
            spawners.push(tokio::spawn(async move {
                for _ in 0..200 {
                    let finished = finished.clone();
                    if supervisor.spawn(async move {
                        finished.fetch_add(1, Ordering::SeqCst);
                    }) {
                        accepted.fetch_add(1, Ordering::SeqCst);
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }

        tokio::task::yield_now().await;
        assert_eq!(supervisor.shutdown(Duration::from_secs(5)).await, 0);
        for spawner in spawners {
            spawner.await.unwrap();
        }

        assert_eq!(supervisor.active_count(), 0);
        assert_eq!(finished.load(Ordering::SeqCst), accepted.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_tasks_past_grace() {
        let supervisor = TaskSupervisor::new();
        supervisor.spawn(sleep(Duration::from_secs(3600)));

        assert_eq!(supervisor.shutdown(Duration::from_secs(2)).await, 1);
    }
}
