use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};

pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type TaskFn = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// Fires a task immediately and then once per period until stopped.
///
/// Every tick spawns its own execution, so stopping only cancels the timer;
/// executions already running finish on their own. Callers that must not
/// overlap guard themselves.
#[derive(Clone)]
pub struct RecurringTask {
    name: &'static str,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
    ticks: Arc<AtomicU64>,
}

impl RecurringTask {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handle: Arc::new(Mutex::new(None)),
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns `false` when the task is already running.
    pub fn start(&self, period: Duration, task: TaskFn) -> bool {
        let mut slot = self.handle.lock().expect("recurring task handle lock");
        if slot.as_ref().map(|handle| !handle.is_finished()).unwrap_or(false) {
            return false;
        }

        let period = period.max(Duration::from_millis(1));
        let name = self.name;
        let ticks = self.ticks.clone();
        *slot = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let tick = ticks.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::debug!(task = name, tick, "recurring task tick");
                tokio::spawn(task());
            }
        }));
        tracing::info!(task = name, period_ms = period.as_millis() as u64, "recurring task started");
        true
    }

    pub fn stop(&self) -> bool {
        let mut slot = self.handle.lock().expect("recurring task handle lock");
        match slot.take() {
            Some(handle) => {
                handle.abort();
                tracing::info!(task = self.name, "recurring task stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .expect("recurring task handle lock")
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::{RecurringTask, TaskFn, TaskFuture};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Duration;

    fn counting_task(counter: Arc<AtomicUsize>) -> TaskFn {
        Arc::new(move || -> TaskFuture {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test]
    async fn fires_immediately_and_repeats() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = RecurringTask::new("test");
        assert!(task.start(Duration::from_millis(20), counting_task(counter.clone())));

        tokio::time::sleep(Duration::from_millis(110)).await;
        assert!(task.stop());
        assert!(counter.load(Ordering::SeqCst) >= 2);
        assert!(task.ticks() >= 2);
    }

    #[tokio::test]
    async fn refuses_double_start_and_stops_cleanly() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = RecurringTask::new("test");
        assert!(task.start(Duration::from_secs(3600), counting_task(counter.clone())));
        assert!(!task.start(Duration::from_secs(3600), counting_task(counter.clone())));
        assert!(task.is_running());

        assert!(task.stop());
        assert!(!task.stop());
        assert!(!task.is_running());
    }

    #[tokio::test]
    async fn stop_halts_future_ticks() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = RecurringTask::new("test");
        task.start(Duration::from_millis(10), counting_task(counter.clone()));
        tokio::time::sleep(Duration::from_millis(35)).await;
        task.stop();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let after_stop = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), after_stop);
    }
}
