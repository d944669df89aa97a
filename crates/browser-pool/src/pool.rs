//! Worker-per-resource pool with round-robin dispatch
//!
//! Each slot owns one resource and one worker task reading from a bounded
//! queue. Because only the worker touches its resource, a handle is never used
//! by two tasks at once. The round-robin cursor and the closed flag are the
//! only state shared between callers and are updated atomically.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::proxy::ProxyDescriptor;
use crate::resource::{AutomationResource, ResourceFactory};

/// Cursor value past which the round-robin counter is reset to zero.
const CURSOR_RESET_THRESHOLD: usize = 1_000_000;

/// A queued unit of work, already wrapped with panic recovery and result delivery.
type Job<R> = Box<dyn for<'a> FnOnce(&'a mut R) -> BoxFuture<'a, ()> + Send>;

/// Pool sizing and per-slot proxy assignment.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of resources (and workers). Must be > 0.
    pub size: usize,
    /// Capacity of each slot's task queue. Must be > 0.
    pub task_queue_size: usize,
    /// Proxy for slot `i` is `proxies[i]`; extra slots run without a proxy.
    pub proxies: Vec<ProxyDescriptor>,
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::InvalidConfig(
                "pool size must be greater than 0".into(),
            ));
        }
        if self.task_queue_size == 0 {
            return Err(Error::InvalidConfig(
                "task queue size must be greater than 0".into(),
            ));
        }
        if self.proxies.len() > self.size {
            warn!(
                proxies = self.proxies.len(),
                size = self.size,
                "more proxies than pool slots, extra proxies are unused"
            );
        }
        Ok(())
    }
}

/// Bounded pool of automation resources.
pub struct ResourcePool<R: AutomationResource> {
    size: usize,
    queues: RwLock<Vec<mpsc::Sender<Job<R>>>>,
    workers: Mutex<Vec<JoinHandle<R>>>,
    in_flight: Vec<Arc<AtomicU64>>,
    proxies: Vec<Option<String>>,
    cursor: AtomicUsize,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl<R: AutomationResource> ResourcePool<R> {
    /// Create every resource and start one worker per slot.
    ///
    /// Resources are created concurrently; this returns once all of them are
    /// ready. On the first creation error the remaining creations are dropped,
    /// the resources created so far are released, and the error is returned.
    pub async fn new<F>(config: PoolConfig, factory: &F) -> Result<Self>
    where
        F: ResourceFactory<Resource = R>,
    {
        config.validate()?;

        let mut created: Vec<Option<R>> = (0..config.size).map(|_| None).collect();
        let mut pending: FuturesUnordered<_> = (0..config.size)
            .map(|slot| {
                let proxy = config.proxies.get(slot);
                async move { (slot, factory.create(slot, proxy).await) }
            })
            .collect();

        while let Some((slot, result)) = pending.next().await {
            match result {
                Ok(resource) => {
                    debug!(slot, "resource ready");
                    created[slot] = Some(resource);
                }
                Err(e) => {
                    drop(pending);
                    error!(slot, error = %e, "resource initialization failed, tearing down pool");
                    for (idx, resource) in created.into_iter().enumerate() {
                        if let Some(resource) = resource
                            && let Err(release_err) = resource.release().await
                        {
                            warn!(
                                slot = idx,
                                error = %release_err,
                                "failed to release resource during teardown"
                            );
                        }
                    }
                    return Err(Error::ResourceInit {
                        slot,
                        message: e.to_string(),
                    });
                }
            }
        }

        let mut queues = Vec::with_capacity(config.size);
        let mut workers = Vec::with_capacity(config.size);
        for (slot, resource) in created.into_iter().enumerate() {
            let Some(resource) = resource else {
                return Err(Error::ResourceInit {
                    slot,
                    message: "resource missing after initialization".into(),
                });
            };
            let (tx, rx) = mpsc::channel(config.task_queue_size);
            queues.push(tx);
            workers.push(tokio::spawn(run_worker(slot, resource, rx)));
        }

        let proxies = (0..config.size)
            .map(|slot| config.proxies.get(slot).map(ProxyDescriptor::endpoint))
            .collect();

        info!(
            size = config.size,
            task_queue_size = config.task_queue_size,
            proxies = config.proxies.len().min(config.size),
            "resource pool initialized"
        );

        Ok(Self {
            size: config.size,
            queues: RwLock::new(queues),
            workers: Mutex::new(workers),
            in_flight: (0..config.size).map(|_| Arc::new(AtomicU64::new(0))).collect(),
            proxies,
            cursor: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        })
    }

    /// Run `task` on the next resource and wait for its result.
    ///
    /// Fails immediately with `Closed` once the pool is closed. A panic inside
    /// the task is returned as `TaskPanicked` and the worker keeps serving. If
    /// the pool shuts down while waiting, returns `Cancelled` even though the
    /// task may still be running on its worker.
    pub async fn use_resource<T, F>(&self, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(ExecutionContext, &'a mut R) -> BoxFuture<'a, T> + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }

        let slot = self.next_slot();
        let queue = {
            let queues = self.queues.read().map_err(|_| Error::Closed)?;
            queues.get(slot).cloned()
        }
        .ok_or(Error::Closed)?;

        let (result_tx, result_rx) = oneshot::channel();
        let ctx = ExecutionContext::new(slot, self.shutdown.child_token());
        let in_flight = self.in_flight[slot].clone();

        let job = boxed_job(move |resource: &mut R| {
            Box::pin(async move {
                if ctx.is_cancelled() {
                    metrics::counter!("browser_pool_tasks_total", "outcome" => "cancelled")
                        .increment(1);
                    let _ = result_tx.send(Err(Error::Cancelled));
                    return;
                }

                in_flight.fetch_add(1, Ordering::Relaxed);
                metrics::gauge!("browser_pool_tasks_in_flight").increment(1.0);
                let outcome = AssertUnwindSafe(async move { task(ctx, resource).await })
                    .catch_unwind()
                    .await;
                in_flight.fetch_sub(1, Ordering::Relaxed);
                metrics::gauge!("browser_pool_tasks_in_flight").decrement(1.0);

                let result = match outcome {
                    Ok(value) => {
                        metrics::counter!("browser_pool_tasks_total", "outcome" => "ok")
                            .increment(1);
                        Ok(value)
                    }
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        error!(slot, panic = %message, "panic recovered in pool task");
                        metrics::counter!("browser_pool_tasks_total", "outcome" => "panicked")
                            .increment(1);
                        Err(Error::TaskPanicked(message))
                    }
                };
                // Caller may have given up on shutdown; nothing left to notify.
                let _ = result_tx.send(result);
            })
        });

        tokio::select! {
            sent = queue.send(job) => sent.map_err(|_| Error::WorkerGone)?,
            _ = self.shutdown.cancelled() => return Err(Error::Cancelled),
        }
        drop(queue);

        tokio::select! {
            biased;
            result = result_rx => result.unwrap_or(Err(Error::WorkerGone)),
            _ = self.shutdown.cancelled() => Err(Error::Cancelled),
        }
    }

    /// Shut the pool down. Only the first call has any effect.
    ///
    /// Cancels the shared context, closes every queue, waits for each worker to
    /// drain and exit, then releases every resource. Release failures are
    /// collected into a single `Release` error.
    pub async fn close(&self) -> Result<()> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        info!(size = self.size, "closing resource pool");
        self.shutdown.cancel();
        match self.queues.write() {
            Ok(mut queues) => queues.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }

        let workers = std::mem::take(&mut *self.workers.lock().await);
        let mut errors = Vec::new();
        let mut resources = Vec::with_capacity(workers.len());
        for (slot, handle) in workers.into_iter().enumerate() {
            match handle.await {
                Ok(resource) => resources.push((slot, resource)),
                Err(e) => errors.push(format!("slot {slot}: worker task failed: {e}")),
            }
        }

        for (slot, resource) in resources {
            if let Err(e) = resource.release().await {
                warn!(slot, error = %e, "failed to release resource");
                errors.push(format!("slot {slot}: {e}"));
            }
        }

        if errors.is_empty() {
            info!("resource pool closed");
            Ok(())
        } else {
            Err(Error::Release(errors))
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Pool health summary for the health endpoint.
    ///
    /// Reports per-slot in-flight and queued task counts alongside the proxy
    /// endpoint (credentials never included).
    pub fn health(&self) -> serde_json::Value {
        let queued: Vec<usize> = match self.queues.read() {
            Ok(queues) => queues
                .iter()
                .map(|q| q.max_capacity() - q.capacity())
                .collect(),
            Err(_) => Vec::new(),
        };

        let mut total_in_flight = 0u64;
        let slots: Vec<serde_json::Value> = (0..self.size)
            .map(|slot| {
                let in_flight = self.in_flight[slot].load(Ordering::Relaxed);
                total_in_flight += in_flight;
                serde_json::json!({
                    "slot": slot,
                    "proxy": self.proxies[slot],
                    "in_flight": in_flight,
                    "queued": queued.get(slot).copied().unwrap_or(0),
                })
            })
            .collect();

        serde_json::json!({
            "status": if self.is_closed() { "closed" } else { "healthy" },
            "size": self.size,
            "tasks_in_flight": total_in_flight,
            "slots": slots,
        })
    }

    /// Round-robin slot selection. The reset is advisory; a few callers racing
    /// past the threshold only skew the distribution briefly.
    fn next_slot(&self) -> usize {
        let ticket = self.cursor.fetch_add(1, Ordering::Relaxed);
        if ticket > CURSOR_RESET_THRESHOLD {
            self.cursor.store(0, Ordering::Relaxed);
        }
        ticket % self.size
    }
}

impl<R: AutomationResource> Drop for ResourcePool<R> {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::Acquire) {
            self.shutdown.cancel();
            warn!("resource pool dropped without close, resources were not released");
        }
    }
}

fn boxed_job<R, C>(job: C) -> Job<R>
where
    C: for<'a> FnOnce(&'a mut R) -> BoxFuture<'a, ()> + Send + 'static,
{
    Box::new(job)
}

/// Worker loop: run queued jobs one at a time until the queue is closed and empty.
async fn run_worker<R: AutomationResource>(
    slot: usize,
    mut resource: R,
    mut queue: mpsc::Receiver<Job<R>>,
) -> R {
    debug!(slot, "worker started");
    while let Some(job) = queue.recv().await {
        job(&mut resource).await;
    }
    debug!(slot, "worker queue closed, exiting");
    resource
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// Resource that records which tasks touched it and detects overlapping use.
    struct FakeResource {
        slot: usize,
        busy: Arc<AtomicBool>,
        released: Arc<AtomicUsize>,
        fail_release: bool,
        tasks_run: u64,
    }

    impl AutomationResource for FakeResource {
        async fn release(self) -> Result<()> {
            self.released.fetch_add(1, Ordering::SeqCst);
            if self.fail_release {
                return Err(Error::PageLoad {
                    url: format!("slot-{}", self.slot),
                    message: "release failed".into(),
                });
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeFactory {
        fail_at: Option<usize>,
        fail_release: bool,
        created: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
        proxies_seen: Arc<StdMutex<Vec<(usize, Option<String>)>>>,
    }

    impl ResourceFactory for FakeFactory {
        type Resource = FakeResource;

        async fn create(
            &self,
            slot: usize,
            proxy: Option<&ProxyDescriptor>,
        ) -> Result<FakeResource> {
            self.proxies_seen
                .lock()
                .unwrap()
                .push((slot, proxy.map(ProxyDescriptor::endpoint)));
            if self.fail_at == Some(slot) {
                return Err(Error::PageLoad {
                    url: "about:blank".into(),
                    message: "launch failed".into(),
                });
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(FakeResource {
                slot,
                busy: Arc::new(AtomicBool::new(false)),
                released: self.released.clone(),
                fail_release: self.fail_release,
                tasks_run: 0,
            })
        }
    }

    fn config(size: usize) -> PoolConfig {
        PoolConfig {
            size,
            task_queue_size: 16,
            proxies: vec![],
        }
    }

    #[tokio::test]
    async fn rejects_zero_size_and_zero_queue() {
        let factory = FakeFactory::default();
        let err = ResourcePool::new(config(0), &factory).await.err().unwrap();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let cfg = PoolConfig {
            size: 2,
            task_queue_size: 0,
            proxies: vec![],
        };
        let err = ResourcePool::new(cfg, &factory).await.err().unwrap();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert_eq!(factory.created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn assigns_proxies_to_leading_slots() {
        let factory = FakeFactory::default();
        let cfg = PoolConfig {
            size: 3,
            task_queue_size: 4,
            proxies: vec!["http://u:p@10.0.0.1:3128".parse().unwrap()],
        };
        let pool = ResourcePool::new(cfg, &factory).await.unwrap();

        let mut seen = factory.proxies_seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec![
                (0, Some("http://10.0.0.1:3128".to_string())),
                (1, None),
                (2, None),
            ]
        );
        pool.close().await.unwrap();
    }

    #[tokio::test]
    async fn round_robin_visits_each_slot_once_before_repeating() {
        let factory = FakeFactory::default();
        let pool = ResourcePool::new(config(3), &factory).await.unwrap();

        let mut visited = Vec::new();
        for _ in 0..6 {
            let slot = pool
                .use_resource(|ctx, res: &mut FakeResource| {
                    Box::pin(async move {
                        assert_eq!(ctx.slot(), res.slot);
                        res.slot
                    })
                })
                .await
                .unwrap();
            visited.push(slot);
        }
        assert_eq!(visited, vec![0, 1, 2, 0, 1, 2]);
        pool.close().await.unwrap();
    }

    #[tokio::test]
    async fn handle_is_never_used_concurrently() {
        let factory = FakeFactory::default();
        let pool = Arc::new(ResourcePool::new(config(2), &factory).await.unwrap());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let pool = pool.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                pool.use_resource(move |_ctx, res: &mut FakeResource| {
                    Box::pin(async move {
                        assert!(
                            !res.busy.swap(true, Ordering::SeqCst),
                            "resource {} used by two tasks at once",
                            res.slot
                        );
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        res.tasks_run += 1;
                        res.busy.store(false, Ordering::SeqCst);
                    })
                })
                .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        pool.close().await.unwrap();
    }

    #[tokio::test]
    async fn panicking_task_returns_error_and_worker_survives() {
        let factory = FakeFactory::default();
        let pool = ResourcePool::new(config(1), &factory).await.unwrap();

        let err = pool
            .use_resource(|_ctx, _res: &mut FakeResource| {
                Box::pin(async move {
                    panic!("bad user agent");
                })
            })
            .await
            .unwrap_err();
        assert_eq!(err, Error::TaskPanicked("bad user agent".into()));

        let runs = pool
            .use_resource(|_ctx, res: &mut FakeResource| {
                Box::pin(async move {
                    res.tasks_run += 1;
                    res.tasks_run
                })
            })
            .await
            .unwrap();
        assert_eq!(runs, 1);
        pool.close().await.unwrap();
    }

    #[tokio::test]
    async fn use_after_close_fails_without_blocking() {
        let factory = FakeFactory::default();
        let pool = ResourcePool::new(config(2), &factory).await.unwrap();
        pool.close().await.unwrap();

        let result = tokio::time::timeout(
            Duration::from_millis(100),
            pool.use_resource(|_ctx, _res: &mut FakeResource| Box::pin(async {})),
        )
        .await
        .expect("use_resource blocked on a closed pool");
        assert_eq!(result.unwrap_err(), Error::Closed);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let factory = FakeFactory::default();
        let pool = ResourcePool::new(config(3), &factory).await.unwrap();

        pool.close().await.unwrap();
        pool.close().await.unwrap();

        assert_eq!(factory.released.load(Ordering::SeqCst), 3);
        assert!(pool.is_closed());
    }

    #[tokio::test]
    async fn close_aggregates_release_errors() {
        let factory = FakeFactory {
            fail_release: true,
            ..Default::default()
        };
        let pool = ResourcePool::new(config(2), &factory).await.unwrap();

        match pool.close().await {
            Err(Error::Release(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected release error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_unblocks_waiting_caller() {
        let factory = FakeFactory::default();
        let pool = Arc::new(ResourcePool::new(config(1), &factory).await.unwrap());

        let caller = {
            let pool = pool.clone();
            tokio::spawn(async move {
                pool.use_resource(|_ctx, _res: &mut FakeResource| {
                    Box::pin(async move {
                        // Ignores its context on purpose
                        tokio::time::sleep(Duration::from_millis(300)).await;
                    })
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let closer = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.close().await })
        };

        let result = tokio::time::timeout(Duration::from_millis(150), caller)
            .await
            .expect("caller must return promptly on shutdown")
            .unwrap();
        assert_eq!(result.unwrap_err(), Error::Cancelled);

        closer.await.unwrap().unwrap();
        assert_eq!(factory.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn init_failure_releases_created_resources() {
        let factory = FakeFactory {
            fail_at: Some(1),
            ..Default::default()
        };
        let err = ResourcePool::new(config(3), &factory).await.err().unwrap();

        assert!(matches!(err, Error::ResourceInit { slot: 1, .. }), "got {err:?}");
        assert_eq!(
            factory.released.load(Ordering::SeqCst),
            factory.created.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn health_reports_slots() {
        let factory = FakeFactory::default();
        let pool = ResourcePool::new(config(2), &factory).await.unwrap();

        let health = pool.health();
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["size"], 2);
        assert_eq!(health["slots"].as_array().unwrap().len(), 2);
        assert_eq!(health["tasks_in_flight"], 0);

        pool.close().await.unwrap();
        assert_eq!(pool.health()["status"], "closed");
    }

    #[tokio::test]
    async fn task_metrics_are_recorded() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let factory = FakeFactory::default();
        let pool = ResourcePool::new(config(1), &factory).await.unwrap();
        pool.use_resource(|_ctx, _res: &mut FakeResource| Box::pin(async {}))
            .await
            .unwrap();
        pool.close().await.unwrap();

        let output = handle.render();
        assert!(
            output.contains("browser_pool_tasks_total"),
            "rendered output must contain task counter: {output}"
        );
    }
}
