//! De-duplicating dispatcher for background weather operations.
//!
//! The coordinator keeps a table of in-flight operations keyed by
//! [`OperationKey`]. A request whose key is already in flight only adds its
//! listener; otherwise a new execution is spawned. When the execution ends,
//! every listener gets the same [`OperationResult`] and the entry is removed.
//! Lookup-or-insert and lookup-or-remove happen under one lock, and nothing
//! awaits while it is held.

use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::{
    runtime::Handle,
    sync::{broadcast, mpsc},
};
use tracing::{debug, info, warn};

use crate::{
    listener::{Listener, ListenerId},
    operation::{Method, OperationKey, OperationRequest, OperationResult, Params, ResultCode},
};

/// Unit of work the coordinator runs for each distinct key.
///
/// Failures are reported through the returned [`ResultCode`].
#[async_trait]
pub trait Execute: Send + Sync {
    async fn execute(&self, method: Method, params: &Params) -> ResultCode;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Stopped,
    Running,
}

/// Broadcast whenever the last in-flight operation completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleSignal;

/// What [`TaskCoordinator::submit`] did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// A new execution was started.
    Started,
    /// The request joined an execution already in flight.
    Attached,
}

struct InFlight {
    generation: u64,
    method: Method,
    listeners: HashMap<ListenerId, mpsc::UnboundedSender<OperationResult>>,
}

struct Table {
    lifecycle: Lifecycle,
    next_generation: u64,
    tasks: HashMap<OperationKey, InFlight>,
}

struct Inner {
    table: Mutex<Table>,
    executor: Arc<dyn Execute>,
    runtime: Handle,
    idle_tx: broadcast::Sender<IdleSignal>,
}

/// Cheaply cloneable handle; clones share one in-flight table.
#[derive(Clone)]
pub struct TaskCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TaskCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.inner.table.lock();
        f.debug_struct("TaskCoordinator")
            .field("lifecycle", &table.lifecycle)
            .field("in_flight", &table.tasks.len())
            .finish()
    }
}

impl TaskCoordinator {
    pub fn new(executor: Arc<dyn Execute>, runtime: Handle) -> Self {
        let (idle_tx, _) = broadcast::channel(16);

        Self {
            inner: Arc::new(Inner {
                table: Mutex::new(Table {
                    lifecycle: Lifecycle::Stopped,
                    next_generation: 0,
                    tasks: HashMap::new(),
                }),
                executor,
                runtime,
                idle_tx,
            }),
        }
    }

    /// Accept a request, starting at most one execution per key.
    pub fn submit(&self, request: OperationRequest) -> Submission {
        let key = request.key();
        let OperationRequest { method, params, listener } = request;
        let (listener_id, sender) = listener.into_parts();

        let mut table = self.inner.table.lock();

        if table.lifecycle == Lifecycle::Stopped {
            info!("coordinator started");
            table.lifecycle = Lifecycle::Running;
        }

        if let Some(op) = table.tasks.get_mut(&key) {
            debug!(%key, listener = %listener_id, "operation already in flight; attaching listener");
            op.listeners.entry(listener_id).or_insert(sender);
            return Submission::Attached;
        }

        let generation = table.next_generation;
        table.next_generation += 1;

        let mut listeners = HashMap::new();
        listeners.insert(listener_id, sender);
        table.tasks.insert(key.clone(), InFlight { generation, method, listeners });
        drop(table);

        self.spawn(key, generation, method, params);
        Submission::Started
    }

    /// Convenience form of [`submit`](Self::submit).
    pub fn request_operation(
        &self,
        method: Method,
        params: Params,
        listener: Listener,
    ) -> Submission {
        self.submit(OperationRequest::new(method, params, listener))
    }

    fn spawn(&self, key: OperationKey, generation: u64, method: Method, params: Params) {
        let coordinator = self.clone();
        let executor = Arc::clone(&self.inner.executor);
        let runtime = self.inner.runtime.clone();

        self.inner.runtime.spawn(async move {
            info!(%key, generation, %method, "starting background operation");

            let work = runtime.spawn(async move { executor.execute(method, &params).await });
            let code = match work.await {
                Ok(code) => code,
                Err(err) => {
                    warn!(%key, error = %err, "operation did not finish; reporting failure");
                    ResultCode::failure(method)
                }
            };

            coordinator.complete(&key, generation, OperationResult { method, code });
        });
    }

    /// Deliver `result` to every listener of `key` and drop the entry.
    ///
    /// Only the worker spawned for `generation` may finish the entry; a
    /// mismatched or missing entry is left alone. Returns the number of
    /// listeners reached.
    fn complete(&self, key: &OperationKey, generation: u64, result: OperationResult) -> usize {
        let mut table = self.inner.table.lock();

        let op = match table.tasks.entry(key.clone()) {
            Entry::Occupied(entry) if entry.get().generation == generation => entry.remove(),
            Entry::Occupied(entry) => {
                let current = entry.get().generation;
                warn!(%key, generation, current, "completion from a stale execution ignored");
                return 0;
            }
            Entry::Vacant(_) => {
                warn!(%key, generation, "completion for an operation that is not in flight");
                return 0;
            }
        };

        info!(%key, method = %op.method, code = result.code.code(), "finishing background operation");

        let mut delivered = 0;
        for (id, sender) in op.listeners {
            match sender.send(result) {
                Ok(()) => {
                    debug!(%key, listener = %id, "result delivered");
                    delivered += 1;
                }
                Err(_) => warn!(%key, listener = %id, "listener is gone; result dropped"),
            }
        }

        if table.tasks.is_empty() {
            info!("no operations outstanding; coordinator idle");
            // Err only means nobody is subscribed.
            let _ = self.inner.idle_tx.send(IdleSignal);
        }

        delivered
    }

    /// Stop if nothing is in flight. A later submit restarts the coordinator.
    pub fn try_shutdown(&self) -> bool {
        let mut table = self.inner.table.lock();

        if !table.tasks.is_empty() {
            debug!(in_flight = table.tasks.len(), "shutdown aborted; operations outstanding");
            return false;
        }

        if table.lifecycle == Lifecycle::Running {
            info!("coordinator stopped");
        }
        table.lifecycle = Lifecycle::Stopped;
        true
    }

    /// Wait until the table drains, then shut down.
    pub async fn run_until_idle(&self) {
        let mut idle = self.subscribe_idle();

        loop {
            if self.try_shutdown() {
                return;
            }

            match idle.recv().await {
                Ok(IdleSignal) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    pub fn subscribe_idle(&self) -> broadcast::Receiver<IdleSignal> {
        self.inner.idle_tx.subscribe()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.table.lock().lifecycle
    }

    pub fn in_flight(&self) -> usize {
        self.inner.table.lock().tasks.len()
    }

    pub fn is_in_flight(&self, key: &OperationKey) -> bool {
        self.inner.table.lock().tasks.contains_key(key)
    }

    pub fn listener_count(&self, key: &OperationKey) -> usize {
        self.inner
            .table
            .lock()
            .tasks
            .get(key)
            .map_or(0, |op| op.listeners.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::{Semaphore, broadcast::error::TryRecvError};

    use super::*;
    use crate::{
        listener::listener,
        operation::{AddCityOutcome, ParamValue},
    };

    /// Counts calls and blocks each one until a permit is released.
    struct GatedExecutor {
        calls: AtomicUsize,
        gate: Semaphore,
    }

    impl GatedExecutor {
        fn new() -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), gate: Semaphore::new(0) })
        }

        fn release(&self, n: usize) {
            self.gate.add_permits(n);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Execute for GatedExecutor {
        async fn execute(&self, method: Method, params: &Params) -> ResultCode {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }

            match method {
                Method::AddCity if params.city_name() == Some("Oslo") => {
                    ResultCode::AddCity(AddCityOutcome::Added)
                }
                Method::AddCity => ResultCode::AddCity(AddCityOutcome::NotFound),
                Method::RefreshForecast => ResultCode::Refresh(params.city_id().is_some()),
                Method::RefreshAll => ResultCode::Refresh(true),
            }
        }
    }

    struct PanickingExecutor;

    #[async_trait]
    impl Execute for PanickingExecutor {
        async fn execute(&self, _method: Method, _params: &Params) -> ResultCode {
            panic!("executor blew up");
        }
    }

    fn coordinator(executor: Arc<dyn Execute>) -> TaskCoordinator {
        TaskCoordinator::new(executor, Handle::current())
    }

    fn forecast(city_id: i64) -> Params {
        Params::new().with_city_id(city_id)
    }

    #[tokio::test]
    async fn identical_requests_share_one_execution() {
        let exec = GatedExecutor::new();
        let coord = coordinator(exec.clone());
        let (first, mut first_rx) = listener("forecast-screen");
        let (second, mut second_rx) = listener("main-screen");

        let started = coord.request_operation(Method::RefreshForecast, forecast(5601538), first);
        let attached = coord.request_operation(Method::RefreshForecast, forecast(5601538), second);
        assert_eq!(started, Submission::Started);
        assert_eq!(attached, Submission::Attached);

        let key = OperationKey::new(Method::RefreshForecast, &forecast(5601538));
        assert_eq!(coord.listener_count(&key), 2);

        exec.release(1);
        let a = first_rx.recv().await.expect("first listener notified");
        let b = second_rx.recv().await.expect("second listener notified");

        assert_eq!(a, b);
        assert_eq!(a, OperationResult { method: Method::RefreshForecast, code: ResultCode::Refresh(true) });
        assert_eq!(exec.calls(), 1);
        assert!(!coord.is_in_flight(&key));
    }

    #[tokio::test]
    async fn different_parameters_run_independently() {
        let exec = GatedExecutor::new();
        let coord = coordinator(exec.clone());
        let (oslo, mut oslo_rx) = listener("a");
        let (nowhere, mut nowhere_rx) = listener("b");

        coord.request_operation(Method::AddCity, Params::new().with_city_name("Oslo"), oslo);
        coord.request_operation(Method::AddCity, Params::new().with_city_name("Nowhereville"), nowhere);
        assert_eq!(coord.in_flight(), 2);

        exec.release(2);
        let oslo_result = oslo_rx.recv().await.expect("oslo result");
        let nowhere_result = nowhere_rx.recv().await.expect("nowhere result");

        assert_eq!(oslo_result.code, ResultCode::AddCity(AddCityOutcome::Added));
        assert_eq!(nowhere_result.code, ResultCode::AddCity(AddCityOutcome::NotFound));
        assert_eq!(exec.calls(), 2);

        // Each channel saw exactly its own result.
        assert!(oslo_rx.try_recv().is_err());
        assert!(nowhere_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn completed_key_starts_a_fresh_execution() {
        let exec = GatedExecutor::new();
        let coord = coordinator(exec.clone());
        exec.release(2);

        let (l1, mut rx1) = listener("ui");
        coord.request_operation(Method::RefreshAll, Params::new(), l1);
        rx1.recv().await.expect("first run");

        let (l2, mut rx2) = listener("ui");
        let again = coord.request_operation(Method::RefreshAll, Params::new(), l2);
        assert_eq!(again, Submission::Started);
        rx2.recv().await.expect("second run");

        assert_eq!(exec.calls(), 2);
    }

    #[tokio::test]
    async fn fan_out_sends_one_notification_per_listener() {
        let exec = GatedExecutor::new();
        let coord = coordinator(exec.clone());

        let mut receivers = Vec::new();
        for i in 0..5 {
            let (l, rx) = listener(format!("listener-{i}"));
            coord.request_operation(Method::RefreshAll, Params::new(), l);
            receivers.push(rx);
        }

        exec.release(1);
        for rx in &mut receivers {
            let result = rx.recv().await.expect("notified");
            assert_eq!(result.code, ResultCode::Refresh(true));
            assert!(rx.try_recv().is_err());
        }
        assert_eq!(exec.calls(), 1);
    }

    #[tokio::test]
    async fn duplicate_listener_ids_collapse() {
        let exec = GatedExecutor::new();
        let coord = coordinator(exec.clone());
        let (first, mut first_rx) = listener("ui");
        let (again, mut again_rx) = listener("ui");

        coord.request_operation(Method::RefreshAll, Params::new(), first);
        coord.request_operation(Method::RefreshAll, Params::new(), again);

        let key = OperationKey::new(Method::RefreshAll, &Params::new());
        assert_eq!(coord.listener_count(&key), 1);

        exec.release(1);
        assert!(first_rx.recv().await.is_some());
        // The duplicate registration was never kept, so its channel just closes.
        assert!(again_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropped_listener_does_not_stop_fan_out() {
        let exec = GatedExecutor::new();
        let coord = coordinator(exec.clone());
        let (gone, gone_rx) = listener("closed-screen");
        let (alive, mut alive_rx) = listener("open-screen");

        coord.request_operation(Method::RefreshAll, Params::new(), gone);
        coord.request_operation(Method::RefreshAll, Params::new(), alive);
        drop(gone_rx);

        exec.release(1);
        assert!(alive_rx.recv().await.is_some());
        assert_eq!(coord.in_flight(), 0);
    }

    #[tokio::test]
    async fn panicking_executor_still_completes() {
        let coord = coordinator(Arc::new(PanickingExecutor));
        let (l, mut rx) = listener("ui");

        coord.request_operation(Method::AddCity, Params::new().with_city_name("Oslo"), l);

        let result = rx.recv().await.expect("failure is still delivered");
        assert_eq!(result.code, ResultCode::AddCity(AddCityOutcome::Error));
        assert_eq!(coord.in_flight(), 0);
    }

    #[tokio::test]
    async fn idle_signal_fires_once_when_table_drains() {
        let exec = GatedExecutor::new();
        let coord = coordinator(exec.clone());
        let mut idle = coord.subscribe_idle();
        let (l, mut rx) = listener("ui");

        coord.request_operation(Method::RefreshAll, Params::new(), l);
        exec.release(1);
        rx.recv().await.expect("result");

        assert_eq!(idle.try_recv(), Ok(IdleSignal));
        assert_eq!(idle.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn no_idle_signal_while_other_operations_run() {
        let exec = GatedExecutor::new();
        let coord = coordinator(exec.clone());
        let mut idle = coord.subscribe_idle();
        let (a, mut a_rx) = listener("a");
        let (b, mut b_rx) = listener("b");

        coord.request_operation(Method::RefreshForecast, forecast(1), a);
        coord.request_operation(Method::RefreshForecast, forecast(2), b);

        exec.release(1);
        // Whichever finished first, the other keeps the table non-empty.
        tokio::select! {
            _ = a_rx.recv() => {}
            _ = b_rx.recv() => {}
        }
        assert_eq!(idle.try_recv(), Err(TryRecvError::Empty));

        exec.release(1);
        idle.recv().await.expect("idle after the second completion");
    }

    #[tokio::test]
    async fn shutdown_is_refused_while_in_flight_and_restart_is_possible() {
        let exec = GatedExecutor::new();
        let coord = coordinator(exec.clone());
        assert_eq!(coord.lifecycle(), Lifecycle::Stopped);

        let (l, mut rx) = listener("ui");
        coord.request_operation(Method::RefreshAll, Params::new(), l);
        assert_eq!(coord.lifecycle(), Lifecycle::Running);
        assert!(!coord.try_shutdown());

        exec.release(1);
        rx.recv().await.expect("result");
        assert!(coord.try_shutdown());
        assert_eq!(coord.lifecycle(), Lifecycle::Stopped);

        let (l, mut rx) = listener("ui");
        assert_eq!(
            coord.request_operation(Method::RefreshAll, Params::new(), l),
            Submission::Started
        );
        assert_eq!(coord.lifecycle(), Lifecycle::Running);
        exec.release(1);
        rx.recv().await.expect("restarted coordinator delivers");
    }

    #[tokio::test]
    async fn run_until_idle_returns_after_last_completion() {
        let exec = GatedExecutor::new();
        let coord = coordinator(exec.clone());
        let (l, _rx) = listener("ui");
        coord.request_operation(Method::RefreshAll, Params::new(), l);

        let waiter = tokio::spawn({
            let coord = coord.clone();
            async move { coord.run_until_idle().await }
        });

        exec.release(1);
        tokio::time::timeout(std::time::Duration::from_secs(5), waiter)
            .await
            .expect("run_until_idle finished")
            .expect("task joined");
        assert_eq!(coord.lifecycle(), Lifecycle::Stopped);
    }

    #[tokio::test]
    async fn completing_unknown_key_is_a_no_op() {
        let coord = coordinator(GatedExecutor::new());
        let mut params = Params::new();
        params.insert("city_id", ParamValue::Int(1));
        let key = OperationKey::new(Method::RefreshForecast, &params);

        let delivered = coord.complete(
            &key,
            0,
            OperationResult { method: Method::RefreshForecast, code: ResultCode::Refresh(true) },
        );
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn stale_completion_leaves_running_execution_in_place() {
        let exec = GatedExecutor::new();
        let coord = coordinator(exec.clone());
        let key = OperationKey::new(Method::RefreshForecast, &forecast(5601538));
        let (first, mut first_rx) = listener("forecast-screen");
        coord.request_operation(Method::RefreshForecast, forecast(5601538), first);

        let stale = OperationResult { method: Method::RefreshForecast, code: ResultCode::Refresh(false) };
        assert_eq!(coord.complete(&key, 7, stale), 0);
        assert!(coord.is_in_flight(&key));

        // The running execution still owns the key, so no second one starts.
        let (second, mut second_rx) = listener("main-screen");
        assert_eq!(
            coord.request_operation(Method::RefreshForecast, forecast(5601538), second),
            Submission::Attached
        );

        exec.release(1);
        let expected = OperationResult { method: Method::RefreshForecast, code: ResultCode::Refresh(true) };
        assert_eq!(first_rx.recv().await, Some(expected));
        assert_eq!(second_rx.recv().await, Some(expected));
        assert_eq!(exec.calls(), 1);
        assert!(!coord.is_in_flight(&key));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn submit_racing_completion_gets_exactly_one_result() {
        let exec = GatedExecutor::new();
        let coord = coordinator(exec.clone());
        let rounds = 200;
        let mut fresh_starts = 0;

        for round in 0..rounds {
            let (a, mut a_rx) = listener("a");
            assert_eq!(
                coord.request_operation(Method::RefreshAll, Params::new(), a),
                Submission::Started,
                "round {round}"
            );

            let releaser = tokio::spawn({
                let exec = exec.clone();
                async move { exec.release(1) }
            });
            let submitter = tokio::spawn({
                let coord = coord.clone();
                async move {
                    let (b, rx) = listener("b");
                    (coord.request_operation(Method::RefreshAll, Params::new(), b), rx)
                }
            });

            releaser.await.expect("releaser joined");
            let (submission, mut b_rx) = submitter.await.expect("submitter joined");
            if submission == Submission::Started {
                fresh_starts += 1;
                exec.release(1);
            }

            assert!(a_rx.recv().await.is_some(), "round {round}: first caller");
            assert!(b_rx.recv().await.is_some(), "round {round}: racing caller");
            coord.run_until_idle().await;

            assert!(a_rx.try_recv().is_err(), "round {round}: first caller notified twice");
            assert!(b_rx.try_recv().is_err(), "round {round}: racing caller notified twice");
        }

        assert_eq!(exec.calls(), rounds + fresh_starts);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_identical_submits_execute_once() {
        let exec = GatedExecutor::new();
        let coord = coordinator(exec.clone());

        let mut submitters = Vec::new();
        for i in 0..16 {
            let coord = coord.clone();
            submitters.push(tokio::spawn(async move {
                let (l, rx) = listener(format!("caller-{i}"));
                coord.request_operation(Method::RefreshForecast, forecast(5601538), l);
                rx
            }));
        }

        let mut receivers = Vec::new();
        for handle in submitters {
            receivers.push(handle.await.expect("submitter joined"));
        }

        exec.release(1);
        for rx in &mut receivers {
            let result = rx.recv().await.expect("notified");
            assert_eq!(result.code, ResultCode::Refresh(true));
        }
        assert_eq!(exec.calls(), 1);
    }
}
