//! Trigger dispatch state machine.
//!
//! Every invocation goes through the same steps:
//!
//! 1. Get the module from the [`ModuleSlot`], loading it if this is the first
//!    invocation. Loads are single-flight: concurrent first invocations wait
//!    for one load instead of starting their own.
//! 2. Create a fresh instance. Instances are never reused, so mutable
//!    binding state cannot leak between invocations.
//! 3. Wait for that instance's readiness signal.
//! 4. Forward the trigger to the binding method matching its kind.
//!
//! The slot moves `Unloaded → Loading → Ready`. A failed load moves it back
//! to `Unloaded`, and the next invocation loads again.

use std::future::Future;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{OnceCell, oneshot};
use tracing::{debug, info, instrument, warn};

use wasmflare_common::{DispatchError, TriggerKind};

/// Load state of a [`ModuleSlot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoadState {
    /// No module loaded and no load in flight.
    Unloaded = 0,
    /// A load is in flight.
    Loading = 1,
    /// The module is loaded and memoized.
    Ready = 2,
}

impl LoadState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LoadState::Loading,
            2 => LoadState::Ready,
            _ => LoadState::Unloaded,
        }
    }
}

/// Process-lifetime, load-once holder for a module.
#[derive(Debug)]
pub struct ModuleSlot<M> {
    cell: OnceCell<M>,
    state: AtomicU8,
    loads: AtomicUsize,
}

impl<M> Default for ModuleSlot<M> {
    fn default() -> Self {
        Self {
            cell: OnceCell::new(),
            state: AtomicU8::new(LoadState::Unloaded as u8),
            loads: AtomicUsize::new(0),
        }
    }
}

impl<M> ModuleSlot<M> {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current load state.
    pub fn state(&self) -> LoadState {
        LoadState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Number of loads started so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Acquire)
    }

    /// Return the module, running `load` if none is memoized.
    ///
    /// Only one `load` runs at a time; other callers wait for it. If it
    /// fails, the error goes to the caller that ran it and the slot returns
    /// to [`LoadState::Unloaded`].
    pub async fn get_or_load<F, Fut>(&self, load: F) -> Result<&M, DispatchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<M, DispatchError>>,
    {
        if let Some(module) = self.cell.get() {
            return Ok(module);
        }

        self.cell
            .get_or_try_init(|| async {
                self.state.store(LoadState::Loading as u8, Ordering::Release);
                self.loads.fetch_add(1, Ordering::AcqRel);

                match load().await {
                    Ok(module) => {
                        self.state.store(LoadState::Ready as u8, Ordering::Release);
                        Ok(module)
                    }
                    Err(e) => {
                        self.state.store(LoadState::Unloaded as u8, Ordering::Release);
                        Err(e)
                    }
                }
            })
            .await
    }
}

/// Create a connected readiness signal and waiter.
pub fn readiness() -> (ReadySignal, ReadyWaiter) {
    let (tx, rx) = oneshot::channel();
    (ReadySignal { tx }, ReadyWaiter { rx })
}

/// Instance side of the readiness handshake.
///
/// Dropping it without calling [`ReadySignal::signal`] abandons the wait.
#[derive(Debug)]
pub struct ReadySignal {
    tx: oneshot::Sender<()>,
}

impl ReadySignal {
    /// Signal that the instance has published its bindings.
    pub fn signal(self) {
        // The waiter may already have timed out.
        let _ = self.tx.send(());
    }
}

/// Dispatcher side of the readiness handshake.
#[derive(Debug)]
pub struct ReadyWaiter {
    rx: oneshot::Receiver<()>,
}

impl ReadyWaiter {
    /// Wait for the signal, up to `deadline` if one is given.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ReadinessAbandoned`] if the signal was dropped,
    /// or [`DispatchError::ReadyTimeout`] if the deadline passed first.
    pub async fn wait(self, deadline: Option<Duration>) -> Result<(), DispatchError> {
        let Some(deadline) = deadline else {
            return self.rx.await.map_err(|_| DispatchError::ReadinessAbandoned);
        };

        match tokio::time::timeout(deadline, self.rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(DispatchError::ReadinessAbandoned),
            Err(_) => Err(DispatchError::ReadyTimeout {
                waited_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

/// A platform event to deliver to the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    /// Kind of event; selects the binding method.
    pub kind: TriggerKind,
    /// Serialized event (request, scheduled event or message batch).
    pub payload: Vec<u8>,
}

impl Trigger {
    /// Create a trigger.
    pub fn new(kind: TriggerKind, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }
}

/// Per-invocation context handed to the host when instantiating.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    /// Unique identifier of this invocation.
    pub invocation_id: String,
    /// Kind of the trigger being dispatched.
    pub trigger: TriggerKind,
    /// When dispatch started.
    pub started_at: Instant,
}

impl InvocationContext {
    /// Create a context with a fresh invocation id.
    pub fn new(trigger: TriggerKind) -> Self {
        Self {
            invocation_id: uuid::Uuid::new_v4().to_string(),
            trigger,
            started_at: Instant::now(),
        }
    }
}

/// Loads, instantiates and calls into modules for a [`Dispatcher`].
#[async_trait]
pub trait ModuleHost: Send + Sync {
    /// Loaded, reusable module.
    type Module: Send + Sync;

    /// One instantiation of the module.
    type Instance: Send;

    /// Load the module. Called at most once at a time per dispatcher.
    async fn load(&self) -> Result<Self::Module, DispatchError>;

    /// Create a fresh instance and start its run loop.
    ///
    /// The instance signals `ready` once its bindings are published. The
    /// host may return before that happens.
    async fn instantiate(
        &self,
        module: &Self::Module,
        ctx: &InvocationContext,
        ready: ReadySignal,
    ) -> Result<Self::Instance, DispatchError>;

    /// Call the binding for `trigger.kind` on a ready instance.
    async fn forward(
        &self,
        instance: &mut Self::Instance,
        trigger: &Trigger,
    ) -> Result<Vec<u8>, DispatchError>;
}

/// Delivers triggers to per-invocation instances of a load-once module.
pub struct Dispatcher<H: ModuleHost> {
    host: H,
    slot: ModuleSlot<H::Module>,
    ready_timeout: Option<Duration>,
}

impl<H: ModuleHost> Dispatcher<H> {
    /// Create a dispatcher that waits for readiness without a deadline.
    pub fn new(host: H) -> Self {
        Self {
            host,
            slot: ModuleSlot::new(),
            ready_timeout: None,
        }
    }

    /// Set the readiness deadline. `None` waits indefinitely.
    #[must_use]
    pub fn with_ready_timeout(mut self, ready_timeout: Option<Duration>) -> Self {
        self.ready_timeout = ready_timeout;
        self
    }

    /// The underlying host.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Load state of the module slot.
    pub fn load_state(&self) -> LoadState {
        self.slot.state()
    }

    /// Number of module loads started.
    pub fn load_count(&self) -> usize {
        self.slot.load_count()
    }

    /// Deliver one trigger and return the binding's response.
    ///
    /// # Errors
    ///
    /// Returns the load, instantiation, readiness or forwarding error. The
    /// trigger is never forwarded to an instance that has not signalled ready.
    #[instrument(skip_all, fields(trigger = %trigger.kind))]
    pub async fn dispatch(&self, trigger: &Trigger) -> Result<Vec<u8>, DispatchError> {
        let ctx = InvocationContext::new(trigger.kind);

        let module = self.slot.get_or_load(|| self.host.load()).await.inspect_err(|e| {
            warn!(invocation_id = %ctx.invocation_id, error = %e, "Module load failed");
        })?;

        let (signal, waiter) = readiness();
        let mut instance = self.host.instantiate(module, &ctx, signal).await?;

        waiter.wait(self.ready_timeout).await.inspect_err(|e| {
            warn!(invocation_id = %ctx.invocation_id, error = %e, "Instance never became ready");
        })?;
        debug!(invocation_id = %ctx.invocation_id, "Instance ready");

        let response = self.host.forward(&mut instance, trigger).await?;

        info!(
            invocation_id = %ctx.invocation_id,
            binding = trigger.kind.binding(),
            duration_ms = ctx.started_at.elapsed().as_millis(),
            response_size = response.len(),
            "Trigger dispatched"
        );

        Ok(response)
    }
}

impl<H: ModuleHost> std::fmt::Debug for Dispatcher<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("load_state", &self.load_state())
            .field("ready_timeout", &self.ready_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicBool;

    #[derive(Debug, Clone, Copy)]
    enum Readiness {
        /// Signal from a task after a short delay.
        Delayed(u64),
        /// Drop the signal without signalling.
        Abandon,
        /// Keep the signal alive and never signal.
        Stall,
    }

    struct MockHost {
        load_delay: Duration,
        failing_loads: AtomicUsize,
        readiness: Readiness,
        instances: AtomicUsize,
        stalled: Mutex<Vec<ReadySignal>>,
        forwarded: AtomicUsize,
    }

    impl MockHost {
        fn new(readiness: Readiness) -> Self {
            Self {
                load_delay: Duration::from_millis(20),
                failing_loads: AtomicUsize::new(0),
                readiness,
                instances: AtomicUsize::new(0),
                stalled: Mutex::new(Vec::new()),
                forwarded: AtomicUsize::new(0),
            }
        }

        fn failing_first(self, loads: usize) -> Self {
            self.failing_loads.store(loads, Ordering::SeqCst);
            self
        }
    }

    struct MockInstance {
        id: usize,
        ready: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ModuleHost for MockHost {
        type Module = &'static str;
        type Instance = MockInstance;

        async fn load(&self) -> Result<Self::Module, DispatchError> {
            tokio::time::sleep(self.load_delay).await;
            let remaining = self.failing_loads.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failing_loads.store(remaining - 1, Ordering::SeqCst);
                return Err(DispatchError::load_failed("module fetch failed"));
            }
            Ok("module")
        }

        async fn instantiate(
            &self,
            _module: &Self::Module,
            _ctx: &InvocationContext,
            ready: ReadySignal,
        ) -> Result<Self::Instance, DispatchError> {
            let id = self.instances.fetch_add(1, Ordering::SeqCst);
            let flag = Arc::new(AtomicBool::new(false));

            match self.readiness {
                Readiness::Delayed(ms) => {
                    let flag = flag.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(ms)).await;
                        flag.store(true, Ordering::SeqCst);
                        ready.signal();
                    });
                }
                Readiness::Abandon => drop(ready),
                Readiness::Stall => self.stalled.lock().unwrap().push(ready),
            }

            Ok(MockInstance { id, ready: flag })
        }

        async fn forward(
            &self,
            instance: &mut Self::Instance,
            trigger: &Trigger,
        ) -> Result<Vec<u8>, DispatchError> {
            assert!(
                instance.ready.load(Ordering::SeqCst),
                "forwarded before readiness"
            );
            self.forwarded.fetch_add(1, Ordering::SeqCst);
            let payload = String::from_utf8_lossy(&trigger.payload);
            Ok(format!("{}#{}:{payload}", trigger.kind.binding(), instance.id).into_bytes())
        }
    }

    #[tokio::test]
    async fn test_dispatch_forwards_after_ready() {
        let dispatcher = Dispatcher::new(MockHost::new(Readiness::Delayed(10)));
        assert_eq!(dispatcher.load_state(), LoadState::Unloaded);

        let response = dispatcher
            .dispatch(&Trigger::new(TriggerKind::Queue, "batch"))
            .await
            .unwrap();

        assert_eq!(response, b"handleQueueMessageBatch#0:batch");
        assert_eq!(dispatcher.load_state(), LoadState::Ready);
        assert_eq!(dispatcher.load_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_invocations_load_once() {
        let dispatcher = Arc::new(Dispatcher::new(MockHost::new(Readiness::Delayed(1))));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    dispatcher
                        .dispatch(&Trigger::new(TriggerKind::Fetch, format!("req-{i}")))
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }

        assert_eq!(dispatcher.load_count(), 1);
        // One fresh instance per invocation.
        assert_eq!(dispatcher.host().instances.load(Ordering::SeqCst), 16);
        assert_eq!(dispatcher.host().forwarded.load(Ordering::SeqCst), 16);
    }

    #[tokio::test]
    async fn test_loaded_module_is_reused() {
        let dispatcher = Dispatcher::new(MockHost::new(Readiness::Delayed(0)));

        for _ in 0..3 {
            dispatcher
                .dispatch(&Trigger::new(TriggerKind::Scheduled, "cron"))
                .await
                .unwrap();
        }

        assert_eq!(dispatcher.load_count(), 1);
        assert_eq!(dispatcher.host().instances.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_abandoned_readiness() {
        let dispatcher = Dispatcher::new(MockHost::new(Readiness::Abandon));

        let err = dispatcher
            .dispatch(&Trigger::new(TriggerKind::Fetch, "req"))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::ReadinessAbandoned));
        assert_eq!(dispatcher.host().forwarded.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ready_timeout() {
        let dispatcher = Dispatcher::new(MockHost::new(Readiness::Stall))
            .with_ready_timeout(Some(Duration::from_millis(30)));

        let err = dispatcher
            .dispatch(&Trigger::new(TriggerKind::Fetch, "req"))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::ReadyTimeout { waited_ms: 30 }));
        assert_eq!(dispatcher.host().forwarded.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stalled_instance_without_deadline_keeps_waiting() {
        let dispatcher = Dispatcher::new(MockHost::new(Readiness::Stall));

        let pending = tokio::time::timeout(
            Duration::from_millis(50),
            dispatcher.dispatch(&Trigger::new(TriggerKind::Fetch, "req")),
        )
        .await;

        assert!(pending.is_err(), "dispatch should still be waiting");
    }

    #[tokio::test]
    async fn test_failed_load_returns_to_unloaded() {
        let dispatcher = Dispatcher::new(MockHost::new(Readiness::Delayed(0)).failing_first(1));

        let err = dispatcher
            .dispatch(&Trigger::new(TriggerKind::Fetch, "req"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::LoadFailed { .. }));
        assert_eq!(dispatcher.load_state(), LoadState::Unloaded);

        dispatcher
            .dispatch(&Trigger::new(TriggerKind::Fetch, "req"))
            .await
            .unwrap();
        assert_eq!(dispatcher.load_state(), LoadState::Ready);
        assert_eq!(dispatcher.load_count(), 2);
    }

    #[tokio::test]
    async fn test_slot_reports_loading_while_in_flight() {
        let slot = Arc::new(ModuleSlot::<u32>::new());
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let loader = {
            let slot = slot.clone();
            tokio::spawn(async move {
                slot.get_or_load(|| async {
                    let _ = release_rx.await;
                    Ok(7)
                })
                .await
                .copied()
            })
        };

        while slot.state() != LoadState::Loading {
            tokio::task::yield_now().await;
        }
        release_tx.send(()).unwrap();

        assert_eq!(loader.await.unwrap().unwrap(), 7);
        assert_eq!(slot.state(), LoadState::Ready);
    }

    #[tokio::test]
    async fn test_ready_signal_after_timeout_is_harmless() {
        let (signal, waiter) = readiness();
        let result = waiter.wait(Some(Duration::from_millis(1))).await;
        assert!(matches!(result, Err(DispatchError::ReadyTimeout { .. })));
        signal.signal();
    }

    #[test]
    fn test_invocation_ids_are_unique() {
        let a = InvocationContext::new(TriggerKind::Fetch);
        let b = InvocationContext::new(TriggerKind::Fetch);
        assert_ne!(a.invocation_id, b.invocation_id);
    }
}
