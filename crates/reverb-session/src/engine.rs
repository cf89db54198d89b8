//! Engine - the session coordinator and public boundary
//!
//! The engine owns the live-session store and exposes the operations the
//! transport and UI layers consume: start and end sessions, submit
//! events, read values, serialize full state. It holds the registry and
//! handler tables read-only and shares them across every session.
//!
//! Sessions are fully independent: each one's handlers run on its own
//! drain task, serialized by its own state lock, and nothing here takes a
//! global lock around handler execution.

use crate::config::{EngineConfig, StoreBackend};
use crate::error::{Error, Result};
use crate::processor::drain;
use crate::session::{Handlers, Session};
use crate::stats::{EngineStats, StatCounters};
use crate::store::{SessionArchive, SessionEntry, SessionStore};
use chrono::Utc;
use reverb_core::{
    Event, NodePath, NodeType, Registry, SessionToken, StateTree, TreeSnapshot, Update, Value,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub(crate) struct EngineInner {
    pub registry: Arc<Registry>,
    pub handlers: Handlers,
    pub root_type: NodeType,
    pub config: EngineConfig,
    pub archive: Option<Arc<dyn SessionArchive>>,
    pub store: SessionStore,
    pub stats: StatCounters,
}

/// The state synchronization engine
///
/// Cheap to clone; clones share the same session store. Event submission
/// spawns drain tasks, so the engine must live inside a tokio runtime.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an engine with purely in-process sessions
    pub fn new(
        registry: Arc<Registry>,
        handlers: Handlers,
        root_type: impl Into<NodeType>,
        config: EngineConfig,
    ) -> Result<Self> {
        if config.backend() == StoreBackend::External {
            return Err(Error::Configuration(
                "external backend selected but no archive given".to_string(),
            ));
        }
        Self::build(registry, handlers, root_type.into(), config, None)
    }

    /// Create an engine that checkpoints sessions to an archive
    pub fn with_archive(
        registry: Arc<Registry>,
        handlers: Handlers,
        root_type: impl Into<NodeType>,
        config: EngineConfig,
        archive: Arc<dyn SessionArchive>,
    ) -> Result<Self> {
        if config.backend() != StoreBackend::External {
            return Err(Error::Configuration(
                "archive given but backend is not external".to_string(),
            ));
        }
        Self::build(registry, handlers, root_type.into(), config, Some(archive))
    }

    fn build(
        registry: Arc<Registry>,
        handlers: Handlers,
        root_type: NodeType,
        config: EngineConfig,
        archive: Option<Arc<dyn SessionArchive>>,
    ) -> Result<Self> {
        registry.node(&root_type)?;
        Ok(Self {
            inner: Arc::new(EngineInner {
                registry,
                handlers,
                root_type,
                config,
                archive,
                store: SessionStore::default(),
                stats: StatCounters::default(),
            }),
        })
    }

    /// The engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.inner.store.len()
    }

    /// Current engine counters
    pub fn stats(&self) -> EngineStats {
        self.inner.stats.snapshot(self.inner.store.len())
    }

    /// Create a session for a token and hand back its outbound channel
    ///
    /// The first message on the channel is the hydrate: the full state
    /// snapshot for first paint. When an archive holds a checkpoint for
    /// this token, the session resumes from it instead of starting from
    /// declared defaults.
    pub fn on_session_start(
        &self,
        token: &SessionToken,
    ) -> Result<mpsc::UnboundedReceiver<Update>> {
        let tree = match self.inner.archive.as_ref().map(|a| a.load(token)) {
            Some(Ok(Some(snapshot))) => {
                StateTree::restore(Arc::clone(&self.inner.registry), &snapshot)?
            }
            Some(Err(error)) => return Err(error),
            _ => StateTree::new(
                Arc::clone(&self.inner.registry),
                self.inner.root_type.clone(),
            )?,
        };
        let mut session = Session::new(token.clone(), tree);
        let snapshot = session.tree.hydrate()?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let entry = Arc::new(SessionEntry::new(session, sender));
        self.inner.store.insert(token.clone(), entry)?;

        if let Some(entry) = self.inner.store.get(token) {
            let _ = entry.outbound.send(Update::Hydrate(snapshot));
        }
        StatCounters::bump(&self.inner.stats.sessions_started);
        tracing::info!(%token, "session started");
        Ok(receiver)
    }

    /// Retire a session: cancel in-flight work and drop its tree
    ///
    /// The entry leaves the store before the drain task is aborted, so a
    /// handler mid-step can no longer deliver anything.
    pub fn on_session_end(&self, token: &SessionToken) -> Result<()> {
        let Some(entry) = self.inner.store.remove(token) else {
            return Err(Error::SessionLost(token.clone()));
        };
        if let Some(task) = entry.task.lock().take() {
            task.abort();
        }
        if let Some(archive) = self.inner.archive.as_ref() {
            if let Err(error) = archive.remove(token) {
                tracing::warn!(%token, %error, "archive cleanup failed");
            }
        }
        StatCounters::bump(&self.inner.stats.sessions_ended);
        tracing::info!(%token, "session retired");
        Ok(())
    }

    /// Enqueue an event for its session
    ///
    /// Events process strictly in arrival order per session. If the
    /// session is idle a drain task starts; otherwise the running task
    /// picks the event up when the current handler finishes.
    pub fn submit_event(&self, event: Event) -> Result<()> {
        let entry = self
            .inner
            .store
            .get(&event.token)
            .ok_or_else(|| Error::SessionLost(event.token.clone()))?;
        entry.touch();
        let token = event.token.clone();
        tracing::debug!(%token, handler = %event.handler, "event submitted");

        let should_spawn = {
            let mut queue = entry.queue.lock();
            queue.events.push_back(event);
            if queue.processing {
                false
            } else {
                queue.processing = true;
                true
            }
        };
        if should_spawn {
            let handle = tokio::spawn(drain(Arc::clone(&self.inner), token));
            *entry.task.lock() = Some(handle);
        }
        Ok(())
    }

    /// Read one field's current value (initial render / hydration reads)
    pub async fn get_value(
        &self,
        token: &SessionToken,
        path: &NodePath,
        field: &str,
    ) -> Result<Value> {
        let entry = self
            .inner
            .store
            .get(token)
            .ok_or_else(|| Error::SessionLost(token.clone()))?;
        let mut state = entry.state.lock().await;
        Ok(state.tree.read(path, field)?)
    }

    /// Serialize a session's full state and mark it all as sent
    pub async fn serialize_tree(&self, token: &SessionToken) -> Result<TreeSnapshot> {
        let entry = self
            .inner
            .store
            .get(token)
            .ok_or_else(|| Error::SessionLost(token.clone()))?;
        let mut state = entry.state.lock().await;
        Ok(state.tree.hydrate()?)
    }

    /// Retire every session idle past the configured TTL
    pub fn sweep_expired(&self) -> Vec<SessionToken> {
        let ttl = chrono::Duration::from_std(self.inner.config.session_ttl())
            .unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();
        let expired: Vec<SessionToken> = self
            .inner
            .store
            .tokens()
            .into_iter()
            .filter(|token| {
                self.inner
                    .store
                    .get(token)
                    .is_some_and(|entry| now - *entry.last_seen.lock() > ttl)
            })
            .collect();
        for token in &expired {
            tracing::info!(%token, "session expired");
            let _ = self.on_session_end(token);
        }
        expired
    }

    /// Spawn a background task sweeping expired sessions periodically
    pub fn spawn_ttl_sweeper(&self) -> JoinHandle<()> {
        let engine = self.clone();
        let interval = self.inner.config.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let expired = engine.sweep_expired();
                if !expired.is_empty() {
                    tracing::debug!(count = expired.len(), "expired sessions swept");
                }
            }
        })
    }

    #[cfg(test)]
    pub(crate) fn entry_for_test(&self, token: &SessionToken) -> Option<Arc<SessionEntry>> {
        self.inner.store.get(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{EventHandler, FnHandler, HandlerRun, StepContext, StepOutcome};
    use crate::store::MemoryArchive;
    use async_trait::async_trait;
    use reverb_core::{Delta, FieldRef};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn registry() -> Arc<Registry> {
        let mut registry = Registry::new();
        registry.register_node("app").unwrap();
        registry.register_field("app", "flag", Value::Bool(false)).unwrap();
        registry.register_node("counter").unwrap();
        registry.register_field("counter", "count", Value::Int(0)).unwrap();
        registry.register_field("counter", "loading", Value::Bool(false)).unwrap();
        registry.register_field("counter", "result", Value::String("".into())).unwrap();
        registry
            .register_computed(
                "counter",
                "doubled",
                vec![FieldRef::new("counter", "count")],
                true,
                |scope| Ok(Value::Int(scope.get_int("count")? * 2)),
            )
            .unwrap();
        registry.register_child("app", "counter", "counter").unwrap();
        Arc::new(registry)
    }

    /// Two steps: set the loading flag, then deliver the result
    struct LoadHandler;

    impl EventHandler for LoadHandler {
        fn start(&self, _event: &Event) -> Box<dyn HandlerRun> {
            Box::new(LoadRun)
        }
    }

    struct LoadRun;

    #[async_trait]
    impl HandlerRun for LoadRun {
        async fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
            match ctx.step() {
                0 => {
                    ctx.set("loading", true)?;
                    Ok(StepOutcome::Continue)
                }
                _ => {
                    ctx.set("loading", false)?;
                    ctx.set("result", "done")?;
                    Ok(StepOutcome::done())
                }
            }
        }
    }

    /// Writes in step 0, then suspends until released
    struct StallHandler {
        gate: Arc<Notify>,
    }

    impl EventHandler for StallHandler {
        fn start(&self, _event: &Event) -> Box<dyn HandlerRun> {
            Box::new(StallRun {
                gate: Arc::clone(&self.gate),
            })
        }
    }

    struct StallRun {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl HandlerRun for StallRun {
        async fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
            match ctx.step() {
                0 => {
                    ctx.set("loading", true)?;
                    Ok(StepOutcome::Continue)
                }
                _ => {
                    self.gate.notified().await;
                    ctx.set("loading", false)?;
                    Ok(StepOutcome::done())
                }
            }
        }
    }

    fn handlers(gate: Arc<Notify>) -> Handlers {
        let mut handlers = Handlers::new();
        handlers.register(
            "counter",
            "increment",
            FnHandler::new(|ctx| {
                let count = ctx.get_int("count")?;
                ctx.set("count", count + 1)?;
                Ok(Vec::new())
            }),
        );
        handlers.register("counter", "load", LoadHandler);
        handlers.register("counter", "stall", StallHandler { gate });
        handlers.register(
            "counter",
            "boom",
            FnHandler::new(|ctx| {
                ctx.set("count", 99i64)?;
                Err(Error::Handler("boom".to_string()))
            }),
        );
        handlers.register(
            "app",
            "chain",
            FnHandler::new(|ctx| {
                let followup = Event::new(ctx.token().clone(), "root.counter.increment");
                Ok(vec![followup])
            }),
        );
        handlers.register(
            "app",
            "mark",
            FnHandler::new(|ctx| {
                ctx.set("flag", true)?;
                Ok(Vec::new())
            }),
        );
        handlers
    }

    fn engine() -> Engine {
        engine_with_gate(Arc::new(Notify::new()))
    }

    fn engine_with_gate(gate: Arc<Notify>) -> Engine {
        Engine::new(registry(), handlers(gate), "app", EngineConfig::default()).unwrap()
    }

    async fn expect_delta(receiver: &mut mpsc::UnboundedReceiver<Update>) -> Delta {
        match receiver.recv().await.expect("update expected") {
            Update::Delta { delta, .. } => delta,
            other => panic!("expected delta, got {:?}", other),
        }
    }

    async fn expect_hydrate(receiver: &mut mpsc::UnboundedReceiver<Update>) -> TreeSnapshot {
        match receiver.recv().await.expect("update expected") {
            Update::Hydrate(snapshot) => snapshot,
            other => panic!("expected hydrate, got {:?}", other),
        }
    }

    /// The checkpoint lands after the final delta; give it a moment
    async fn wait_for_checkpoint(archive: &MemoryArchive, token: &SessionToken) {
        for _ in 0..100 {
            if archive.contains(token) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("checkpoint never arrived for {}", token);
    }

    #[tokio::test]
    async fn test_hydrate_is_first_message() {
        let engine = engine();
        let token = SessionToken::new("t1");
        let mut receiver = engine.on_session_start(&token).unwrap();

        let snapshot = expect_hydrate(&mut receiver).await;
        let root = snapshot.get(&NodePath::root()).unwrap();
        assert_eq!(root.fields.get("flag"), Some(&Value::Bool(false)));
    }

    #[tokio::test]
    async fn test_duplicate_session_start_fails() {
        let engine = engine();
        let token = SessionToken::new("t1");
        let _receiver = engine.on_session_start(&token).unwrap();
        assert!(matches!(
            engine.on_session_start(&token),
            Err(Error::SessionExists(_))
        ));
    }

    #[tokio::test]
    async fn test_counter_scenario_three_deltas() {
        let engine = engine();
        let token = SessionToken::new("t1");
        let mut receiver = engine.on_session_start(&token).unwrap();
        expect_hydrate(&mut receiver).await;

        for _ in 0..3 {
            engine
                .submit_event(Event::new(token.clone(), "root.counter.increment"))
                .unwrap();
        }

        let counter = NodePath::new("root.counter");
        for expected in 1..=3i64 {
            let delta = expect_delta(&mut receiver).await;
            let fields = delta.get(&counter).unwrap();
            assert_eq!(fields.get("count"), Some(&Value::Int(expected)));
            assert_eq!(fields.get("doubled"), Some(&Value::Int(expected * 2)));
        }
    }

    #[tokio::test]
    async fn test_multi_step_handler_pushes_intermediate_deltas() {
        let engine = engine();
        let token = SessionToken::new("t1");
        let mut receiver = engine.on_session_start(&token).unwrap();
        expect_hydrate(&mut receiver).await;

        engine
            .submit_event(Event::new(token.clone(), "root.counter.load"))
            .unwrap();

        let counter = NodePath::new("root.counter");
        let first = expect_delta(&mut receiver).await;
        let fields = first.get(&counter).unwrap();
        assert_eq!(fields.get("loading"), Some(&Value::Bool(true)));
        assert!(!fields.contains_key("result"));

        let second = expect_delta(&mut receiver).await;
        let fields = second.get(&counter).unwrap();
        assert_eq!(fields.get("loading"), Some(&Value::Bool(false)));
        assert_eq!(fields.get("result"), Some(&Value::String("done".into())));
    }

    #[tokio::test]
    async fn test_per_session_ordering_with_suspension() {
        let gate = Arc::new(Notify::new());
        let engine = engine_with_gate(Arc::clone(&gate));
        let token = SessionToken::new("t1");
        let mut receiver = engine.on_session_start(&token).unwrap();
        expect_hydrate(&mut receiver).await;

        engine
            .submit_event(Event::new(token.clone(), "root.counter.stall"))
            .unwrap();
        engine
            .submit_event(Event::new(token.clone(), "root.counter.increment"))
            .unwrap();

        // The stalled handler's first step flushes immediately
        let counter = NodePath::new("root.counter");
        let delta = expect_delta(&mut receiver).await;
        assert_eq!(
            delta.get(&counter).unwrap().get("loading"),
            Some(&Value::Bool(true))
        );

        // The queued increment must not run while the handler is suspended
        let pending = tokio::time::timeout(Duration::from_millis(50), receiver.recv()).await;
        assert!(pending.is_err(), "second event ran during suspension");

        gate.notify_one();
        let delta = expect_delta(&mut receiver).await;
        assert_eq!(
            delta.get(&counter).unwrap().get("loading"),
            Some(&Value::Bool(false))
        );
        let delta = expect_delta(&mut receiver).await;
        assert_eq!(
            delta.get(&counter).unwrap().get("count"),
            Some(&Value::Int(1))
        );
    }

    #[tokio::test]
    async fn test_session_isolation() {
        let engine = engine();
        let token_a = SessionToken::new("a");
        let token_b = SessionToken::new("b");
        let mut receiver_a = engine.on_session_start(&token_a).unwrap();
        let mut receiver_b = engine.on_session_start(&token_b).unwrap();
        expect_hydrate(&mut receiver_a).await;
        expect_hydrate(&mut receiver_b).await;

        for _ in 0..2 {
            engine
                .submit_event(Event::new(token_a.clone(), "root.counter.increment"))
                .unwrap();
        }
        for _ in 0..3 {
            engine
                .submit_event(Event::new(token_b.clone(), "root.counter.increment"))
                .unwrap();
        }
        for _ in 0..2 {
            expect_delta(&mut receiver_a).await;
        }
        for _ in 0..3 {
            expect_delta(&mut receiver_b).await;
        }

        let counter = NodePath::new("root.counter");
        assert_eq!(
            engine.get_value(&token_a, &counter, "count").await.unwrap(),
            Value::Int(2)
        );
        assert_eq!(
            engine.get_value(&token_b, &counter, "count").await.unwrap(),
            Value::Int(3)
        );
    }

    #[tokio::test]
    async fn test_unknown_handler_is_noop_failure_delta() {
        let engine = engine();
        let token = SessionToken::new("t1");
        let mut receiver = engine.on_session_start(&token).unwrap();
        expect_hydrate(&mut receiver).await;

        engine
            .submit_event(Event::new(token.clone(), "root.counter.missing"))
            .unwrap();

        match receiver.recv().await.unwrap() {
            Update::Delta { delta, events } => {
                assert!(delta.is_empty());
                assert_eq!(events[0].name, "handler_not_found");
            }
            other => panic!("expected delta, got {:?}", other),
        }

        // The session remains usable
        engine
            .submit_event(Event::new(token.clone(), "root.counter.increment"))
            .unwrap();
        let delta = expect_delta(&mut receiver).await;
        assert_eq!(
            delta.get(&NodePath::new("root.counter")).unwrap().get("count"),
            Some(&Value::Int(1))
        );
    }

    #[tokio::test]
    async fn test_handler_error_discards_step_writes() {
        let engine = engine();
        let token = SessionToken::new("t1");
        let mut receiver = engine.on_session_start(&token).unwrap();
        expect_hydrate(&mut receiver).await;

        engine
            .submit_event(Event::new(token.clone(), "root.counter.boom"))
            .unwrap();

        match receiver.recv().await.unwrap() {
            Update::Delta { delta, events } => {
                assert!(delta.is_empty());
                assert_eq!(events[0].name, "handler_error");
            }
            other => panic!("expected delta, got {:?}", other),
        }

        // The write of count=99 was rolled back with the failed step
        let count = engine
            .get_value(&token, &NodePath::new("root.counter"), "count")
            .await
            .unwrap();
        assert_eq!(count, Value::Int(0));
        assert_eq!(engine.stats().handler_failures, 1);
    }

    #[tokio::test]
    async fn test_cancellation_pushes_nothing_after_session_end() {
        let gate = Arc::new(Notify::new());
        let engine = engine_with_gate(Arc::clone(&gate));
        let token = SessionToken::new("t1");
        let mut receiver = engine.on_session_start(&token).unwrap();
        expect_hydrate(&mut receiver).await;

        engine
            .submit_event(Event::new(token.clone(), "root.counter.stall"))
            .unwrap();
        // Step 0's delta arrives, then the handler suspends
        expect_delta(&mut receiver).await;

        engine.on_session_end(&token).unwrap();
        gate.notify_one();

        // No delta for the cancelled handler is ever delivered
        assert!(receiver.recv().await.is_none());
        assert_eq!(engine.session_count(), 0);
    }

    #[tokio::test]
    async fn test_follow_up_events_run_before_queued_events() {
        let engine = engine();
        let token = SessionToken::new("t1");
        let mut receiver = engine.on_session_start(&token).unwrap();
        expect_hydrate(&mut receiver).await;

        // chain finishes with an increment follow-up; mark is already
        // queued behind it and must run after the follow-up
        engine
            .submit_event(Event::new(token.clone(), "root.chain"))
            .unwrap();
        engine
            .submit_event(Event::new(token.clone(), "root.mark"))
            .unwrap();

        let first = expect_delta(&mut receiver).await;
        assert_eq!(
            first.get(&NodePath::new("root.counter")).unwrap().get("count"),
            Some(&Value::Int(1))
        );
        let second = expect_delta(&mut receiver).await;
        assert_eq!(
            second.get(&NodePath::root()).unwrap().get("flag"),
            Some(&Value::Bool(true))
        );
    }

    #[tokio::test]
    async fn test_submit_to_unknown_session_fails() {
        let engine = engine();
        let err = engine
            .submit_event(Event::new(SessionToken::new("nope"), "root.mark"))
            .unwrap_err();
        assert!(matches!(err, Error::SessionLost(_)));
    }

    #[tokio::test]
    async fn test_archive_checkpoint_survives_restart() {
        let archive = Arc::new(MemoryArchive::new());
        let config = EngineConfig::default().with_backend(StoreBackend::External);
        let engine = Engine::with_archive(
            registry(),
            handlers(Arc::new(Notify::new())),
            "app",
            config.clone(),
            Arc::clone(&archive) as Arc<dyn SessionArchive>,
        )
        .unwrap();

        let token = SessionToken::new("t1");
        let mut receiver = engine.on_session_start(&token).unwrap();
        expect_hydrate(&mut receiver).await;
        engine
            .submit_event(Event::new(token.clone(), "root.counter.increment"))
            .unwrap();
        expect_delta(&mut receiver).await;
        wait_for_checkpoint(&archive, &token).await;

        // A new engine over the same archive restores the session
        let restarted = Engine::with_archive(
            registry(),
            handlers(Arc::new(Notify::new())),
            "app",
            config,
            Arc::clone(&archive) as Arc<dyn SessionArchive>,
        )
        .unwrap();
        let mut receiver = restarted.on_session_start(&token).unwrap();
        let snapshot = expect_hydrate(&mut receiver).await;
        assert_eq!(
            snapshot
                .get(&NodePath::new("root.counter"))
                .unwrap()
                .fields
                .get("count"),
            Some(&Value::Int(1))
        );
    }

    #[tokio::test]
    async fn test_session_end_removes_archive_entry() {
        let archive = Arc::new(MemoryArchive::new());
        let config = EngineConfig::default().with_backend(StoreBackend::External);
        let engine = Engine::with_archive(
            registry(),
            handlers(Arc::new(Notify::new())),
            "app",
            config,
            Arc::clone(&archive) as Arc<dyn SessionArchive>,
        )
        .unwrap();

        let token = SessionToken::new("t1");
        let mut receiver = engine.on_session_start(&token).unwrap();
        expect_hydrate(&mut receiver).await;
        engine
            .submit_event(Event::new(token.clone(), "root.counter.increment"))
            .unwrap();
        expect_delta(&mut receiver).await;
        wait_for_checkpoint(&archive, &token).await;

        engine.on_session_end(&token).unwrap();
        assert!(!archive.contains(&token));
    }

    #[tokio::test]
    async fn test_ttl_sweep_retires_idle_sessions() {
        let engine = engine();
        let token = SessionToken::new("t1");
        let _receiver = engine.on_session_start(&token).unwrap();

        // Fresh session survives a sweep
        assert!(engine.sweep_expired().is_empty());

        // Backdate last contact beyond the TTL
        let entry = engine.entry_for_test(&token).unwrap();
        *entry.last_seen.lock() = Utc::now() - chrono::Duration::hours(2);

        let expired = engine.sweep_expired();
        assert_eq!(expired, vec![token]);
        assert_eq!(engine.session_count(), 0);
    }

    #[tokio::test]
    async fn test_serialize_tree_contains_every_field() {
        let engine = engine();
        let token = SessionToken::new("t1");
        let mut receiver = engine.on_session_start(&token).unwrap();
        expect_hydrate(&mut receiver).await;
        engine
            .submit_event(Event::new(token.clone(), "root.counter.increment"))
            .unwrap();
        expect_delta(&mut receiver).await;

        let snapshot = engine.serialize_tree(&token).await.unwrap();
        let counter = snapshot.get(&NodePath::new("root.counter")).unwrap();
        assert_eq!(counter.fields.get("count"), Some(&Value::Int(1)));
        assert_eq!(counter.fields.get("doubled"), Some(&Value::Int(2)));
        assert_eq!(counter.fields.get("loading"), Some(&Value::Bool(false)));
    }
}
