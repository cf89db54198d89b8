//! Handler traits and the per-step mutation context
//!
//! A handler is addressed by `<node-path>.<handler-name>` and runs as a
//! sequence of one or more steps. Each step mutates state synchronously
//! through its [`StepContext`] and then returns [`StepOutcome::Continue`]
//! or [`StepOutcome::Done`]; the processor flushes and pushes a delta
//! after every step. Awaiting inside `step` (a fetch, a timer) is the
//! suspension point: the session stays busy, other sessions are
//! unaffected.
//!
//! [`EventHandler::start`] separates the registered handler (shared,
//! stateless) from one invocation's state, so a multi-step handler can
//! carry data from an early step - a fetched payload, say - into a later
//! one without round-tripping it through state fields.

use crate::error::{Error, Result};
use async_trait::async_trait;
use reverb_core::{Event, NodePath, StateTree, Value, ValueMap};
use std::sync::Arc;

/// What a handler step decided
#[derive(Debug)]
pub enum StepOutcome {
    /// Flush, push the delta, and run another step
    Continue,
    /// Flush, push the final delta, and finish
    Done {
        /// Events to run next on this session, ahead of anything already
        /// queued
        followups: Vec<Event>,
    },
}

impl StepOutcome {
    /// Finish with no follow-up events
    pub fn done() -> Self {
        StepOutcome::Done {
            followups: Vec::new(),
        }
    }

    /// Finish and enqueue follow-up events
    pub fn followups(events: Vec<Event>) -> Self {
        StepOutcome::Done { followups: events }
    }
}

/// A registered, shared handler
pub trait EventHandler: Send + Sync {
    /// Begin one invocation, returning its per-invocation state
    fn start(&self, event: &Event) -> Box<dyn HandlerRun>;
}

/// One in-flight handler invocation
#[async_trait]
pub trait HandlerRun: Send {
    /// Run the next step
    async fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<StepOutcome>;
}

/// Mutation context for one handler step
///
/// Anchored at the event's target node: plain reads and writes address
/// the anchor, `*_at` variants address other nodes. Writes are allowed on
/// the anchor and its descendants only - an ancestor acts on behalf of
/// its subtree, never sideways. Reads may go anywhere in the tree.
pub struct StepContext<'a> {
    tree: &'a mut StateTree,
    anchor: NodePath,
    event: &'a Event,
    step: usize,
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(
        tree: &'a mut StateTree,
        anchor: NodePath,
        event: &'a Event,
        step: usize,
    ) -> Self {
        Self {
            tree,
            anchor,
            event,
            step,
        }
    }

    /// Zero-based index of the current step
    pub fn step(&self) -> usize {
        self.step
    }

    /// The node this handler is anchored at
    pub fn anchor(&self) -> &NodePath {
        &self.anchor
    }

    /// The event's payload
    pub fn payload(&self) -> &ValueMap {
        &self.event.payload
    }

    /// One payload parameter
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.event.payload.get(key)
    }

    /// The ambient client context (current route, ...)
    pub fn client_context(&self) -> &ValueMap {
        &self.event.context
    }

    /// The session this event belongs to
    pub fn token(&self) -> &reverb_core::SessionToken {
        &self.event.token
    }

    /// Read a field on the anchor node
    pub fn get(&mut self, field: &str) -> Result<Value> {
        Ok(self.tree.read(&self.anchor, field)?)
    }

    /// Read an integer field on the anchor node
    pub fn get_int(&mut self, field: &str) -> Result<i64> {
        let value = self.get(field)?;
        value.as_int().ok_or_else(|| {
            Error::Handler(format!("field {} is not an int", field))
        })
    }

    /// Read a boolean field on the anchor node
    pub fn get_bool(&mut self, field: &str) -> Result<bool> {
        let value = self.get(field)?;
        value.as_bool().ok_or_else(|| {
            Error::Handler(format!("field {} is not a bool", field))
        })
    }

    /// Write a field on the anchor node
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        Ok(self.tree.write(&self.anchor, field, value)?)
    }

    /// Read a field anywhere in the tree (ancestors included)
    pub fn get_at(&mut self, path: &NodePath, field: &str) -> Result<Value> {
        Ok(self.tree.read(path, field)?)
    }

    /// Write a field on the anchor or one of its descendants
    pub fn set_at(&mut self, path: &NodePath, field: &str, value: impl Into<Value>) -> Result<()> {
        if path != &self.anchor && !self.anchor.is_ancestor_of(path) {
            return Err(Error::OutOfScope(path.clone()));
        }
        Ok(self.tree.write(path, field, value)?)
    }
}

/// Adapter turning a synchronous closure into a single-step handler
///
/// Most handlers are one step; this keeps them free of trait ceremony:
///
/// ```ignore
/// handlers.register("counter", "increment", FnHandler::new(|ctx| {
///     let count = ctx.get_int("count")?;
///     ctx.set("count", count + 1)?;
///     Ok(Vec::new())
/// }));
/// ```
pub struct FnHandler<F> {
    f: Arc<F>,
}

impl<F> FnHandler<F>
where
    F: Fn(&mut StepContext<'_>) -> Result<Vec<Event>> + Send + Sync + 'static,
{
    /// Wrap a closure as a handler
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&mut StepContext<'_>) -> Result<Vec<Event>> + Send + Sync + 'static,
{
    fn start(&self, _event: &Event) -> Box<dyn HandlerRun> {
        Box::new(FnRun {
            f: Arc::clone(&self.f),
        })
    }
}

struct FnRun<F> {
    f: Arc<F>,
}

#[async_trait]
impl<F> HandlerRun for FnRun<F>
where
    F: Fn(&mut StepContext<'_>) -> Result<Vec<Event>> + Send + Sync + 'static,
{
    async fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<StepOutcome> {
        let followups = (self.f)(ctx)?;
        Ok(StepOutcome::followups(followups))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reverb_core::{Registry, SessionToken, StateTree};

    fn tree() -> StateTree {
        let mut registry = Registry::new();
        registry.register_node("app").unwrap();
        registry.register_field("app", "count", Value::Int(0)).unwrap();
        registry.register_node("panel").unwrap();
        registry.register_field("panel", "open", Value::Bool(false)).unwrap();
        registry.register_child("app", "panel", "panel").unwrap();
        StateTree::new(Arc::new(registry), "app").unwrap()
    }

    #[test]
    fn test_context_reads_payload_and_writes_anchor() {
        let mut tree = tree();
        let event = Event::new(SessionToken::new("t"), "root.increment").with_param("amount", 5i64);
        let mut ctx = StepContext::new(&mut tree, NodePath::root(), &event, 0);

        let amount = ctx.param("amount").and_then(|v| v.as_int()).unwrap();
        let count = ctx.get_int("count").unwrap();
        ctx.set("count", count + amount).unwrap();
        assert_eq!(ctx.get_int("count").unwrap(), 5);
    }

    #[test]
    fn test_descendant_write_allowed() {
        let mut tree = tree();
        let event = Event::new(SessionToken::new("t"), "root.open_panel");
        let mut ctx = StepContext::new(&mut tree, NodePath::root(), &event, 0);

        ctx.set_at(&NodePath::new("root.panel"), "open", true).unwrap();
        assert_eq!(
            ctx.get_at(&NodePath::new("root.panel"), "open").unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_sideways_write_is_out_of_scope() {
        let mut tree = tree();
        tree.materialize(&NodePath::new("root.panel")).unwrap();
        let event = Event::new(SessionToken::new("t"), "root.panel.toggle");
        let mut ctx = StepContext::new(&mut tree, NodePath::new("root.panel"), &event, 0);

        let err = ctx.set_at(&NodePath::root(), "count", 1i64).unwrap_err();
        assert!(matches!(err, Error::OutOfScope(_)));
    }
}
