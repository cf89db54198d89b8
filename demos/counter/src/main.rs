//! Counter demo
//!
//! Drives the engine through the two canonical flows without any real
//! transport: three increments (one delta each) and a two-step loading
//! handler (intermediate delta, then the result). Every outbound update
//! is printed as the wire frame a WebSocket client would receive.
//!
//! Run with `RUST_LOG=debug` to watch the engine's own tracing.

use async_trait::async_trait;
use reverb_core::{Event, FieldRef, Registry, SessionToken, Value};
use reverb_session::{
    Engine, EngineConfig, EventHandler, FnHandler, HandlerRun, Handlers, Result, StepContext,
    StepOutcome,
};
use reverb_wire::{encode_server, ServerMessage};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Simulates a fetch: flag the UI as loading, await the "network", then
/// deliver the result
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
                tokio::time::sleep(Duration::from_millis(200)).await;
                ctx.set("loading", false)?;
                ctx.set("result", "fetched 42 rows")?;
                Ok(StepOutcome::done())
            }
        }
    }
}

fn build_registry() -> Arc<Registry> {
    let mut registry = Registry::new();
    registry.register_node("app").expect("register app");
    registry
        .register_field("app", "title", Value::String("reverb counter".into()))
        .expect("register title");
    registry.register_node("counter").expect("register counter");
    registry
        .register_field("counter", "count", Value::Int(0))
        .expect("register count");
    registry
        .register_field("counter", "loading", Value::Bool(false))
        .expect("register loading");
    registry
        .register_field("counter", "result", Value::String("".into()))
        .expect("register result");
    registry
        .register_computed(
            "counter",
            "doubled",
            vec![FieldRef::new("counter", "count")],
            true,
            |scope| Ok(Value::Int(scope.get_int("count")? * 2)),
        )
        .expect("register doubled");
    registry
        .register_child("app", "counter", "counter")
        .expect("register child");
    Arc::new(registry)
}

fn build_handlers() -> Handlers {
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
    handlers
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let engine = Engine::new(
        build_registry(),
        build_handlers(),
        "app",
        EngineConfig::default(),
    )?;

    let token = SessionToken::generate();
    let mut updates = engine.on_session_start(&token)?;

    for _ in 0..3 {
        engine.submit_event(Event::new(token.clone(), "root.counter.increment"))?;
    }
    engine.submit_event(Event::new(token.clone(), "root.counter.load"))?;

    // hydrate + three counter deltas + two loading deltas
    for _ in 0..6 {
        match updates.recv().await {
            Some(update) => println!("{}", encode_server(&ServerMessage::from(update))?),
            None => break,
        }
    }

    let stats = engine.stats();
    println!(
        "processed {} events, pushed {} updates",
        stats.events_processed, stats.deltas_pushed
    );
    engine.on_session_end(&token)?;
    Ok(())
}
