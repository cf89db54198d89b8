//! Event processor - serialized handler execution per session
//!
//! One drain task runs per session while its queue is non-empty. The task
//! pops events in arrival order and runs each handler's steps under the
//! session's state lock: write, commit, flush, push, repeat. A step that
//! fails is rolled back through the tree's step journal and surfaced as a
//! diagnostic event instead of a delta.
//!
//! Every push routes through the live-session map. That lookup is the
//! cancellation barrier: the moment `on_session_end` removes the entry,
//! in-flight work can no longer reach the client, whatever state its
//! task is in.

use crate::engine::EngineInner;
use crate::handler::{StepContext, StepOutcome};
use crate::stats::StatCounters;
use crate::store::SessionEntry;
use reverb_core::{ClientEvent, Event, SessionToken, Update};
use std::sync::Arc;

/// Drain a session's queue until it is empty or the session is retired
pub(crate) async fn drain(inner: Arc<EngineInner>, token: SessionToken) {
    loop {
        let Some(entry) = inner.store.get(&token) else {
            return;
        };
        let event = {
            let mut queue = entry.queue.lock();
            match queue.events.pop_front() {
                Some(event) => event,
                None => {
                    queue.processing = false;
                    return;
                }
            }
        };
        process_event(&inner, &entry, event).await;
        checkpoint(&inner, &token, &entry).await;
    }
}

/// Persist the session tree after a fully processed event
async fn checkpoint(inner: &Arc<EngineInner>, token: &SessionToken, entry: &Arc<SessionEntry>) {
    let Some(archive) = inner.archive.as_ref() else {
        return;
    };
    // A session retired mid-event has already left the archive
    if inner.store.get(token).is_none() {
        return;
    }
    let snapshot = {
        let state = entry.state.lock().await;
        state.tree.snapshot()
    };
    match snapshot {
        Ok(snapshot) => {
            if let Err(error) = archive.store(token, &snapshot) {
                tracing::warn!(%token, %error, "session checkpoint failed");
            }
        }
        Err(error) => {
            tracing::warn!(%token, %error, "session snapshot failed");
        }
    }
}

/// Run one event's handler to completion
async fn process_event(inner: &Arc<EngineInner>, entry: &Arc<SessionEntry>, event: Event) {
    let token = event.token.clone();

    let Some((node_path, handler_name)) = event.handler.split() else {
        tracing::debug!(%token, handler = %event.handler, "malformed handler path");
        push(inner, &token, not_found_update(&event));
        return;
    };
    // Resolve by declarations alone; an event addressed at nothing must
    // not materialize state
    let node_type = match inner.registry.resolve_path_type(&inner.root_type, &node_path) {
        Ok(node_type) => node_type,
        Err(error) => {
            tracing::debug!(%token, handler = %event.handler, %error, "handler path does not resolve");
            push(inner, &token, not_found_update(&event));
            return;
        }
    };
    let Some(handler) = inner.handlers.get(&node_type, handler_name) else {
        tracing::debug!(%token, handler = %event.handler, "no such handler");
        push(inner, &token, not_found_update(&event));
        return;
    };

    let mut state = entry.state.lock().await;
    let mut run = handler.start(&event);
    let mut step = 0usize;
    loop {
        state.tree.begin_step();
        if step == 0 {
            if let Err(error) = state.tree.materialize(&node_path) {
                state.tree.abort_step();
                tracing::debug!(%token, %error, "target node failed to materialize");
                push(inner, &token, not_found_update(&event));
                return;
            }
        }
        let outcome = {
            let mut ctx = StepContext::new(&mut state.tree, node_path.clone(), &event, step);
            run.step(&mut ctx).await
        };
        match outcome {
            Ok(outcome) => {
                state.tree.commit_step();
                let report = state.tree.flush();
                let events: Vec<ClientEvent> = report
                    .failures
                    .iter()
                    .map(|failure| {
                        ClientEvent::new("recompute_error")
                            .with_param("node", failure.path.as_str())
                            .with_param("field", failure.field.as_str())
                            .with_param("message", failure.reason.as_str())
                    })
                    .collect();
                if !report.delta.is_empty() || !events.is_empty() {
                    let update = Update::Delta {
                        delta: report.delta,
                        events,
                    };
                    if !push(inner, &token, update) {
                        // Session retired mid-handler: nothing more leaves
                        return;
                    }
                }
                match outcome {
                    StepOutcome::Continue => {
                        step += 1;
                    }
                    StepOutcome::Done { mut followups } => {
                        if !followups.is_empty() {
                            // Follow-ups stay within the emitting session
                            for followup in &mut followups {
                                followup.token = token.clone();
                            }
                            entry.queue.lock().push_followups(followups);
                        }
                        StatCounters::bump(&inner.stats.events_processed);
                        tracing::debug!(%token, handler = %event.handler, steps = step + 1, "event processed");
                        return;
                    }
                }
            }
            Err(error) => {
                state.tree.abort_step();
                StatCounters::bump(&inner.stats.handler_failures);
                tracing::warn!(%token, handler = %event.handler, %error, "handler step failed");
                push(
                    inner,
                    &token,
                    Update::diagnostics(vec![ClientEvent::new("handler_error")
                        .with_param("handler", event.handler.as_str())
                        .with_param("message", error.to_string())]),
                );
                return;
            }
        }
    }
}

fn not_found_update(event: &Event) -> Update {
    Update::diagnostics(vec![
        ClientEvent::new("handler_not_found").with_param("handler", event.handler.as_str())
    ])
}

/// Deliver an update if the session is still live
pub(crate) fn push(inner: &Arc<EngineInner>, token: &SessionToken, update: Update) -> bool {
    let Some(entry) = inner.store.get(token) else {
        return false;
    };
    let delivered = entry.outbound.send(update).is_ok();
    if delivered {
        StatCounters::bump(&inner.stats.deltas_pushed);
    }
    delivered
}
